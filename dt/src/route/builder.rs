//! Ordered routing strategies and the builder that runs them

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{DirectionsProvider, MAX_ROUTE_POINTS, RouteError, WALKING_SPEED_MPS};
use crate::config::{DirectionsConfig, RoutingConfig};
use crate::domain::{Coordinate, Leg, RoutedPath};
use crate::geo::haversine_m;

/// One way of turning points into a path
#[async_trait]
pub trait RouteStrategy: Send + Sync {
    /// Name for logs
    fn name(&self) -> &'static str;

    /// Route through `points` (already truncated, at least two)
    async fn route(&self, points: &[Coordinate]) -> Result<RoutedPath, RouteError>;
}

/// Straight segments with haversine distances at a fixed walking speed
pub fn straight_line(points: &[Coordinate], speed_mps: f64) -> RoutedPath {
    if points.len() < 2 {
        return RoutedPath::empty();
    }
    let legs = points
        .windows(2)
        .map(|pair| {
            let distance_m = haversine_m(pair[0], pair[1]);
            Leg {
                from: pair[0],
                to: pair[1],
                distance_m,
                duration_s: distance_m / speed_mps,
            }
        })
        .collect();
    RoutedPath {
        legs,
        geometry: points.to_vec(),
        used_fallback: true,
    }
}

/// Last-resort strategy; never fails
pub struct StraightLineStrategy {
    speed_mps: f64,
}

impl StraightLineStrategy {
    pub fn new(speed_mps: f64) -> Self {
        Self { speed_mps }
    }
}

impl Default for StraightLineStrategy {
    fn default() -> Self {
        Self::new(WALKING_SPEED_MPS)
    }
}

#[async_trait]
impl RouteStrategy for StraightLineStrategy {
    fn name(&self) -> &'static str {
        "straight-line"
    }

    async fn route(&self, points: &[Coordinate]) -> Result<RoutedPath, RouteError> {
        Ok(straight_line(points, self.speed_mps))
    }
}

/// Delegates to an external directions provider under a hard timeout
pub struct ProviderStrategy {
    provider: Arc<dyn DirectionsProvider>,
    timeout: Duration,
    speed_mps: f64,
}

impl ProviderStrategy {
    pub fn new(provider: Arc<dyn DirectionsProvider>, timeout: Duration, speed_mps: f64) -> Self {
        Self {
            provider,
            timeout,
            speed_mps,
        }
    }
}

#[async_trait]
impl RouteStrategy for ProviderStrategy {
    fn name(&self) -> &'static str {
        "provider"
    }

    async fn route(&self, points: &[Coordinate]) -> Result<RoutedPath, RouteError> {
        let response = tokio::time::timeout(self.timeout, self.provider.directions(points))
            .await
            .map_err(|_| RouteError::Timeout(self.timeout))??;

        if response.geometry.len() < 2 {
            return Err(RouteError::NoGeometry);
        }

        // Provider legs are used only when there is exactly one per hop
        let hops = points.len().saturating_sub(1);
        let legs = if hops > 0 && response.legs.len() == hops {
            points
                .windows(2)
                .zip(&response.legs)
                .map(|(pair, est)| Leg {
                    from: pair[0],
                    to: pair[1],
                    distance_m: est.distance_m,
                    duration_s: est.duration_s,
                })
                .collect()
        } else {
            debug!(
                provider_legs = response.legs.len(),
                hops,
                "ProviderStrategy::route: estimating legs"
            );
            straight_line(points, self.speed_mps).legs
        };

        Ok(RoutedPath {
            legs,
            geometry: response.geometry,
            used_fallback: false,
        })
    }
}

/// Runs routing strategies in order until one succeeds
pub struct RouteBuilder {
    strategies: Vec<Arc<dyn RouteStrategy>>,
    max_points: usize,
    speed_mps: f64,
}

impl RouteBuilder {
    pub fn new(strategies: Vec<Arc<dyn RouteStrategy>>, max_points: usize, speed_mps: f64) -> Self {
        Self {
            strategies,
            max_points,
            speed_mps,
        }
    }

    /// Provider (if any) followed by the straight-line fallback
    pub fn from_config(
        routing: &RoutingConfig,
        directions: &DirectionsConfig,
        provider: Option<Arc<dyn DirectionsProvider>>,
    ) -> Self {
        let mut strategies: Vec<Arc<dyn RouteStrategy>> = Vec::new();
        if let Some(provider) = provider {
            strategies.push(Arc::new(ProviderStrategy::new(
                provider,
                Duration::from_millis(directions.timeout_ms),
                routing.walking_speed_mps,
            )));
        }
        strategies.push(Arc::new(StraightLineStrategy::new(routing.walking_speed_mps)));
        Self::new(strategies, routing.max_points, routing.walking_speed_mps)
    }

    /// Straight-line only
    pub fn fallback_only(speed_mps: f64) -> Self {
        Self::new(
            vec![Arc::new(StraightLineStrategy::new(speed_mps))],
            MAX_ROUTE_POINTS,
            speed_mps,
        )
    }

    /// Build a path through `points` in order
    ///
    /// Fewer than two points give an empty fallback path. Points past the
    /// provider cap are truncated.
    pub async fn build(&self, points: &[Coordinate]) -> RoutedPath {
        debug!(point_count = points.len(), "build: called");
        if points.len() < 2 {
            return RoutedPath::empty();
        }
        let points = if points.len() > self.max_points {
            warn!(
                point_count = points.len(),
                max = self.max_points,
                "build: truncating route points"
            );
            &points[..self.max_points]
        } else {
            points
        };
        if points.len() < 2 {
            return RoutedPath::empty();
        }

        for strategy in &self.strategies {
            match strategy.route(points).await {
                Ok(path) => {
                    info!(
                        strategy = strategy.name(),
                        legs = path.legs.len(),
                        distance_m = path.total_distance_m().round(),
                        used_fallback = path.used_fallback,
                        "Route built"
                    );
                    return path;
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "build: strategy failed, trying next");
                }
            }
        }

        warn!("build: all strategies failed, using straight line");
        straight_line(points, self.speed_mps)
    }
}
