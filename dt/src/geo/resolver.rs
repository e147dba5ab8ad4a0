//! GeoResolver - best-effort starting coordinate with provenance
//!
//! Three competing sources feed one active [`Origin`]: the fixed city center,
//! the host geolocation capability, and a point picked on the map. Every
//! request takes a sequence token; a resolution that finishes after a newer
//! request was issued is dropped instead of applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GeoConfig;
use crate::domain::{Coordinate, GeoError, Origin};
use crate::events::{EventBus, TripEvent};

/// Known city centers
const CITY_CENTERS: &[(&str, f64, f64)] = &[
    ("Rostov-on-Don", 47.222078, 39.720349),
    ("Taganrog", 47.2096, 38.9358),
    ("Azov", 47.1121, 39.4231),
];

/// Look up a built-in city center by name (case-insensitive)
pub fn city_center(name: &str) -> Option<Coordinate> {
    CITY_CENTERS
        .iter()
        .find(|(city, _, _)| city.eq_ignore_ascii_case(name.trim()))
        .and_then(|(_, lat, lon)| Coordinate::new(*lat, *lon).ok())
}

/// What the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTrigger {
    UseCity,
    UseDevice,
    UseMapPick,
}

/// A fix reported by the geolocation capability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coordinate: Coordinate,
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Host geolocation capability
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// Request the current position; may be slow, denied or unsupported
    async fn current_position(&self, high_accuracy: bool) -> Result<Position, GeoError>;
}

/// A device that always reports the same fix
pub struct StaticGeolocation {
    coordinate: Coordinate,
    accuracy_m: Option<f64>,
}

impl StaticGeolocation {
    pub fn new(coordinate: Coordinate, accuracy_m: Option<f64>) -> Self {
        Self { coordinate, accuracy_m }
    }
}

#[async_trait]
impl GeolocationProvider for StaticGeolocation {
    async fn current_position(&self, _high_accuracy: bool) -> Result<Position, GeoError> {
        Ok(Position {
            coordinate: self.coordinate,
            accuracy_m: self.accuracy_m,
            timestamp: Utc::now(),
        })
    }
}

/// Host without any geolocation capability
pub struct NoGeolocation;

#[async_trait]
impl GeolocationProvider for NoGeolocation {
    async fn current_position(&self, _high_accuracy: bool) -> Result<Position, GeoError> {
        Err(GeoError::Unsupported)
    }
}

/// Owns the single active Origin and arbitrates between its sources
pub struct GeoResolver {
    city_center: Coordinate,
    geolocation: Arc<dyn GeolocationProvider>,
    timeout: Duration,
    high_accuracy: bool,
    origin_tx: watch::Sender<Origin>,
    sequence: AtomicU64,
    pending_pick: Mutex<Option<oneshot::Sender<Coordinate>>>,
    events: EventBus,
    cancel: CancellationToken,
}

impl GeoResolver {
    /// Create a resolver whose origin starts at the city center
    pub fn new(
        city_center: Coordinate,
        geolocation: Arc<dyn GeolocationProvider>,
        timeout: Duration,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Self {
        debug!(%city_center, ?timeout, "GeoResolver::new: called");
        let (origin_tx, _) = watch::channel(Origin::city(city_center));
        Self {
            city_center,
            geolocation,
            timeout,
            high_accuracy: true,
            origin_tx,
            sequence: AtomicU64::new(0),
            pending_pick: Mutex::new(None),
            events,
            cancel,
        }
    }

    pub fn from_config(
        config: &GeoConfig,
        geolocation: Arc<dyn GeolocationProvider>,
        events: EventBus,
        cancel: CancellationToken,
    ) -> Result<Self, GeoError> {
        let mut resolver = Self::new(
            config.center()?,
            geolocation,
            Duration::from_millis(config.timeout_ms),
            events,
            cancel,
        );
        resolver.high_accuracy = config.high_accuracy;
        Ok(resolver)
    }

    /// The currently active origin
    pub fn current(&self) -> Origin {
        *self.origin_tx.borrow()
    }

    /// Watch the active origin; each successful resolution updates it
    pub fn subscribe(&self) -> watch::Receiver<Origin> {
        self.origin_tx.subscribe()
    }

    /// Whether a map pick session is waiting for a click
    pub fn is_picking(&self) -> bool {
        self.lock_pick().is_some()
    }

    /// Resolve a new origin
    ///
    /// Returns `None` when the source failed softly (denied, timeout,
    /// unsupported), when the request was superseded by a newer one, or when
    /// the resolver was torn down. A failed device request still moves the
    /// active origin back to the city center, unless a newer request won.
    pub async fn resolve(&self, trigger: ResolveTrigger) -> Option<Origin> {
        let token = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(?trigger, token, "resolve: called");

        // Any new request supersedes a pending pick
        self.cancel_pick();

        match trigger {
            ResolveTrigger::UseCity => self.publish(token, Origin::city(self.city_center)),
            ResolveTrigger::UseDevice => {
                let request = tokio::time::timeout(self.timeout, self.geolocation.current_position(self.high_accuracy));
                let result = tokio::select! {
                    _ = self.cancel.cancelled() => {
                        debug!(token, "resolve: torn down during geolocation");
                        return None;
                    }
                    result = request => result.unwrap_or(Err(GeoError::Timeout)),
                };
                match result {
                    Ok(position) => self.publish(token, Origin::geolocation(position.coordinate, position.accuracy_m)),
                    Err(e) => {
                        warn!(error = %e, timeout = ?self.timeout, "resolve: geolocation failed, falling back to city center");
                        self.publish(token, Origin::city(self.city_center));
                        None
                    }
                }
            }
            ResolveTrigger::UseMapPick => {
                let (tx, rx) = oneshot::channel();
                *self.lock_pick() = Some(tx);
                info!(token, "resolve: waiting for map pick");
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        debug!(token, "resolve: torn down during map pick");
                        None
                    }
                    picked = rx => match picked {
                        Ok(coordinate) => self.publish(token, Origin::map_pick(coordinate)),
                        Err(_) => {
                            debug!(token, "resolve: map pick cancelled");
                            None
                        }
                    },
                }
            }
        }
    }

    /// Deliver a map click to the pending pick session
    ///
    /// Returns false when no pick is in progress.
    pub fn map_click(&self, coordinate: Coordinate) -> bool {
        debug!(%coordinate, "map_click: called");
        match self.lock_pick().take() {
            Some(tx) => tx.send(coordinate).is_ok(),
            None => false,
        }
    }

    /// Abandon a pending pick without side effects
    pub fn cancel_pick(&self) {
        if self.lock_pick().take().is_some() {
            debug!("cancel_pick: dropped pending pick");
        }
    }

    fn lock_pick(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<Coordinate>>> {
        // Poisoning leaves the Option intact
        self.pending_pick.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `origin` only if `token` is still the newest request
    fn publish(&self, token: u64, origin: Origin) -> Option<Origin> {
        if self.cancel.is_cancelled() {
            debug!(token, "publish: resolver torn down, discarding");
            return None;
        }
        let applied = self.origin_tx.send_if_modified(|current| {
            if self.sequence.load(Ordering::SeqCst) == token {
                *current = origin;
                true
            } else {
                false
            }
        });
        if !applied {
            debug!(token, "publish: stale resolution discarded");
            return None;
        }
        info!(source = %origin.source, coordinate = %origin.coordinate, accuracy_m = ?origin.accuracy_m, "Origin updated");
        self.events.emit(TripEvent::OriginChanged { origin });
        Some(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OriginSource;

    fn center() -> Coordinate {
        Coordinate::new(47.222078, 39.720349).unwrap()
    }

    fn resolver_with(provider: Arc<dyn GeolocationProvider>, timeout: Duration) -> Arc<GeoResolver> {
        Arc::new(GeoResolver::new(
            center(),
            provider,
            timeout,
            EventBus::default(),
            CancellationToken::new(),
        ))
    }

    /// Provider that never answers
    struct HangingGeolocation;

    #[async_trait]
    impl GeolocationProvider for HangingGeolocation {
        async fn current_position(&self, _high_accuracy: bool) -> Result<Position, GeoError> {
            std::future::pending().await
        }
    }

    /// Provider that answers after a delay
    struct SlowGeolocation(Duration, Coordinate);

    #[async_trait]
    impl GeolocationProvider for SlowGeolocation {
        async fn current_position(&self, _high_accuracy: bool) -> Result<Position, GeoError> {
            tokio::time::sleep(self.0).await;
            Ok(Position {
                coordinate: self.1,
                accuracy_m: Some(30.0),
                timestamp: Utc::now(),
            })
        }
    }

    struct DeniedGeolocation;

    #[async_trait]
    impl GeolocationProvider for DeniedGeolocation {
        async fn current_position(&self, _high_accuracy: bool) -> Result<Position, GeoError> {
            Err(GeoError::PermissionDenied)
        }
    }

    async fn wait_for_pick(resolver: &GeoResolver) {
        for _ in 0..100 {
            if resolver.is_picking() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("pick session never started");
    }

    #[test]
    fn test_city_center_lookup() {
        assert_eq!(city_center("taganrog").unwrap().lon(), 38.9358);
        assert!(city_center("Atlantis").is_none());
    }

    #[tokio::test]
    async fn test_starts_at_city_default() {
        let resolver = resolver_with(Arc::new(NoGeolocation), Duration::from_secs(1));
        let origin = resolver.current();
        assert_eq!(origin.source, OriginSource::City);
        assert_eq!(origin.coordinate, center());
        assert_eq!(origin.accuracy_m, None);
    }

    #[tokio::test]
    async fn test_use_city_always_succeeds() {
        let resolver = resolver_with(Arc::new(NoGeolocation), Duration::from_secs(1));
        let origin = resolver.resolve(ResolveTrigger::UseCity).await.unwrap();
        assert_eq!(origin, Origin::city(center()));
    }

    #[tokio::test]
    async fn test_device_success_publishes() {
        let device = Coordinate::new(47.23, 39.71).unwrap();
        let resolver = resolver_with(Arc::new(StaticGeolocation::new(device, Some(15.0))), Duration::from_secs(1));
        let mut events = resolver.events.subscribe();
        let mut watch = resolver.subscribe();

        let origin = resolver.resolve(ResolveTrigger::UseDevice).await.unwrap();
        assert_eq!(origin.source, OriginSource::Geolocation);
        assert_eq!(origin.accuracy_m, Some(15.0));

        assert!(watch.has_changed().unwrap());
        assert_eq!(*watch.borrow_and_update(), origin);
        assert_eq!(events.recv().await.unwrap(), TripEvent::OriginChanged { origin });
    }

    #[tokio::test]
    async fn test_device_denied_fails_soft() {
        let resolver = resolver_with(Arc::new(DeniedGeolocation), Duration::from_secs(1));
        assert!(resolver.resolve(ResolveTrigger::UseDevice).await.is_none());
        assert_eq!(resolver.current().source, OriginSource::City);
    }

    #[tokio::test]
    async fn test_device_unsupported_fails_soft() {
        let resolver = resolver_with(Arc::new(NoGeolocation), Duration::from_secs(1));
        assert!(resolver.resolve(ResolveTrigger::UseDevice).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_device_after_map_pick_returns_to_city() {
        let resolver = resolver_with(Arc::new(NoGeolocation), Duration::from_secs(1));
        let r = resolver.clone();
        let pick = tokio::spawn(async move { r.resolve(ResolveTrigger::UseMapPick).await });
        wait_for_pick(&resolver).await;
        assert!(resolver.map_click(Coordinate::new(47.0, 39.0).unwrap()));
        assert_eq!(pick.await.unwrap().unwrap().source, OriginSource::MapPick);

        let mut events = resolver.events.subscribe();
        assert!(resolver.resolve(ResolveTrigger::UseDevice).await.is_none());

        assert_eq!(resolver.current(), Origin::city(center()));
        assert_eq!(
            events.recv().await.unwrap(),
            TripEvent::OriginChanged {
                origin: Origin::city(center())
            }
        );
    }

    #[tokio::test]
    async fn test_failed_device_does_not_override_newer_request() {
        let device = Coordinate::new(47.30, 39.80).unwrap();
        let resolver = resolver_with(Arc::new(HangingGeolocation), Duration::from_millis(50));

        let r = resolver.clone();
        let slow = tokio::spawn(async move { r.resolve(ResolveTrigger::UseDevice).await });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let r = resolver.clone();
        let pick = tokio::spawn(async move { r.resolve(ResolveTrigger::UseMapPick).await });
        wait_for_pick(&resolver).await;
        assert!(resolver.map_click(device));
        assert_eq!(pick.await.unwrap().unwrap().source, OriginSource::MapPick);

        assert!(slow.await.unwrap().is_none());
        assert_eq!(resolver.current(), Origin::map_pick(device));
    }

    #[tokio::test]
    async fn test_device_timeout_fails_soft() {
        let resolver = resolver_with(Arc::new(HangingGeolocation), Duration::from_millis(20));
        assert!(resolver.resolve(ResolveTrigger::UseDevice).await.is_none());
        assert_eq!(resolver.current().source, OriginSource::City);
    }

    #[tokio::test]
    async fn test_map_pick_uses_next_click() {
        let resolver = resolver_with(Arc::new(NoGeolocation), Duration::from_secs(1));
        assert!(!resolver.map_click(center()));

        let r = resolver.clone();
        let pick = tokio::spawn(async move { r.resolve(ResolveTrigger::UseMapPick).await });
        wait_for_pick(&resolver).await;

        let clicked = Coordinate::new(47.21, 39.70).unwrap();
        assert!(resolver.map_click(clicked));

        let origin = pick.await.unwrap().unwrap();
        assert_eq!(origin, Origin::map_pick(clicked));
        assert_eq!(resolver.current(), origin);
        assert!(!resolver.is_picking());
    }

    #[tokio::test]
    async fn test_new_pick_cancels_prior_pick() {
        let resolver = resolver_with(Arc::new(NoGeolocation), Duration::from_secs(1));

        let r1 = resolver.clone();
        let first = tokio::spawn(async move { r1.resolve(ResolveTrigger::UseMapPick).await });
        wait_for_pick(&resolver).await;

        let r2 = resolver.clone();
        let second = tokio::spawn(async move { r2.resolve(ResolveTrigger::UseMapPick).await });
        assert!(first.await.unwrap().is_none());
        wait_for_pick(&resolver).await;

        let clicked = Coordinate::new(47.20, 39.69).unwrap();
        assert!(resolver.map_click(clicked));
        assert_eq!(second.await.unwrap().unwrap().source, OriginSource::MapPick);
        assert_eq!(resolver.current().coordinate, clicked);
    }

    #[tokio::test]
    async fn test_stale_device_result_is_discarded() {
        let device = Coordinate::new(47.30, 39.80).unwrap();
        let resolver = resolver_with(
            Arc::new(SlowGeolocation(Duration::from_millis(50), device)),
            Duration::from_secs(1),
        );

        let r = resolver.clone();
        let slow = tokio::spawn(async move { r.resolve(ResolveTrigger::UseDevice).await });
        tokio::time::sleep(Duration::from_millis(5)).await;

        // Newer request wins
        assert!(resolver.resolve(ResolveTrigger::UseCity).await.is_some());
        assert!(slow.await.unwrap().is_none());
        assert_eq!(resolver.current().source, OriginSource::City);
    }

    #[tokio::test]
    async fn test_teardown_discards_pending_pick() {
        let cancel = CancellationToken::new();
        let resolver = Arc::new(GeoResolver::new(
            center(),
            Arc::new(NoGeolocation),
            Duration::from_secs(1),
            EventBus::default(),
            cancel.clone(),
        ));

        let r = resolver.clone();
        let pick = tokio::spawn(async move { r.resolve(ResolveTrigger::UseMapPick).await });
        wait_for_pick(&resolver).await;

        cancel.cancel();
        assert!(pick.await.unwrap().is_none());
        assert_eq!(resolver.current().source, OriginSource::City);
    }
}
