//! Directions provider trait and an OSRM-compatible HTTP client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::RouteError;
use crate::config::DirectionsConfig;
use crate::domain::Coordinate;

/// Distance/duration the provider reported for one leg
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegEstimate {
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Successful provider answer
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsResponse {
    /// Path polyline, at least two points
    pub geometry: Vec<Coordinate>,
    /// Per-leg figures; may be empty when the provider omits them
    pub legs: Vec<LegEstimate>,
}

/// External walking directions service
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Route through `points` in order (at most [`super::MAX_ROUTE_POINTS`])
    async fn directions(&self, points: &[Coordinate]) -> Result<DirectionsResponse, RouteError>;
}

/// Client for an OSRM `route` endpoint
pub struct OsrmDirections {
    base_url: String,
    profile: String,
    http: Client,
}

impl OsrmDirections {
    pub fn from_config(config: &DirectionsConfig) -> Result<Self, RouteError> {
        debug!(base_url = %config.base_url, profile = %config.profile, "OsrmDirections::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(RouteError::Network)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
            http,
        })
    }

    fn route_url(&self, points: &[Coordinate]) -> String {
        let coords = points
            .iter()
            .map(|p| format!("{:.6},{:.6}", p.lon(), p.lat()))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}/route/v1/{}/{}", self.base_url, self.profile, coords)
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    geometry: Option<OsrmGeometry>,
    #[serde(default)]
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

/// Pick the first route whose geometry decodes into a usable polyline
fn decode_response(response: OsrmResponse) -> Result<DirectionsResponse, RouteError> {
    if response.code != "Ok" {
        return Err(RouteError::InvalidResponse(format!(
            "{}: {}",
            response.code,
            response.message.unwrap_or_default()
        )));
    }

    for route in response.routes {
        let Some(geometry) = route.geometry else {
            continue;
        };
        // GeoJSON order is [lon, lat]
        let decoded: Option<Vec<Coordinate>> = geometry
            .coordinates
            .iter()
            .map(|[lon, lat]| Coordinate::new(*lat, *lon).ok())
            .collect();
        match decoded {
            Some(points) if points.len() >= 2 => {
                let legs = route
                    .legs
                    .iter()
                    .map(|l| LegEstimate {
                        distance_m: l.distance,
                        duration_s: l.duration,
                    })
                    .collect();
                return Ok(DirectionsResponse { geometry: points, legs });
            }
            _ => continue,
        }
    }
    Err(RouteError::NoGeometry)
}

#[async_trait]
impl DirectionsProvider for OsrmDirections {
    async fn directions(&self, points: &[Coordinate]) -> Result<DirectionsResponse, RouteError> {
        let url = self.route_url(points);
        debug!(%url, point_count = points.len(), "directions: called");

        let response = self
            .http
            .get(&url)
            .query(&[("overview", "full"), ("geometries", "geojson"), ("steps", "false")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "directions: provider returned error status");
            return Err(RouteError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: OsrmResponse = response
            .json()
            .await
            .map_err(|e| RouteError::InvalidResponse(e.to_string()))?;
        decode_response(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<DirectionsResponse, RouteError> {
        decode_response(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_route_url_uses_lon_lat_order() {
        let client = OsrmDirections::from_config(&DirectionsConfig {
            base_url: "http://osrm.local/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let points = [
            Coordinate::new(47.222078, 39.720349).unwrap(),
            Coordinate::new(47.2130, 39.7150).unwrap(),
        ];
        assert_eq!(
            client.route_url(&points),
            "http://osrm.local/route/v1/foot/39.720349,47.222078;39.715000,47.213000"
        );
    }

    #[test]
    fn test_decode_geometry_and_legs() {
        let resp = parse(
            r#"{"code":"Ok","routes":[{"geometry":{"type":"LineString","coordinates":[[39.72,47.22],[39.71,47.215],[39.715,47.213]]},
                "legs":[{"distance":1100.5,"duration":800.0}],"distance":1100.5,"duration":800.0}]}"#,
        )
        .unwrap();
        assert_eq!(resp.geometry.len(), 3);
        assert_eq!(resp.geometry[0].lat(), 47.22);
        assert_eq!(
            resp.legs,
            vec![LegEstimate {
                distance_m: 1100.5,
                duration_s: 800.0
            }]
        );
    }

    #[test]
    fn test_missing_geometry_is_error() {
        let err = parse(r#"{"code":"Ok","routes":[{"legs":[]}]}"#).unwrap_err();
        assert!(matches!(err, RouteError::NoGeometry));

        let err = parse(r#"{"code":"Ok","routes":[]}"#).unwrap_err();
        assert!(matches!(err, RouteError::NoGeometry));
    }

    #[test]
    fn test_out_of_range_geometry_is_not_decodable() {
        let err = parse(r#"{"code":"Ok","routes":[{"geometry":{"coordinates":[[39.72,147.22],[39.71,47.2]]}}]}"#)
            .unwrap_err();
        assert!(matches!(err, RouteError::NoGeometry));
    }

    #[test]
    fn test_provider_error_code() {
        let err = parse(r#"{"code":"TooBig","message":"Too many coordinates"}"#).unwrap_err();
        assert!(err.to_string().contains("TooBig"));
    }
}
