//! Where an itinerary's stops come from

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::domain::DataSource;
use crate::service::{PlanRequest, PlanResponse, PlannerApi, ServiceError, WireStop};

/// Raw plan from a source, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedPlan {
    pub response: PlanResponse,
    pub data_source: DataSource,
}

/// One entry in the ordered list of stop sources
#[async_trait]
pub trait StopSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Warning shown to the user when this source is the one that answered
    fn notice(&self) -> Option<&'static str> {
        None
    }

    async fn fetch(&self, request: &PlanRequest) -> Result<SourcedPlan, ServiceError>;
}

/// Stops from the planning service
pub struct PlannerSource {
    planner: Arc<dyn PlannerApi>,
}

impl PlannerSource {
    pub fn new(planner: Arc<dyn PlannerApi>) -> Self {
        Self { planner }
    }
}

#[async_trait]
impl StopSource for PlannerSource {
    fn name(&self) -> &'static str {
        "planner"
    }

    async fn fetch(&self, request: &PlanRequest) -> Result<SourcedPlan, ServiceError> {
        debug!(date = %request.date, city = %request.city, "PlannerSource::fetch: called");
        let response = self.planner.plan(request).await?;
        // The service itself may have fallen back to its seed catalogue
        let data_source = match response.data_source.as_deref() {
            Some("seed") => DataSource::Seed,
            _ => DataSource::Provider,
        };
        Ok(SourcedPlan { response, data_source })
    }
}

/// (name, lat, lon, tags, description)
const DEMO_POINTS: &[(&str, f64, f64, &[&str], &str)] = &[
    (
        "Bolshaya Sadovaya Street",
        47.2225,
        39.7143,
        &["walk", "architecture"],
        "Main street of the old town",
    ),
    (
        "Pushkinskaya Street",
        47.2262,
        39.7188,
        &["walk", "park"],
        "Shaded pedestrian boulevard",
    ),
    (
        "Cathedral of the Nativity",
        47.2169,
        39.7127,
        &["history", "architecture"],
        "Cathedral next to the central market",
    ),
    (
        "Don Embankment",
        47.2163,
        39.7197,
        &["waterfront", "walk"],
        "Riverside promenade",
    ),
    ("Gorky Park", 47.2227, 39.7116, &["park", "family"], "City park in the center"),
];

/// Fixed demo point set; never fails
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoSource;

impl DemoSource {
    pub fn stops() -> Vec<WireStop> {
        DEMO_POINTS
            .iter()
            .map(|(name, lat, lon, tags, description)| WireStop {
                name: Some((*name).to_string()),
                lat: json!(lat),
                lon: json!(lon),
                arrive: None,
                leave: None,
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
                description: Some((*description).to_string()),
            })
            .collect()
    }
}

#[async_trait]
impl StopSource for DemoSource {
    fn name(&self) -> &'static str {
        "demo"
    }

    fn notice(&self) -> Option<&'static str> {
        Some("Planning service unavailable, showing demo points")
    }

    async fn fetch(&self, _request: &PlanRequest) -> Result<SourcedPlan, ServiceError> {
        debug!("DemoSource::fetch: called");
        Ok(SourcedPlan {
            response: PlanResponse {
                stops: Self::stops(),
                ..PlanResponse::default()
            },
            data_source: DataSource::Seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PlanRequest {
        PlanRequest {
            date: "2025-10-26".to_string(),
            city: "Rostov-on-Don".to_string(),
            tags: vec![],
            budget: None,
            pace: None,
            user_location: None,
            radius_m: None,
        }
    }

    #[test]
    fn test_demo_points_are_valid() {
        let stops = DemoSource::stops();
        assert_eq!(stops.len(), DEMO_POINTS.len());
        for stop in &stops {
            assert!(stop.coordinate().is_ok(), "{:?}", stop.name);
            assert!(stop.arrive.is_none());
        }
    }

    #[tokio::test]
    async fn test_demo_source_is_seed() {
        let plan = DemoSource.fetch(&request()).await.unwrap();
        assert_eq!(plan.data_source, DataSource::Seed);
        assert!(!plan.response.optimized);
        assert!(DemoSource.notice().is_some());
    }
}
