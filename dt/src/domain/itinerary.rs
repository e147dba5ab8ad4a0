//! Stops, routed paths and the assembled itinerary

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Coordinate;

/// One visit in the day's walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub name: String,
    pub coordinate: Coordinate,
    pub arrive: Option<NaiveDateTime>,
    pub leave: Option<NaiveDateTime>,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

/// Whether the stops came from the live service or the built-in demo set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Seed,
    Provider,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seed => f.write_str("seed"),
            Self::Provider => f.write_str("provider"),
        }
    }
}

/// A single hop between two consecutive points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub from: Coordinate,
    pub to: Coordinate,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// Walkable path through an ordered list of points
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoutedPath {
    pub legs: Vec<Leg>,
    /// Polyline for rendering; straight segments when `used_fallback` is set
    pub geometry: Vec<Coordinate>,
    pub used_fallback: bool,
}

impl RoutedPath {
    /// Path with no legs, marked as fallback
    pub fn empty() -> Self {
        Self {
            legs: vec![],
            geometry: vec![],
            used_fallback: true,
        }
    }

    pub fn total_distance_m(&self) -> f64 {
        self.legs.iter().map(|l| l.distance_m).sum()
    }

    pub fn total_duration_s(&self) -> f64 {
        self.legs.iter().map(|l| l.duration_s).sum()
    }

    pub fn total_duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_duration_s().max(0.0))
    }
}

/// The ordered, time-annotated result of one planning request
///
/// Replaced wholesale on every successful build. `stops` is empty exactly
/// when `calendar` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub date: NaiveDate,
    pub city: String,
    pub stops: Vec<Stop>,
    pub total_duration: Duration,
    /// Human readable total as reported by the planning service
    pub total_time_label: Option<String>,
    pub data_source: DataSource,
    pub optimized: bool,
    pub route: RoutedPath,
    pub calendar: String,
    /// User-visible notes about degraded data (demo points, fallback routing)
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Itinerary {
    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// Total time formatted as "2h 15min" when the service did not label it
    pub fn total_time_display(&self) -> String {
        if let Some(label) = &self.total_time_label {
            return label.clone();
        }
        format_minutes(self.total_duration.as_secs() / 60)
    }
}

/// Format whole minutes as "Xh Ymin", "Xh" or "Ymin"
pub(crate) fn format_minutes(total_minutes: u64) -> String {
    let (hours, minutes) = (total_minutes / 60, total_minutes % 60);
    match (hours, minutes) {
        (0, m) => format!("{m}min"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}min"),
    }
}
