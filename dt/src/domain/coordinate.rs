//! Validated WGS84 coordinates and the trip origin

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating or resolving positions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Latitude {0} is outside [-90, 90] or not finite")]
    InvalidLatitude(f64),

    #[error("Longitude {0} is outside [-180, 180] or not finite")]
    InvalidLongitude(f64),

    #[error("Geolocation permission denied")]
    PermissionDenied,

    #[error("Geolocation timed out")]
    Timeout,

    #[error("Geolocation is not supported on this host")]
    Unsupported,

    #[error("No known center for city '{0}'; set geo.city-lat and geo.city-lon")]
    UnknownCity(String),
}

/// A point on the globe in decimal degrees
///
/// The only way to obtain one is through [`Coordinate::new`] (or serde, which
/// routes through the same check), so every `Coordinate` in the program is
/// finite and in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = GeoError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    /// Validate and build a coordinate; out-of-range values are rejected, not clamped
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lon)
    }
}

/// Where the active origin came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginSource {
    City,
    Geolocation,
    MapPick,
}

impl std::fmt::Display for OriginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::City => "city",
            Self::Geolocation => "geolocation",
            Self::MapPick => "map-pick",
        };
        f.write_str(s)
    }
}

/// The coordinate the day's walk starts from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub coordinate: Coordinate,
    pub accuracy_m: Option<f64>,
    pub source: OriginSource,
}

impl Origin {
    pub fn city(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy_m: None,
            source: OriginSource::City,
        }
    }

    pub fn geolocation(coordinate: Coordinate, accuracy_m: Option<f64>) -> Self {
        Self {
            coordinate,
            accuracy_m,
            source: OriginSource::Geolocation,
        }
    }

    pub fn map_pick(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            accuracy_m: None,
            source: OriginSource::MapPick,
        }
    }
}
