//! Day trip configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Coordinate, GeoError};
use crate::geo::city_center;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Planning/assistant service
    pub service: ServiceConfig,

    /// Optional walking directions provider
    pub directions: DirectionsConfig,

    /// Origin resolution
    pub geo: GeoConfig,

    /// Fallback routing parameters
    pub routing: RoutingConfig,

    /// Itinerary assembly limits
    pub planning: PlanningConfig,

    /// Calendar export
    pub calendar: CalendarConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        self.geo
            .center()
            .map_err(|e| eyre::eyre!("Invalid geo city center: {}", e))?;
        if let Some(device) = &self.geo.device {
            device
                .coordinate()
                .map_err(|e| eyre::eyre!("Invalid geo device position: {}", e))?;
        }
        if !(self.routing.walking_speed_mps.is_finite() && self.routing.walking_speed_mps > 0.0) {
            return Err(eyre::eyre!(
                "routing.walking-speed-mps must be positive, got {}",
                self.routing.walking_speed_mps
            ));
        }
        if self.routing.max_points < 2 {
            return Err(eyre::eyre!("routing.max-points must be at least 2, got {}", self.routing.max_points));
        }
        if self.calendar.start_hour > 23 {
            return Err(eyre::eyre!("calendar.start-hour must be 0-23, got {}", self.calendar.start_hour));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .daytrip.yml
        let local_config = PathBuf::from(".daytrip.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/daytrip/daytrip.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("daytrip").join("daytrip.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = [
            config_path.cloned(),
            Some(PathBuf::from(".daytrip.yml")),
            dirs::config_dir().map(|d| d.join("daytrip").join("daytrip.yml")),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|p| p.exists())
            .and_then(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Planning and assistant service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// When false, the demo point set and the offline assistant are used
    pub enabled: bool,

    /// Base URL of the planning service
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:8080".to_string(),
            timeout_ms: 40_000,
        }
    }
}

/// Directions provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionsConfig {
    pub enabled: bool,

    /// OSRM-compatible routing server
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Routing profile (foot, bike, car)
    pub profile: String,

    /// Hard limit on a single directions call, in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://router.project-osrm.org".to_string(),
            profile: "foot".to_string(),
            timeout_ms: 8_000,
        }
    }
}

/// Fixed device position used as the geolocation capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePosition {
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "accuracy-m", default)]
    pub accuracy_m: Option<f64>,
}

impl DevicePosition {
    pub fn coordinate(&self) -> Result<Coordinate, GeoError> {
        Coordinate::new(self.lat, self.lon)
    }
}

/// Origin resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// City name sent to the planning service
    pub city: String,

    /// Explicit center; both must be set to override the built-in city table
    #[serde(rename = "city-lat")]
    pub city_lat: Option<f64>,

    #[serde(rename = "city-lon")]
    pub city_lon: Option<f64>,

    /// Geolocation timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    #[serde(rename = "high-accuracy")]
    pub high_accuracy: bool,

    /// Position reported by the device geolocation capability, if any
    pub device: Option<DevicePosition>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            city: "Rostov-on-Don".to_string(),
            city_lat: None,
            city_lon: None,
            timeout_ms: 10_000,
            high_accuracy: true,
            device: None,
        }
    }
}

impl GeoConfig {
    /// City center: explicit `city-lat`/`city-lon`, else the built-in entry for `city`
    pub fn center(&self) -> Result<Coordinate, GeoError> {
        match (self.city_lat, self.city_lon) {
            (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
            _ => city_center(&self.city).ok_or_else(|| GeoError::UnknownCity(self.city.clone())),
        }
    }
}

/// Routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Mean walking speed used by the straight-line fallback
    #[serde(rename = "walking-speed-mps")]
    pub walking_speed_mps: f64,

    /// Directions provider point limit; extra points are truncated
    #[serde(rename = "max-points")]
    pub max_points: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            walking_speed_mps: crate::route::WALKING_SPEED_MPS,
            max_points: crate::route::MAX_ROUTE_POINTS,
        }
    }
}

/// Itinerary assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    #[serde(rename = "max-stops")]
    pub max_stops: usize,

    /// Search radius forwarded to the planning service
    #[serde(rename = "radius-m")]
    pub radius_m: Option<u32>,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            max_stops: crate::itinerary::MAX_STOPS,
            radius_m: None,
        }
    }
}

/// Calendar export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub tzid: String,

    /// Offset written into the VTIMEZONE block, e.g. "+0300"
    #[serde(rename = "utc-offset")]
    pub utc_offset: String,

    #[serde(rename = "calendar-name")]
    pub calendar_name: Option<String>,

    /// First synthesized event start when stops carry no times
    #[serde(rename = "start-hour")]
    pub start_hour: u32,

    #[serde(rename = "stop-minutes")]
    pub stop_minutes: u32,

    #[serde(rename = "gap-minutes")]
    pub gap_minutes: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            tzid: "Europe/Moscow".to_string(),
            utc_offset: "+0300".to_string(),
            calendar_name: None,
            start_hour: 10,
            stop_minutes: 60,
            gap_minutes: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.service.enabled);
        assert_eq!(config.geo.center().unwrap(), Coordinate::new(47.222078, 39.720349).unwrap());
        assert_eq!(config.geo.timeout_ms, 10_000);
        assert_eq!(config.routing.walking_speed_mps, 1.1);
        assert_eq!(config.routing.max_points, 10);
        assert_eq!(config.planning.max_stops, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug
service:
  base-url: http://planner.internal:9000
  timeout-ms: 5000
directions:
  enabled: false
geo:
  city: Taganrog
  city-lat: 47.2096
  city-lon: 38.9358
  device:
    lat: 47.21
    lon: 38.93
    accuracy-m: 25
routing:
  walking-speed-mps: 1.3
calendar:
  tzid: Europe/Berlin
  utc-offset: "+0100"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.service.base_url, "http://planner.internal:9000");
        assert_eq!(config.service.timeout_ms, 5000);
        assert!(!config.directions.enabled);
        assert_eq!(config.geo.city, "Taganrog");
        assert_eq!(config.geo.center().unwrap(), Coordinate::new(47.2096, 38.9358).unwrap());
        assert_eq!(config.geo.device.as_ref().unwrap().accuracy_m, Some(25.0));
        assert_eq!(config.routing.walking_speed_mps, 1.3);
        assert_eq!(config.calendar.tzid, "Europe/Berlin");
        assert_eq!(config.calendar.start_hour, 10);
    }

    #[test]
    fn test_city_name_selects_built_in_center() {
        let mut config = Config::default();
        config.geo.city = "Taganrog".to_string();
        assert_eq!(config.geo.center().unwrap(), Coordinate::new(47.2096, 38.9358).unwrap());

        // Half an override is ignored
        config.geo.city_lat = Some(47.0);
        assert_eq!(config.geo.center().unwrap(), Coordinate::new(47.2096, 38.9358).unwrap());

        config.geo.city = "Shakhty".to_string();
        config.geo.city_lon = Some(40.2);
        assert_eq!(config.geo.center().unwrap(), Coordinate::new(47.0, 40.2).unwrap());
    }

    #[test]
    fn test_unknown_city_without_coordinates() {
        let mut config = Config::default();
        config.geo.city = "Atlantis".to_string();
        assert_eq!(config.geo.center(), Err(GeoError::UnknownCity("Atlantis".to_string())));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
service:
  enabled: false
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert!(!config.service.enabled);
        assert_eq!(config.service.base_url, "http://localhost:8080");
        assert_eq!(config.directions.profile, "foot");
        assert_eq!(config.calendar.tzid, "Europe/Moscow");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.geo.city_lat = Some(123.0);
        config.geo.city_lon = Some(39.7);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.geo.city = "Atlantis".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.routing.walking_speed_mps = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.routing.max_points = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.geo.device = Some(DevicePosition {
            lat: 0.0,
            lon: 200.0,
            accuracy_m: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "planning:\n  max-stops: 5\n  radius-m: 1500").unwrap();

        let path = file.path().to_path_buf();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.planning.max_stops, 5);
        assert_eq!(config.planning.radius_m, Some(1500));
        assert_eq!(Config::load_log_level(Some(&path)), None);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/daytrip.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_load_falls_back_to_user_config_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let app_dir = dir.path().join("daytrip");
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(app_dir.join("daytrip.yml"), "log-level: warn\ngeo:\n  city: Azov\n").unwrap();

        let previous = std::env::var_os("XDG_CONFIG_HOME");
        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", dir.path());
        }

        let config = Config::load(None);
        let log_level = Config::load_log_level(None);

        // SAFETY: as above
        unsafe {
            match previous {
                Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
        }

        assert_eq!(config.unwrap().geo.city, "Azov");
        assert_eq!(log_level.as_deref(), Some("warn"));
    }
}
