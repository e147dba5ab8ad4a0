//! Preferences plus origin into a validated, routed, exportable itinerary

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::source::{DemoSource, PlannerSource, SourcedPlan, StopSource};
use super::{MAX_RADIUS_M, MIN_RADIUS_M};
use crate::calendar::CalendarExporter;
use crate::config::{Config, PlanningConfig};
use crate::domain::{DataSource, Itinerary, Origin, OriginSource, PreferenceSet, Stop};
use crate::route::{DirectionsProvider, RouteBuilder};
use crate::service::{PlanRequest, PlannerApi, UserLocation, WireStop};

/// Errors that reject an assembly request outright
#[derive(Debug, Error, PartialEq)]
pub enum AssembleError {
    #[error("Invalid preferences: {0}")]
    InvalidPreferences(String),

    #[error("An itinerary is already being built")]
    Busy,
}

/// Clears the in-flight flag however the build ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Turns a preference set and an origin into an [`Itinerary`]
pub struct ItineraryAssembler {
    sources: Vec<Arc<dyn StopSource>>,
    router: RouteBuilder,
    calendar: CalendarExporter,
    planning: PlanningConfig,
    default_city: String,
    in_flight: AtomicBool,
}

impl ItineraryAssembler {
    /// `sources` are tried in order; a [`DemoSource`] is appended when missing
    pub fn new(
        mut sources: Vec<Arc<dyn StopSource>>,
        router: RouteBuilder,
        calendar: CalendarExporter,
        planning: PlanningConfig,
        default_city: impl Into<String>,
    ) -> Self {
        if sources.last().is_none_or(|s| s.name() != DemoSource.name()) {
            sources.push(Arc::new(DemoSource));
        }
        Self {
            sources,
            router,
            calendar,
            planning,
            default_city: default_city.into(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn from_config(
        config: &Config,
        planner: Option<Arc<dyn PlannerApi>>,
        directions: Option<Arc<dyn DirectionsProvider>>,
    ) -> Self {
        debug!(has_planner = planner.is_some(), has_directions = directions.is_some(), "ItineraryAssembler::from_config: called");
        let sources: Vec<Arc<dyn StopSource>> = planner
            .map(|p| Arc::new(PlannerSource::new(p)) as Arc<dyn StopSource>)
            .into_iter()
            .collect();
        Self::new(
            sources,
            RouteBuilder::from_config(&config.routing, &config.directions, directions),
            CalendarExporter::new(config.calendar.clone()),
            config.planning.clone(),
            config.geo.city.clone(),
        )
    }

    /// Whether a build is currently running
    pub fn is_building(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn calendar(&self) -> &CalendarExporter {
        &self.calendar
    }

    /// Assemble an itinerary
    ///
    /// Only a missing or malformed date and a concurrent build are errors.
    /// Source failures fall through to the next source and routing failures
    /// fall back to straight lines; both surface as `warnings`.
    pub async fn assemble(&self, prefs: &PreferenceSet, origin: Origin) -> Result<Itinerary, AssembleError> {
        debug!(prefs = prefs.len(), source = %origin.source, "assemble: called");
        let date = validate_date(prefs)?;
        let _guard = InFlight::acquire(&self.in_flight).ok_or(AssembleError::Busy)?;

        let request = self.plan_request(prefs, date, &origin);
        let mut warnings = Vec::new();
        let plan = self.fetch(&request, &mut warnings).await;

        let stops = normalize_stops(&plan.response.stops, date, self.planning.max_stops);
        let dropped = plan.response.stops.len().saturating_sub(stops.len());
        if dropped > 0 {
            debug!(dropped, kept = stops.len(), "assemble: dropped stops");
        }

        let route = if stops.is_empty() {
            crate::domain::RoutedPath::empty()
        } else {
            let points: Vec<_> = std::iter::once(origin.coordinate)
                .chain(stops.iter().map(|s| s.coordinate))
                .collect();
            self.router.build(&points).await
        };
        if route.used_fallback && !stops.is_empty() {
            warnings.push("Walking directions unavailable, showing straight-line estimates".to_string());
        }

        let total_duration = match plan.response.total_minutes {
            Some(minutes) => Duration::from_secs(minutes * 60),
            None => route.total_duration(),
        };
        let generated_at = Utc::now();
        let calendar = self.calendar.export_stops(&stops, date, &request.city, generated_at);

        info!(
            stops = stops.len(),
            data_source = %plan.data_source,
            used_fallback_route = route.used_fallback,
            "Itinerary assembled"
        );
        Ok(Itinerary {
            date,
            city: request.city,
            stops,
            total_duration,
            total_time_label: plan.response.total_time.filter(|t| !t.trim().is_empty()),
            data_source: plan.data_source,
            optimized: plan.response.optimized,
            route,
            calendar,
            warnings,
            generated_at,
        })
    }

    /// The `/plan` request for these preferences
    ///
    /// The origin is forwarded only when it did not come from the city default.
    pub fn plan_request(&self, prefs: &PreferenceSet, date: NaiveDate, origin: &Origin) -> PlanRequest {
        let user_location = match origin.source {
            OriginSource::City => None,
            OriginSource::Geolocation | OriginSource::MapPick => Some(UserLocation {
                lat: origin.coordinate.lat(),
                lon: origin.coordinate.lon(),
                accuracy_m: origin.accuracy_m,
            }),
        };
        let radius_m = prefs
            .get("radius_m")
            .and_then(|v| v.as_u64())
            .map(|r| u32::try_from(r).unwrap_or(u32::MAX))
            .or(self.planning.radius_m)
            .map(|r| r.clamp(MIN_RADIUS_M, MAX_RADIUS_M));

        PlanRequest {
            date: date.format("%Y-%m-%d").to_string(),
            city: prefs.city().unwrap_or(&self.default_city).to_string(),
            tags: prefs.tags(),
            budget: prefs.budget().map(str::to_string),
            pace: prefs.pace().map(str::to_string),
            user_location,
            radius_m,
        }
    }

    async fn fetch(&self, request: &PlanRequest, warnings: &mut Vec<String>) -> SourcedPlan {
        for source in &self.sources {
            match source.fetch(request).await {
                Ok(plan) => {
                    debug!(source = source.name(), stops = plan.response.stops.len(), "fetch: source answered");
                    if let Some(notice) = source.notice() {
                        warnings.push(notice.to_string());
                    }
                    return plan;
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "fetch: source failed, trying next");
                }
            }
        }
        // Only reachable with a source list that ends in something fallible
        warnings.push(DemoSource.notice().unwrap_or_default().to_string());
        SourcedPlan {
            response: crate::service::PlanResponse {
                stops: DemoSource::stops(),
                ..Default::default()
            },
            data_source: DataSource::Seed,
        }
    }
}

fn validate_date(prefs: &PreferenceSet) -> Result<NaiveDate, AssembleError> {
    let raw = prefs
        .date_str()
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AssembleError::InvalidPreferences("date is required".to_string()))?;
    prefs
        .date()
        .ok_or_else(|| AssembleError::InvalidPreferences(format!("date must be YYYY-MM-DD, got {raw:?}")))
}

/// Validate and label wire stops, keeping visit order
pub(crate) fn normalize_stops(raw: &[WireStop], date: NaiveDate, max_stops: usize) -> Vec<Stop> {
    raw.iter()
        .filter_map(|wire| match wire.coordinate() {
            Ok(coordinate) => Some((wire, coordinate)),
            Err(e) => {
                warn!(name = ?wire.name, error = %e, "normalize_stops: dropping stop");
                None
            }
        })
        .take(max_stops)
        .enumerate()
        .map(|(idx, (wire, coordinate))| {
            let arrive = wire.arrive.as_deref().and_then(|t| parse_stop_time(t, date));
            let leave = wire
                .leave
                .as_deref()
                .and_then(|t| parse_stop_time(t, date))
                .map(|l| match arrive {
                    Some(a) if l < a => a,
                    _ => l,
                });
            let mut tags: Vec<String> = Vec::with_capacity(wire.tags.len());
            for tag in wire.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
                if !tags.iter().any(|t| t == tag) {
                    tags.push(tag.to_string());
                }
            }
            let name = wire
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Point {}", idx + 1));
            let description = wire
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .or_else(|| summarize(arrive, leave, &tags));
            Stop {
                name,
                coordinate,
                arrive,
                leave,
                tags,
                description,
            }
        })
        .collect()
}

/// "Arrive 10:30, leave 11:45. Tags: history, park"
fn summarize(arrive: Option<NaiveDateTime>, leave: Option<NaiveDateTime>, tags: &[String]) -> Option<String> {
    let mut parts = Vec::new();
    match (arrive, leave) {
        (Some(a), Some(l)) => parts.push(format!("Arrive {}, leave {}", a.format("%H:%M"), l.format("%H:%M"))),
        (Some(a), None) => parts.push(format!("Arrive {}", a.format("%H:%M"))),
        (None, Some(l)) => parts.push(format!("Leave {}", l.format("%H:%M"))),
        (None, None) => {}
    }
    if !tags.is_empty() {
        parts.push(format!("Tags: {}", tags.join(", ")));
    }
    if parts.is_empty() { None } else { Some(parts.join(". ")) }
}

/// ISO datetime (with or without offset) or a bare `HH:MM` on `date`
fn parse_stop_time(text: &str, date: NaiveDate) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(text, f).ok())
        .map(|t| date.and_time(t))
}
