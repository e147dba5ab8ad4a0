//! Daytrip - single-day walking itinerary planner
//!
//! Turns a set of trip preferences and a starting point into an ordered,
//! time-annotated list of stops with a walkable route and a calendar export.
//!
//! # Core Concepts
//!
//! - **One active origin**: city default, device position or a map pick; the
//!   newest request wins and failures keep the previous origin
//! - **Always something to show**: planner failures fall back to demo points
//!   and directions failures to straight-line estimates, with a warning
//! - **Guided preferences**: an assistant asks one question at a time until the
//!   preference set is complete
//!
//! # Modules
//!
//! - [`domain`] - Coordinates, origins, stops, itineraries and preferences
//! - [`geo`] - Origin resolution and great-circle distance
//! - [`route`] - Walkable paths through the day's stops
//! - [`itinerary`] - Assembling an itinerary from preferences
//! - [`chat`] - Conversational preference collection
//! - [`calendar`] - iCalendar export
//! - [`service`] - Planning service client
//! - [`session`] - The context tying it all together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod calendar;
pub mod chat;
pub mod cli;
pub mod config;
pub mod domain;
pub mod events;
pub mod geo;
pub mod itinerary;
pub mod route;
pub mod service;
pub mod session;

// Re-export commonly used types
pub use calendar::CalendarExporter;
pub use chat::{ChatPhase, ChatState, ChatTurn, OfflineAssistant, PreferenceChat};
pub use config::Config;
pub use domain::{Coordinate, DataSource, GeoError, Itinerary, Origin, OriginSource, PreferenceSet, Stop};
pub use events::{EventBus, TripEvent};
pub use geo::{GeoResolver, ResolveTrigger, haversine_m};
pub use itinerary::{AssembleError, ItineraryAssembler};
pub use route::{RouteBuilder, RouteError};
pub use service::{Assistant, HttpPlannerClient, PlannerApi, ServiceError};
pub use session::{BuildOutcome, SessionParts, TripSession};
