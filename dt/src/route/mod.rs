//! RouteBuilder - walkable path through the day's stops
//!
//! Tries an ordered list of [`RouteStrategy`]s: an external directions
//! provider first (when configured), then a straight-line estimate that
//! cannot fail.

mod builder;
mod directions;
mod error;

pub use builder::{ProviderStrategy, RouteBuilder, RouteStrategy, StraightLineStrategy, straight_line};
pub use directions::{DirectionsProvider, DirectionsResponse, LegEstimate, OsrmDirections};
pub use error::RouteError;

/// Mean walking speed for the straight-line fallback (about 4 km/h)
pub const WALKING_SPEED_MPS: f64 = 1.1;

/// Directions providers accept at most this many waypoints
pub const MAX_ROUTE_POINTS: usize = 10;
