//! Domain types shared by every component of the trip engine
//!
//! Everything in here is plain data: coordinates, origins, stops, itineraries
//! and the open preference map accumulated by the chat.

mod coordinate;
mod itinerary;
mod prefs;
pub mod tags;

pub use coordinate::{Coordinate, GeoError, Origin, OriginSource};
pub use itinerary::{DataSource, Itinerary, Leg, RoutedPath, Stop};
pub use prefs::{PreferenceSet, parse_trip_date};
