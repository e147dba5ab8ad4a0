//! Event bus - pub/sub for presentation-layer listeners
//!
//! The engine emits [`TripEvent`]s; whatever renders the trip (CLI output, a
//! map view) subscribes. Dropping the receiver releases the listener.

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
pub use types::TripEvent;
