//! ItineraryAssembler - preferences and origin into a day plan
//!
//! Stops come from an ordered list of [`StopSource`]s (the planning service,
//! then a fixed demo set), are validated and labelled, routed from the origin
//! and exported to a calendar.

mod assembler;
mod source;

pub use assembler::{AssembleError, ItineraryAssembler};
pub use source::{DemoSource, PlannerSource, SourcedPlan, StopSource};

/// Upper bound on stops kept from a plan
pub const MAX_STOPS: usize = 10;

/// Search radius bounds accepted by the planning service
pub const MIN_RADIUS_M: u32 = 100;
pub const MAX_RADIUS_M: u32 = 2000;
