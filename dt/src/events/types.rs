//! Event types emitted by the trip engine

use serde::{Deserialize, Serialize};

use crate::chat::ChatTurn;
use crate::domain::{DataSource, Origin};

/// Something the presentation layer may want to reflect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripEvent {
    /// A new origin became active
    OriginChanged { origin: Origin },

    /// A new itinerary replaced the previous one
    ItineraryUpdated {
        stop_count: usize,
        data_source: DataSource,
        used_fallback_route: bool,
    },

    /// A turn was appended to the chat log
    ChatTurn { turn: ChatTurn },

    /// Informational degradation notice (demo data, no directions, ...)
    Warning { message: String },
}

impl TripEvent {
    /// Short name for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::OriginChanged { .. } => "origin_changed",
            Self::ItineraryUpdated { .. } => "itinerary_updated",
            Self::ChatTurn { .. } => "chat_turn",
            Self::Warning { .. } => "warning",
        }
    }
}
