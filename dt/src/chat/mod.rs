//! PreferenceChat - collect trip preferences through a guided conversation
//!
//! The assistant either asks one question (single select, multiselect or a
//! date) or declares the preferences complete. [`ChatState`] holds the pure
//! transition logic; [`PreferenceChat`] sends the requests it produces.

pub(crate) mod offline;
mod session;
pub(crate) mod state;

pub use offline::{OfflineAssistant, template_explanation};
pub use session::PreferenceChat;
pub use state::{ChatEffect, ChatError, ChatEvent, ChatPhase, ChatPrompt, ChatState, ChatTurn, Sender};
