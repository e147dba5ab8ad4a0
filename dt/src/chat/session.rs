//! PreferenceChat - async driver around the chat state machine

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{ChatEffect, ChatError, ChatEvent, ChatState};
use crate::domain::PreferenceSet;
use crate::events::{EventBus, TripEvent};
use crate::service::{Assistant, ServiceError};

/// Runs one conversation against an [`Assistant`]
///
/// Calls take `&mut self`, so a shared session keeps this behind a mutex and
/// requests never overlap.
pub struct PreferenceChat {
    state: ChatState,
    assistant: Arc<dyn Assistant>,
    events: EventBus,
    cancel: CancellationToken,
}

impl PreferenceChat {
    pub fn new(assistant: Arc<dyn Assistant>, events: EventBus, cancel: CancellationToken) -> Self {
        debug!("PreferenceChat::new: called");
        Self {
            state: ChatState::new(),
            assistant,
            events,
            cancel,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Preferences declared complete by the assistant
    pub fn ready_prefs(&self) -> Option<&PreferenceSet> {
        self.state.ready_prefs()
    }

    /// Seed preferences the assistant should not ask about again
    pub fn preload(&mut self, prefs: PreferenceSet) {
        debug!(fields = prefs.len(), "preload: called");
        if self.state.turns().is_empty() && !self.state.is_pending() {
            self.state = ChatState::with_prefs(prefs);
        }
    }

    pub async fn open(&mut self) -> Result<(), ChatError> {
        self.dispatch(ChatEvent::Open).await
    }

    pub async fn choose(&mut self, option: impl Into<String>) -> Result<(), ChatError> {
        self.dispatch(ChatEvent::Choose(option.into())).await
    }

    pub async fn toggle(&mut self, option: impl Into<String>) -> Result<(), ChatError> {
        self.dispatch(ChatEvent::Toggle(option.into())).await
    }

    pub async fn confirm(&mut self) -> Result<(), ChatError> {
        self.dispatch(ChatEvent::Confirm).await
    }

    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ChatError> {
        self.dispatch(ChatEvent::Text(text.into())).await
    }

    pub async fn restart(&mut self) -> Result<(), ChatError> {
        self.dispatch(ChatEvent::Restart).await
    }

    async fn dispatch(&mut self, event: ChatEvent) -> Result<(), ChatError> {
        let Some(ChatEffect::Request(request)) = self.apply(event)? else {
            return Ok(());
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("dispatch: torn down while waiting for the assistant");
                self.apply(ChatEvent::Cancelled)?;
                return Ok(());
            }
            result = self.assistant.next_step(&request) => result,
        };

        let event = match result {
            Ok(reply) => ChatEvent::Reply(reply),
            Err(ServiceError::Malformed(reason) | ServiceError::InvalidResponse(reason)) => {
                warn!(%reason, "dispatch: unrecognized assistant reply");
                ChatEvent::Malformed(reason)
            }
            Err(e) => {
                warn!(error = %e, "dispatch: assistant request failed");
                ChatEvent::Failed(e.to_string())
            }
        };
        self.apply(event)?;
        if self.state.ready_prefs().is_some() {
            info!(fields = self.state.prefs().len(), "Preferences ready");
        }
        Ok(())
    }

    /// Apply one event and publish any turns it appended
    fn apply(&mut self, event: ChatEvent) -> Result<Option<ChatEffect>, ChatError> {
        let before = self.state.turns().len();
        let effect = self.state.apply(event)?;
        for turn in &self.state.turns()[before.min(self.state.turns().len())..] {
            self.events.emit(TripEvent::ChatTurn { turn: turn.clone() });
        }
        Ok(effect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::offline::OfflineAssistant;
    use crate::chat::state::{ChatPhase, Sender};
    use crate::service::mock::{MockAssistant, MockReply};
    use crate::service::{AssistantReply, InputKind};
    use std::time::Duration;

    fn ask(field: &str, input_kind: InputKind, options: &[&str]) -> MockReply {
        MockReply::Reply(AssistantReply::Ask {
            question: format!("{field}?"),
            field: field.to_string(),
            input_kind,
            options: options.iter().map(|o| o.to_string()).collect(),
            note: None,
        })
    }

    fn ready(date: &str) -> MockReply {
        let mut prefs = PreferenceSet::new();
        prefs.set("date", date);
        MockReply::Reply(AssistantReply::Ready { prefs, note: None })
    }

    #[tokio::test]
    async fn test_scripted_conversation_reaches_ready() {
        let assistant = Arc::new(MockAssistant::new(vec![
            ask("budget", InputKind::Single, &["low", "medium", "high"]),
            ask("tags", InputKind::Multiselect, &["art", "food", "park"]),
            ready("2025-10-26"),
        ]));
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let mut chat = PreferenceChat::new(assistant.clone(), events, CancellationToken::new());

        chat.open().await.unwrap();
        assert_eq!(chat.state().phase(), ChatPhase::AnsweringSingle);
        chat.choose("medium").await.unwrap();
        assert_eq!(chat.state().phase(), ChatPhase::AnsweringMulti);
        chat.toggle("food").await.unwrap();
        chat.toggle("art").await.unwrap();
        chat.confirm().await.unwrap();

        assert_eq!(chat.state().phase(), ChatPhase::Ready);
        let prefs = chat.ready_prefs().unwrap();
        assert_eq!(prefs.budget(), Some("medium"));
        assert_eq!(prefs.tags(), vec!["art", "food"]);
        assert_eq!(prefs.date_str(), Some("2025-10-26"));
        let mut fields: Vec<&str> = prefs.field_names().collect();
        fields.sort_unstable();
        assert_eq!(fields, ["budget", "date", "tags"]);

        let requests = assistant.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].known_prefs.is_empty());
        assert_eq!(requests[2].known_prefs.budget(), Some("medium"));

        let mut published = 0;
        while let Ok(TripEvent::ChatTurn { .. }) = rx.try_recv() {
            published += 1;
        }
        assert_eq!(published, chat.state().turns().len());
    }

    #[tokio::test]
    async fn test_transport_failure_then_retry() {
        let assistant = Arc::new(MockAssistant::new(vec![MockReply::Down, ask("date", InputKind::Date, &[])]));
        let mut chat = PreferenceChat::new(assistant, EventBus::default(), CancellationToken::new());

        chat.open().await.unwrap();
        let last = chat.state().turns().last().unwrap();
        assert_eq!(last.sender, Sender::Assistant);
        assert_eq!(chat.state().phase(), ChatPhase::AwaitingQuestion);

        chat.send_text("hello again").await.unwrap();
        assert_eq!(chat.state().phase(), ChatPhase::AnsweringSingle);
    }

    #[tokio::test]
    async fn test_malformed_reply_apologizes() {
        let assistant = Arc::new(MockAssistant::new(vec![MockReply::Malformed]));
        let mut chat = PreferenceChat::new(assistant, EventBus::default(), CancellationToken::new());
        chat.open().await.unwrap();
        assert_eq!(
            chat.state().turns().last().unwrap().text,
            crate::chat::state::APOLOGY_MESSAGE
        );
        assert!(chat.state().prompt().is_none());
    }

    #[tokio::test]
    async fn test_teardown_discards_pending_reply() {
        let assistant =
            Arc::new(MockAssistant::new(vec![ask("date", InputKind::Date, &[])]).with_delay(Duration::from_secs(5)));
        let cancel = CancellationToken::new();
        let mut chat = PreferenceChat::new(assistant, EventBus::default(), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });
        chat.open().await.unwrap();
        canceller.await.unwrap();

        assert!(chat.state().turns().is_empty());
        assert!(!chat.state().is_pending());
    }

    #[tokio::test]
    async fn test_preloaded_prefs_are_sent_and_not_asked() {
        let mut known = PreferenceSet::new();
        known.set("date", "2025-10-26");
        let assistant = Arc::new(OfflineAssistant::new("Rostov-on-Don"));
        let mut chat = PreferenceChat::new(assistant, EventBus::default(), CancellationToken::new());
        chat.preload(known);

        chat.open().await.unwrap();
        assert_eq!(chat.state().prompt().unwrap().field, "tags");
        chat.toggle("park").await.unwrap();
        chat.confirm().await.unwrap();
        chat.choose("high").await.unwrap();
        chat.choose("relaxed").await.unwrap();
        assert_eq!(chat.ready_prefs().unwrap().date_str(), Some("2025-10-26"));

        // Ignored once the conversation has started
        let mut other = PreferenceSet::new();
        other.set("date", "2025-11-01");
        chat.preload(other);
        assert_eq!(chat.state().prefs().date_str(), Some("2025-10-26"));
    }

    #[tokio::test]
    async fn test_offline_flow_end_to_end() {
        let assistant = Arc::new(OfflineAssistant::new("Rostov-on-Don"));
        let mut chat = PreferenceChat::new(assistant, EventBus::default(), CancellationToken::new());

        chat.open().await.unwrap();
        chat.send_text("2025-10-26").await.unwrap();
        chat.toggle("museum").await.unwrap();
        chat.confirm().await.unwrap();
        chat.choose("low").await.unwrap();
        chat.choose("fast").await.unwrap();

        let prefs = chat.ready_prefs().unwrap();
        assert_eq!(prefs.city(), Some("Rostov-on-Don"));
        assert_eq!(prefs.pace(), Some("fast"));
        assert_eq!(prefs.tags(), vec!["museum"]);
    }
}
