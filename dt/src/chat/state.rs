//! Conversation state machine
//!
//! `ChatState::apply` is pure: it updates the log, prompt and preferences
//! and returns the request to send, if any. Sending and awaiting the reply
//! is the driver's job (see `PreferenceChat`).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{PreferenceSet, parse_trip_date};
use crate::service::{AssistantReply, InputKind, NextStepRequest};

pub(crate) const READY_MESSAGE: &str = "Got it, everything is ready to build the route.";
pub(crate) const APOLOGY_MESSAGE: &str = "Sorry, I did not understand the assistant's answer. Please try again.";

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Assistant,
    User,
}

/// One entry of the append-only chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub sender: Sender,
    pub text: String,
}

impl ChatTurn {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }
}

/// The open question's answer form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub field: String,
    pub input_kind: InputKind,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatPhase {
    #[default]
    Idle,
    AwaitingQuestion,
    AnsweringSingle,
    AnsweringMulti,
    Ready,
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Start the conversation, or resend the known preferences
    Open,
    /// Decoded assistant reply
    Reply(AssistantReply),
    /// Assistant answered with a shape nobody recognizes
    Malformed(String),
    /// Assistant unreachable, timed out or returned an error status
    Failed(String),
    /// The pending request was abandoned without an answer
    Cancelled,
    /// Pick one option of a single-select or date prompt
    Choose(String),
    /// Flip one option of a multiselect prompt
    Toggle(String),
    /// Submit the multiselect selection
    Confirm,
    /// Free text from the user
    Text(String),
    /// Drop everything and go back to Idle
    Restart,
}

/// What the driver must do after an event
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEffect {
    Request(NextStepRequest),
}

#[derive(Debug, Error, PartialEq)]
pub enum ChatError {
    #[error("A request to the assistant is already pending")]
    RequestPending,

    #[error("No question is open for this kind of answer")]
    NoPrompt,

    #[error("{0:?} is not one of the offered options")]
    UnknownOption(String),

    #[error("Date must be YYYY-MM-DD, got {0:?}")]
    InvalidDate(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Preferences are complete; restart to change them")]
    Finished,

    #[error("No request is pending")]
    NotPending,
}

/// Conversation log, open prompt and collected preferences
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    phase: ChatPhase,
    turns: Vec<ChatTurn>,
    prompt: Option<ChatPrompt>,
    selection: Vec<String>,
    prefs: PreferenceSet,
    pending: bool,
    ready: Option<PreferenceSet>,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from already known preferences (e.g. CLI flags)
    pub fn with_prefs(prefs: PreferenceSet) -> Self {
        Self {
            prefs,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn prompt(&self) -> Option<&ChatPrompt> {
        self.prompt.as_ref()
    }

    /// Current multiselect selection, in toggle order
    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    pub fn prefs(&self) -> &PreferenceSet {
        &self.prefs
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Snapshot taken when the assistant declared the preferences complete
    pub fn ready_prefs(&self) -> Option<&PreferenceSet> {
        self.ready.as_ref()
    }

    pub fn apply(&mut self, event: ChatEvent) -> Result<Option<ChatEffect>, ChatError> {
        debug!(phase = ?self.phase, pending = self.pending, ?event, "apply: called");
        match event {
            ChatEvent::Open => {
                self.ensure_can_send()?;
                if self.phase == ChatPhase::Ready {
                    return Ok(None);
                }
                self.prompt = None;
                self.selection.clear();
                Ok(Some(self.send(None)))
            }
            ChatEvent::Reply(reply) => {
                self.take_pending()?;
                self.on_reply(reply);
                Ok(None)
            }
            ChatEvent::Malformed(reason) => {
                self.take_pending()?;
                debug!(%reason, "apply: malformed reply");
                self.turns.push(ChatTurn::assistant(APOLOGY_MESSAGE));
                self.phase = ChatPhase::AwaitingQuestion;
                Ok(None)
            }
            ChatEvent::Failed(reason) => {
                self.take_pending()?;
                self.turns.push(ChatTurn::assistant(format!(
                    "Could not reach the assistant ({reason}). Send a message to try again."
                )));
                self.phase = ChatPhase::AwaitingQuestion;
                Ok(None)
            }
            ChatEvent::Cancelled => {
                self.pending = false;
                Ok(None)
            }
            ChatEvent::Choose(option) => self.choose(option),
            ChatEvent::Toggle(option) => self.toggle(option).map(|_| None),
            ChatEvent::Confirm => self.confirm(),
            ChatEvent::Text(text) => self.text(text),
            ChatEvent::Restart => {
                *self = Self::default();
                Ok(None)
            }
        }
    }

    fn ensure_can_send(&self) -> Result<(), ChatError> {
        if self.pending {
            return Err(ChatError::RequestPending);
        }
        Ok(())
    }

    fn take_pending(&mut self) -> Result<(), ChatError> {
        if !self.pending {
            return Err(ChatError::NotPending);
        }
        self.pending = false;
        Ok(())
    }

    /// Close the prompt and emit the request carrying everything known so far
    fn send(&mut self, message: Option<String>) -> ChatEffect {
        self.prompt = None;
        self.selection.clear();
        self.pending = true;
        self.phase = ChatPhase::AwaitingQuestion;
        ChatEffect::Request(NextStepRequest {
            known_prefs: self.prefs.clone(),
            message,
        })
    }

    fn on_reply(&mut self, reply: AssistantReply) {
        match reply {
            AssistantReply::Ask {
                question,
                field,
                input_kind,
                options,
                note,
            } => {
                self.turns.push(ChatTurn::assistant(question));
                if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
                    self.turns.push(ChatTurn::assistant(note));
                }
                self.phase = match input_kind {
                    InputKind::Multiselect => ChatPhase::AnsweringMulti,
                    InputKind::Date | InputKind::Single => ChatPhase::AnsweringSingle,
                };
                self.selection.clear();
                self.prompt = Some(ChatPrompt {
                    field,
                    input_kind,
                    options,
                });
            }
            AssistantReply::Ready { prefs, note } => {
                let text = note
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| READY_MESSAGE.to_string());
                self.turns.push(ChatTurn::assistant(text));
                self.prefs.merge(&prefs);
                self.prompt = None;
                self.selection.clear();
                self.phase = ChatPhase::Ready;
                self.ready = Some(self.prefs.clone());
            }
        }
    }

    fn choose(&mut self, option: String) -> Result<Option<ChatEffect>, ChatError> {
        self.ensure_can_send()?;
        let prompt = match (&self.phase, &self.prompt) {
            (ChatPhase::AnsweringSingle, Some(prompt)) => prompt,
            _ => return Err(ChatError::NoPrompt),
        };
        if prompt.input_kind == InputKind::Date {
            return self.answer_date(option);
        }
        if !prompt.options.contains(&option) {
            return Err(ChatError::UnknownOption(option));
        }
        let field = prompt.field.clone();
        self.prefs.set(field, option.clone());
        self.turns.push(ChatTurn::user(option));
        Ok(Some(self.send(None)))
    }

    fn toggle(&mut self, option: String) -> Result<(), ChatError> {
        let prompt = match (&self.phase, &self.prompt) {
            (ChatPhase::AnsweringMulti, Some(prompt)) => prompt,
            _ => return Err(ChatError::NoPrompt),
        };
        if !prompt.options.contains(&option) {
            return Err(ChatError::UnknownOption(option));
        }
        match self.selection.iter().position(|s| *s == option) {
            Some(idx) => {
                self.selection.remove(idx);
            }
            None => self.selection.push(option),
        }
        Ok(())
    }

    fn confirm(&mut self) -> Result<Option<ChatEffect>, ChatError> {
        self.ensure_can_send()?;
        let prompt = match (&self.phase, &self.prompt) {
            (ChatPhase::AnsweringMulti, Some(prompt)) => prompt,
            _ => return Err(ChatError::NoPrompt),
        };
        if self.selection.is_empty() {
            return Ok(None);
        }
        let chosen: Vec<String> = prompt
            .options
            .iter()
            .filter(|o| self.selection.contains(o))
            .cloned()
            .collect();
        let field = prompt.field.clone();
        self.turns.push(ChatTurn::user(chosen.join(", ")));
        self.prefs.set(field, chosen);
        Ok(Some(self.send(None)))
    }

    fn text(&mut self, text: String) -> Result<Option<ChatEffect>, ChatError> {
        self.ensure_can_send()?;
        if self.phase == ChatPhase::Ready {
            return Err(ChatError::Finished);
        }
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let Some(prompt) = self.prompt.clone() else {
            self.turns.push(ChatTurn::user(text.clone()));
            return Ok(Some(self.send(Some(text))));
        };
        match prompt.input_kind {
            InputKind::Date => self.answer_date(text),
            InputKind::Single => {
                self.prefs.set(prompt.field, text.clone());
                self.turns.push(ChatTurn::user(text));
                Ok(Some(self.send(None)))
            }
            InputKind::Multiselect => {
                let values: Vec<String> = text
                    .split([',', ';'])
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                self.prefs.set(prompt.field, values);
                self.turns.push(ChatTurn::user(text));
                Ok(Some(self.send(None)))
            }
        }
    }

    fn answer_date(&mut self, text: String) -> Result<Option<ChatEffect>, ChatError> {
        let field = match &self.prompt {
            Some(prompt) => prompt.field.clone(),
            None => return Err(ChatError::NoPrompt),
        };
        let date = parse_trip_date(&text).ok_or_else(|| ChatError::InvalidDate(text.clone()))?;
        self.prefs.set(field, date.format("%Y-%m-%d").to_string());
        self.turns.push(ChatTurn::user(text));
        Ok(Some(self.send(None)))
    }
}
