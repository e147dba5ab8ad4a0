//! Built-in question flow used without an assistant service

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::domain::tags::{allowed_tags, normalize_tags};
use crate::domain::{PreferenceSet, Stop};
use crate::service::{Assistant, AssistantReply, InputKind, NextStepRequest, ServiceError};

struct Step {
    field: &'static str,
    question: &'static str,
    input_kind: InputKind,
    options: fn() -> Vec<String>,
}

fn no_options() -> Vec<String> {
    vec![]
}

fn budget_options() -> Vec<String> {
    ["low", "medium", "high"].map(String::from).to_vec()
}

fn pace_options() -> Vec<String> {
    ["relaxed", "normal", "fast"].map(String::from).to_vec()
}

const FLOW: &[Step] = &[
    Step {
        field: "date",
        question: "Which day are we planning? Use the YYYY-MM-DD format.",
        input_kind: InputKind::Date,
        options: no_options,
    },
    Step {
        field: "tags",
        question: "What are you interested in? Pick as many as you like.",
        input_kind: InputKind::Multiselect,
        options: allowed_tags,
    },
    Step {
        field: "budget",
        question: "What budget should we plan for? (low / medium / high)",
        input_kind: InputKind::Single,
        options: budget_options,
    },
    Step {
        field: "pace",
        question: "What walking pace is comfortable? (relaxed / normal / fast)",
        input_kind: InputKind::Single,
        options: pace_options,
    },
];

fn is_answered(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Asks date, tags, budget and pace in turn, then declares the set ready
pub struct OfflineAssistant {
    city: String,
    note: Option<String>,
}

impl OfflineAssistant {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            note: None,
        }
    }

    /// Attach a note (e.g. why the live assistant is not used) to every reply
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// The next reply for `known`; pure, so it also backs the CLI flag path
    pub fn reply_for(&self, known: &PreferenceSet) -> AssistantReply {
        let mut prefs = known.clone();
        if prefs.contains("tags") {
            prefs.set("tags", normalize_tags(&prefs.tags()));
        }
        if !is_answered(prefs.get("city")) {
            prefs.set("city", self.city.clone());
        }

        if let Some(step) = FLOW.iter().find(|s| !is_answered(prefs.get(s.field))) {
            return AssistantReply::Ask {
                question: step.question.to_string(),
                field: step.field.to_string(),
                input_kind: step.input_kind,
                options: (step.options)(),
                note: self.note.clone(),
            };
        }

        let mut ready = PreferenceSet::new();
        for field in ["date", "city"] {
            if let Some(value) = prefs.get(field) {
                ready.set(field, value.clone());
            }
        }
        ready.set("tags", prefs.tags());
        ready.set("budget", prefs.budget().unwrap_or("medium"));
        ready.set("pace", prefs.pace().unwrap_or("normal"));
        AssistantReply::Ready {
            prefs: ready,
            note: self.note.clone(),
        }
    }
}

#[async_trait]
impl Assistant for OfflineAssistant {
    async fn next_step(&self, request: &NextStepRequest) -> Result<AssistantReply, ServiceError> {
        debug!(known = request.known_prefs.len(), "OfflineAssistant::next_step: called");
        Ok(self.reply_for(&request.known_prefs))
    }
}

/// Short route explanation used when the assistant cannot write one
pub fn template_explanation(stops: &[Stop]) -> String {
    let Some(first) = stops.first() else {
        return "The route is empty, try choosing other interests.".to_string();
    };
    let last = stops.last().map_or(&first.name, |s| &s.name);
    format!(
        "Start at {}, to get a feel for the city right away. Then the route goes through {} more stops and finishes at {}.",
        first.name,
        stops.len().saturating_sub(2),
        last
    )
}
