//! Wire types for the planning service

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Coordinate, GeoError, PreferenceSet, Stop};

/// Starting point forwarded with a plan request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

/// `POST /plan` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub date: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_location: Option<UserLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_m: Option<u32>,
}

/// One stop as the service returns it; nothing is trusted yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireStop {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Value,
    #[serde(default)]
    pub lon: Value,
    #[serde(default)]
    pub arrive: Option<String>,
    #[serde(default)]
    pub leave: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl WireStop {
    /// Validated coordinate; missing or non-numeric values are invalid
    pub fn coordinate(&self) -> Result<Coordinate, GeoError> {
        let lat = self.lat.as_f64().unwrap_or(f64::NAN);
        let lon = self.lon.as_f64().unwrap_or(f64::NAN);
        Coordinate::new(lat, lon)
    }
}

/// `POST /plan` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub stops: Vec<WireStop>,
    #[serde(default)]
    pub total_time: Option<String>,
    #[serde(default)]
    pub total_minutes: Option<u64>,
    #[serde(default)]
    pub ics: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub optimized: bool,
}

/// `POST /llm/next` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NextStepRequest {
    pub known_prefs: PreferenceSet,
    /// Free text not bound to any open question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// How the open question expects to be answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Date,
    #[default]
    Single,
    Multiselect,
}

/// `POST /llm/next` response, discriminated by `mode`
///
/// Any other `mode` fails to deserialize and is handled as a malformed reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AssistantReply {
    Ask {
        question: String,
        field: String,
        #[serde(rename = "input", default)]
        input_kind: InputKind,
        #[serde(default)]
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Ready {
        prefs: PreferenceSet,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

/// Stop shape accepted by `/llm/explain`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainStop {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub arrive: String,
    pub leave: String,
    pub tags: Vec<String>,
}

impl From<&Stop> for ExplainStop {
    fn from(stop: &Stop) -> Self {
        let iso = |t: Option<chrono::NaiveDateTime>| t.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string()).unwrap_or_default();
        Self {
            name: stop.name.clone(),
            lat: stop.coordinate.lat(),
            lon: stop.coordinate.lon(),
            arrive: iso(stop.arrive),
            leave: iso(stop.leave),
            tags: stop.tags.clone(),
        }
    }
}

/// `POST /llm/explain` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub prefs: PreferenceSet,
    pub stops: Vec<ExplainStop>,
}

/// `POST /llm/explain` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub text: String,
}

/// Body of `GET /tags` and both sides of `POST /normalize_tags`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagsPayload {
    #[serde(default)]
    pub tags: Vec<String>,
}
