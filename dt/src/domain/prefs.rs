//! The open preference map accumulated across a chat session or CLI flags

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name → value mapping (date, city, tags, budget, pace, ...)
///
/// Merges overwrite field by field. Fields never answered stay absent so the
/// assistant can tell what it still has to ask.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreferenceSet {
    fields: Map<String, Value>,
}

impl PreferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one answered field, replacing any prior value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Overlay every field of `other` onto this set
    pub fn merge(&mut self, other: &PreferenceSet) {
        for (k, v) in &other.fields {
            self.fields.insert(k.clone(), v.clone());
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn date_str(&self) -> Option<&str> {
        self.str_field("date")
    }

    /// Trip date, if present and well formed
    pub fn date(&self) -> Option<NaiveDate> {
        self.date_str().and_then(parse_trip_date)
    }

    pub fn city(&self) -> Option<&str> {
        self.str_field("city")
    }

    pub fn budget(&self) -> Option<&str> {
        self.str_field("budget")
    }

    pub fn pace(&self) -> Option<&str> {
        self.str_field("pace")
    }

    /// Interest tags; a lone string is treated as a comma separated list
    pub fn tags(&self) -> Vec<String> {
        match self.fields.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split([',', ';'])
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            _ => vec![],
        }
    }
}

impl From<Map<String, Value>> for PreferenceSet {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Parse "YYYY-MM-DD", also accepting a full ISO datetime
pub fn parse_trip_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok().map(|dt| dt.date()))
}
