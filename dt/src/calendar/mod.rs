//! CalendarExporter - itinerary to iCalendar (RFC 5545) text
//!
//! One VEVENT per stop. Stops without times get a synthesized schedule
//! starting at a fixed hour with a fixed dwell per stop.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::CalendarConfig;
use crate::domain::{Itinerary, Stop};

const PRODID: &str = "-//daytrip//route//EN";
const CRLF: &str = "\r\n";
const LOCAL_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Escape the four characters RFC 5545 reserves in TEXT values
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Serializes itineraries as calendar files
#[derive(Debug, Clone)]
pub struct CalendarExporter {
    config: CalendarConfig,
}

impl Default for CalendarExporter {
    fn default() -> Self {
        Self::new(CalendarConfig::default())
    }
}

impl CalendarExporter {
    pub fn new(config: CalendarConfig) -> Self {
        Self { config }
    }

    /// Export an assembled itinerary, stamped with the current time
    pub fn export(&self, itinerary: &Itinerary) -> String {
        self.export_stops(&itinerary.stops, itinerary.date, &itinerary.city, Utc::now())
    }

    /// Export `stops` for `date`; empty input yields empty output
    pub fn export_stops(&self, stops: &[Stop], date: NaiveDate, city: &str, now: DateTime<Utc>) -> String {
        debug!(stop_count = stops.len(), %date, "export_stops: called");
        if stops.is_empty() {
            return String::new();
        }

        let tzid = &self.config.tzid;
        let name = self
            .config
            .calendar_name
            .clone()
            .unwrap_or_else(|| format!("Day trip: {city}"));
        let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut lines: Vec<String> = vec![
            "BEGIN:VCALENDAR".to_string(),
            "VERSION:2.0".to_string(),
            format!("PRODID:{PRODID}"),
            "CALSCALE:GREGORIAN".to_string(),
            format!("X-WR-CALNAME:{}", escape_text(&name)),
            format!("X-WR-TIMEZONE:{tzid}"),
            "BEGIN:VTIMEZONE".to_string(),
            format!("TZID:{tzid}"),
            "BEGIN:STANDARD".to_string(),
            "DTSTART:19700101T000000".to_string(),
            format!("TZOFFSETFROM:{}", self.config.utc_offset),
            format!("TZOFFSETTO:{}", self.config.utc_offset),
            "END:STANDARD".to_string(),
            "END:VTIMEZONE".to_string(),
        ];

        for (idx, (stop, (start, end))) in stops.iter().zip(self.schedule(stops, date)).enumerate() {
            let location = if stop.tags.is_empty() {
                stop.description.clone().unwrap_or_default()
            } else {
                stop.tags.join(", ")
            };
            let description = stop
                .description
                .clone()
                .unwrap_or_else(|| format!("Stop {} of {}", idx + 1, stops.len()));

            lines.push("BEGIN:VEVENT".to_string());
            lines.push(format!("UID:{}", event_uid(idx, start, &stop.name)));
            lines.push(format!("DTSTAMP:{stamp}"));
            lines.push(format!("DTSTART;TZID={tzid}:{}", start.format(LOCAL_FORMAT)));
            lines.push(format!("DTEND;TZID={tzid}:{}", end.format(LOCAL_FORMAT)));
            lines.push(format!("SUMMARY:{}", escape_text(&stop.name)));
            lines.push(format!("LOCATION:{}", escape_text(&location)));
            lines.push(format!("DESCRIPTION:{}", escape_text(&description)));
            lines.push(format!("GEO:{:.6};{:.6}", stop.coordinate.lat(), stop.coordinate.lon()));
            lines.push("END:VEVENT".to_string());
        }
        lines.push("END:VCALENDAR".to_string());

        let mut out = lines.join(CRLF);
        out.push_str(CRLF);
        out
    }

    /// Start/end per stop: given times where present, otherwise sequential slots
    fn schedule(&self, stops: &[Stop], date: NaiveDate) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        let dwell = Duration::minutes(i64::from(self.config.stop_minutes));
        let gap = Duration::minutes(i64::from(self.config.gap_minutes));
        let first = NaiveTime::from_hms_opt(self.config.start_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
        let mut cursor = date.and_time(first);

        stops
            .iter()
            .map(|stop| {
                let start = stop.arrive.unwrap_or(cursor);
                let end = match stop.leave {
                    Some(leave) if leave >= start => leave,
                    _ => start + dwell,
                };
                cursor = end + gap;
                (start, end)
            })
            .collect()
    }
}

/// Stable per-event identifier, so re-exporting the same itinerary gives the same UIDs
fn event_uid(index: usize, start: NaiveDateTime, name: &str) -> String {
    let key = format!("{index}|{}|{name}", start.format(LOCAL_FORMAT));
    format!("{}@daytrip", Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()))
}
