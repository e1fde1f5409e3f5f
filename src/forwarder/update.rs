//! Sensor update model and the report → update mapping

use serde::{Deserialize, Serialize};

use super::traffic::TrafficSummary;
use crate::ais::{FieldValue, Fields, VesselReport};

/// Home Assistant rejects state strings longer than this.
pub const MAX_STATE_CHARS: usize = 255;

/// State reported while traffic on the topic cannot be decoded
pub const UNDECODED_STATE: &str = "undecoded";

/// Body of a sensor-state request: `{"state": ..., "attributes": {...}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    pub state: String,
    pub attributes: Fields,
}

impl SensorUpdate {
    pub fn new(state: impl Into<String>, attributes: Fields) -> Self {
        Self {
            state: truncate_chars(&state.into(), MAX_STATE_CHARS),
            attributes,
        }
    }

    /// Adds traffic attributes. A name carried by the report itself wins over
    /// a remembered one.
    pub fn with_traffic(mut self, summary: &TrafficSummary) -> Self {
        self.attributes.insert(
            "recent_vessels".to_string(),
            FieldValue::Int(summary.recent_vessels as i64),
        );
        if let Some(name) = &summary.known_name {
            self.attributes
                .entry("name".to_string())
                .or_insert_with(|| FieldValue::Text(name.clone()));
        }
        self
    }
}

/// Cuts `text` to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

/// Maps a report to the update sent to the sensor endpoint.
///
/// Decoded reports use the MMSI as state and exactly the decoded fields as
/// attributes. Undecoded reports still yield an update with the
/// [`UNDECODED_STATE`] sentinel, so the sensor keeps showing activity.
pub fn map(report: &VesselReport) -> SensorUpdate {
    match (report.decode_error(), report.mmsi()) {
        (None, Some(mmsi)) => SensorUpdate::new(mmsi.to_string(), report.fields().clone()),
        (error, _) => {
            let mut attributes = Fields::new();
            attributes.insert(
                "error".to_string(),
                FieldValue::Text(
                    error
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "no MMSI".to_string()),
                ),
            );
            attributes.insert(
                "payload".to_string(),
                FieldValue::Text(truncate_chars(
                    &String::from_utf8_lossy(report.source_payload()),
                    MAX_STATE_CHARS,
                )),
            );
            SensorUpdate::new(UNDECODED_STATE, attributes)
        }
    }
}
