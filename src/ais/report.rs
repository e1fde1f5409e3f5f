//! Vessel report model shared by the source and the forwarder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::decoder::{self, DecodeError, DecodedMessage};
use crate::mqtt::message::InboundMessage;

/// Attribute map keyed by field name. Ordered so two reports with the same
/// content always compare and serialize identically.
pub type Fields = BTreeMap<String, FieldValue>;

/// Scalar value of a decoded AIS field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// One decoded (or undecodable) unit of work, created per inbound MQTT message.
///
/// Fields are private so a report cannot change after construction; the
/// forwarder only ever reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct VesselReport {
    source_payload: Vec<u8>,
    topic: String,
    received_at: DateTime<Utc>,
    mmsi: Option<u32>,
    message_type: Option<u8>,
    fields: Fields,
    decode_error: Option<DecodeError>,
}

impl VesselReport {
    /// Decodes a payload into a report. Decoding failures never propagate;
    /// they produce a report with `decoded() == false`.
    pub fn decode(topic: &str, payload: &[u8], received_at: DateTime<Utc>) -> Self {
        match decoder::decode(payload) {
            Ok(DecodedMessage {
                mmsi,
                message_type,
                fields,
            }) => Self {
                source_payload: payload.to_vec(),
                topic: topic.to_string(),
                received_at,
                mmsi: Some(mmsi),
                message_type: Some(message_type),
                fields,
                decode_error: None,
            },
            Err(e) => Self {
                source_payload: payload.to_vec(),
                topic: topic.to_string(),
                received_at,
                mmsi: None,
                message_type: None,
                fields: Fields::new(),
                decode_error: Some(e),
            },
        }
    }

    pub fn from_message(message: &InboundMessage) -> Self {
        Self::decode(&message.topic, &message.payload, message.received_at)
    }

    pub fn decoded(&self) -> bool {
        self.decode_error.is_none()
    }

    pub fn decode_error(&self) -> Option<&DecodeError> {
        self.decode_error.as_ref()
    }

    pub fn mmsi(&self) -> Option<u32> {
        self.mmsi
    }

    pub fn message_type(&self) -> Option<u8> {
        self.message_type
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn source_payload(&self) -> &[u8] {
        &self.source_payload
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Ship name carried by the report itself, if any.
    pub fn ship_name(&self) -> Option<&str> {
        self.field("shipname")
            .or_else(|| self.field("name"))
            .and_then(FieldValue::as_text)
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_report_carries_identity() {
        let report = VesselReport::decode(
            "ais/data",
            b"!AIVDM,1,1,,B,15M:Ih0P1so?Vt@EWFs3Jjht0000,0*4F",
            Utc::now(),
        );
        assert!(report.decoded());
        assert_eq!(report.mmsi(), Some(366123456));
        assert_eq!(report.message_type(), Some(1));
        assert_eq!(report.topic(), "ais/data");
        assert_eq!(report.field("mmsi"), Some(&FieldValue::Int(366123456)));
    }

    #[test]
    fn garbage_yields_undecoded_report() {
        let report = VesselReport::decode("ais/data", b"hello there", Utc::now());
        assert!(!report.decoded());
        assert!(report.decode_error().is_some());
        assert_eq!(report.mmsi(), None);
        assert!(report.fields().is_empty());
        assert_eq!(report.source_payload(), b"hello there");
    }

    #[test]
    fn ship_name_prefers_shipname_field() {
        let payload = br#"{"mmsi":244123456,"type":24,"shipname":"NOORDAM","name":"other"}"#;
        let report = VesselReport::decode("ais/data", payload, Utc::now());
        assert_eq!(report.ship_name(), Some("NOORDAM"));
    }

    #[test]
    fn field_values_serialize_untagged() {
        let json = serde_json::to_string(&vec![
            FieldValue::Int(3),
            FieldValue::Float(1.5),
            FieldValue::Text("x".into()),
            FieldValue::Bool(true),
        ])
        .unwrap();
        assert_eq!(json, r#"[3,1.5,"x",true]"#);
    }
}
