//! Payload decoding into AIS fields
//!
//! Accepts the two forms receivers commonly publish to MQTT: a JSON object
//! with already-decoded fields, or a raw single-fragment AIVDM/AIVDO sentence.

use serde_json::Value;
use thiserror::Error;

use super::nmea::{self, Bits};
use super::report::{FieldValue, Fields};

const MAX_MMSI: u64 = 999_999_999;

/// Reasons a payload could not be turned into a vessel report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing or invalid MMSI")]
    MissingMmsi,

    #[error("missing or invalid message type")]
    MissingType,

    #[error("malformed sentence: {0}")]
    MalformedSentence(String),

    #[error("checksum mismatch: expected {expected:02X}, computed {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("multi-fragment sentence ({fragment}/{count}) not supported")]
    Fragmented { fragment: u8, count: u8 },

    #[error("invalid payload character '{0}'")]
    InvalidArmor(char),

    #[error("unsupported message type {0}")]
    UnsupportedType(u8),

    #[error("payload truncated: need {needed} bits, have {available}")]
    Truncated { needed: usize, available: usize },
}

/// Successfully decoded message
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub mmsi: u32,
    pub message_type: u8,
    pub fields: Fields,
}

pub fn decode(payload: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::InvalidUtf8)?;
    let text = text.trim();

    match text.as_bytes().first() {
        None => Err(DecodeError::Empty),
        Some(b'{') => decode_json(text),
        Some(_) => decode_sentence(text),
    }
}

fn decode_json(text: &str) -> Result<DecodedMessage, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::Json("expected an object".to_string()))?;

    let mmsi = object
        .get("mmsi")
        .and_then(Value::as_u64)
        .filter(|mmsi| (1..=MAX_MMSI).contains(mmsi))
        .ok_or(DecodeError::MissingMmsi)? as u32;

    let message_type = object
        .get("type")
        .and_then(Value::as_u64)
        .filter(|t| (1..=27).contains(t))
        .ok_or(DecodeError::MissingType)? as u8;

    let mut fields = Fields::new();
    for (key, value) in object {
        let key = if key == "type" { "message_type" } else { key.as_str() };
        let field = match value {
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => match n.as_f64() {
                    Some(f) => FieldValue::Float(f),
                    None => continue,
                },
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Null | Value::Array(_) | Value::Object(_) => continue,
        };
        fields.insert(key.to_string(), field);
    }

    Ok(DecodedMessage {
        mmsi,
        message_type,
        fields,
    })
}

fn decode_sentence(text: &str) -> Result<DecodedMessage, DecodeError> {
    let sentence = nmea::parse_sentence(text)?;
    if sentence.fragment_count != 1 {
        return Err(DecodeError::Fragmented {
            fragment: sentence.fragment_number,
            count: sentence.fragment_count,
        });
    }

    let bits = Bits::from_armored(sentence.payload, sentence.fill_bits)?;
    decode_bits(&bits)
}

/// Decodes the common header and the type-specific body.
pub fn decode_bits(bits: &Bits) -> Result<DecodedMessage, DecodeError> {
    let message_type = bits.unsigned(0, 6)? as u8;
    let mmsi = bits.unsigned(8, 30)?;
    if !(1..=MAX_MMSI).contains(&mmsi) {
        return Err(DecodeError::MissingMmsi);
    }
    let mmsi = mmsi as u32;

    let mut fields = Fields::new();
    fields.insert("message_type".to_string(), FieldValue::Int(message_type as i64));
    fields.insert("mmsi".to_string(), FieldValue::from(mmsi));

    match message_type {
        1..=3 => position_report_class_a(bits, &mut fields)?,
        4 => base_station_report(bits, &mut fields)?,
        18 => position_report_class_b(bits, &mut fields)?,
        24 => static_data_report(bits, &mut fields)?,
        other => return Err(DecodeError::UnsupportedType(other)),
    }

    Ok(DecodedMessage {
        mmsi,
        message_type,
        fields,
    })
}

fn insert(fields: &mut Fields, name: &str, value: impl Into<FieldValue>) {
    fields.insert(name.to_string(), value.into());
}

/// Longitude and latitude in 1/10000 minute; 181 and 91 mean "not available".
fn coordinates(bits: &Bits, lon_at: usize, lat_at: usize, fields: &mut Fields) -> Result<(), DecodeError> {
    let lon = bits.signed(lon_at, 28)? as f64 / 600_000.0;
    let lat = bits.signed(lat_at, 27)? as f64 / 600_000.0;
    if lon.abs() <= 180.0 {
        insert(fields, "lon", lon);
    }
    if lat.abs() <= 90.0 {
        insert(fields, "lat", lat);
    }
    Ok(())
}

/// Speed, course, heading and timestamp second shared by class A and B reports.
fn motion(bits: &Bits, speed_at: usize, course_at: usize, fields: &mut Fields) -> Result<(), DecodeError> {
    let speed = bits.unsigned(speed_at, 10)?;
    if speed != 1023 {
        insert(fields, "speed", speed as f64 / 10.0);
    }

    let course = bits.unsigned(course_at, 12)?;
    if course < 3600 {
        insert(fields, "course", course as f64 / 10.0);
    }

    let heading = bits.unsigned(course_at + 12, 9)?;
    if heading < 360 {
        insert(fields, "heading", heading as i64);
    }

    let second = bits.unsigned(course_at + 21, 6)?;
    if second < 60 {
        insert(fields, "second", second as i64);
    }
    Ok(())
}

fn position_report_class_a(bits: &Bits, fields: &mut Fields) -> Result<(), DecodeError> {
    insert(fields, "status", bits.unsigned(38, 4)? as i64);

    let turn = bits.signed(42, 8)?;
    if turn != -128 {
        insert(fields, "turn", turn);
    }

    insert(fields, "accuracy", bits.flag(60)?);
    coordinates(bits, 61, 89, fields)?;
    motion(bits, 50, 116, fields)
}

fn base_station_report(bits: &Bits, fields: &mut Fields) -> Result<(), DecodeError> {
    let stamp = [
        ("year", bits.unsigned(38, 14)?, 0),
        ("month", bits.unsigned(52, 4)?, 0),
        ("day", bits.unsigned(56, 5)?, 0),
        ("hour", bits.unsigned(61, 5)?, 24),
        ("minute", bits.unsigned(66, 6)?, 60),
        ("second", bits.unsigned(72, 6)?, 60),
    ];
    for (name, value, not_available) in stamp {
        if value != not_available {
            insert(fields, name, value as i64);
        }
    }

    insert(fields, "accuracy", bits.flag(78)?);
    coordinates(bits, 79, 107, fields)
}

fn position_report_class_b(bits: &Bits, fields: &mut Fields) -> Result<(), DecodeError> {
    insert(fields, "accuracy", bits.flag(56)?);
    coordinates(bits, 57, 85, fields)?;
    motion(bits, 46, 112, fields)
}

fn static_data_report(bits: &Bits, fields: &mut Fields) -> Result<(), DecodeError> {
    let part = bits.unsigned(38, 2)?;
    insert(fields, "part_number", part as i64);

    match part {
        0 => {
            let name = bits.text(40, 120)?;
            if !name.is_empty() {
                insert(fields, "shipname", name);
            }
        }
        1 => {
            let shiptype = bits.unsigned(40, 8)?;
            if shiptype != 0 {
                insert(fields, "shiptype", shiptype as i64);
            }
            for (name, start, width) in [("vendor_id", 48, 18), ("callsign", 90, 42)] {
                let text = bits.text(start, width)?;
                if !text.is_empty() {
                    insert(fields, name, text);
                }
            }
            let dimensions = [
                ("to_bow", bits.unsigned(132, 9)?),
                ("to_stern", bits.unsigned(141, 9)?),
                ("to_port", bits.unsigned(150, 6)?),
                ("to_starboard", bits.unsigned(156, 6)?),
            ];
            for (name, value) in dimensions {
                if value != 0 {
                    insert(fields, name, value as i64);
                }
            }
        }
        _ => {
            return Err(DecodeError::MalformedSentence(format!(
                "invalid type 24 part number {}",
                part
            )))
        }
    }
    Ok(())
}
