//! # AIS Payload Module
//!
//! Turns whatever the upstream receiver publishes on MQTT into a [`VesselReport`].
//!
//! ```text
//! ais/
//! ├── report.rs   - VesselReport and the open field map
//! ├── decoder.rs  - JSON / sentence dispatch and per-type field extraction
//! └── nmea.rs     - sentence framing, checksum, 6-bit de-armoring
//! ```
//!
//! Decoding never fails the pipeline. A payload that cannot be decoded still
//! becomes a report, flagged with `decoded() == false` and carrying the
//! [`DecodeError`] that explains why.

pub mod decoder;
pub mod nmea;
pub mod report;

pub use decoder::{decode, DecodeError, DecodedMessage};
pub use report::{FieldValue, Fields, VesselReport};
