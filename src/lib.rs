//! Bridges AIS traffic from an MQTT topic to a Home Assistant sensor.
//!
//! ```text
//! MQTT topic ──► mqtt::MessageSource ──► ais::VesselReport
//!                                              │
//!                    forwarder::StateForwarder ◄┘──► POST /api/states/<entity>
//! ```
//!
//! `bridge::Bridge` runs the loop; `config::BridgeConfig` holds everything it
//! needs, loaded once at startup.

pub mod ais;
pub mod backoff;
pub mod bridge;
pub mod config;
pub mod forwarder;
pub mod mqtt;
