//! # Bridge Module
//!
//! Ties the MQTT source to the state forwarder.
//!
//! ```text
//!            ┌────────────── backoff ◄──────────────┐
//!            ▼                                      │ SourceError
//! connect() ──► receive() ──► forward() ──► receive() ...
//!                   │
//!              shutdown ──► close() ──► Ok(stats)
//! ```
//!
//! ## Components
//! - `connector.rs`: the `Connector` / `Subscription` seams and the rumqttc
//!   backed `MqttConnector`
//! - `runner.rs`: the `Bridge` loop, its statistics and `BridgeError`

pub mod connector;
pub mod runner;

pub use connector::{Connector, MqttConnector, Subscription};
pub use runner::{Bridge, BridgeError, BridgeStats};
