//! # State Forwarder Module
//!
//! Converts [`VesselReport`](crate::ais::VesselReport)s into sensor updates and
//! posts them to the home-automation state endpoint.
//!
//! ```text
//! VesselReport ──► map() ──► [traffic enrichment] ──► [change detection] ──► POST
//!                                                                            │
//!                                     2xx ◄──────────────────────────────────┤
//!                       401/403, other 4xx ── logged, dropped ◄──────────────┤
//!                 5xx, timeout ── retried with backoff, then dropped ◄───────┘
//! ```
//!
//! Error policy:
//! - `ForwardError::Auth`: never retried, logged at error level
//! - `ForwardError::Client`: never retried, logged and dropped
//! - `ForwardError::Transient`: retried up to `max_attempts` requests in total
//!
//! A dropped update is never buffered or replayed. The next report refreshes
//! the sensor anyway.

pub mod error;
pub mod state_forwarder;
pub mod traffic;
pub mod update;

pub use error::ForwardError;
pub use state_forwarder::{ForwardOutcome, StateForwarder};
pub use traffic::{TrafficSummary, VesselTracker};
pub use update::{map, SensorUpdate, MAX_STATE_CHARS, UNDECODED_STATE};
