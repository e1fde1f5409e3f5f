//! # MQTT Source Module
//!
//! Maintains the broker subscription that feeds the bridge. Every publish on
//! the configured topic becomes exactly one [`VesselReport`](crate::ais::VesselReport),
//! in the order the broker delivered it.
//!
//! ```text
//! mqtt/
//! ├── error.rs    - SourceError (connection, subscription, timeout)
//! ├── message.rs  - InboundMessage, the raw publish plus receive time
//! └── source.rs   - MessageSource state machine (Idle / Subscribed)
//! ```
//!
//! The source never reconnects on its own. When a session fails the bridge
//! loop drops it, backs off and calls `connect` on a fresh idle source with
//! the same settings. Traffic published while disconnected is lost.

pub mod error;
pub mod message;
pub mod source;

pub use error::SourceError;
pub use message::InboundMessage;
pub use source::{ConnectionState, Idle, MessageSource, SourceStatus, Subscribed};
