//! Seams between the bridge loop and the MQTT session
//!
//! The loop only needs "open a subscribed session" and "pull the next report".
//! [`MqttConnector`] provides both on top of [`MessageSource`]; tests provide
//! scripted sessions instead of a broker.

use std::future::Future;

use crate::ais::VesselReport;
use crate::config::MqttSettings;
use crate::mqtt::{MessageSource, SourceError, Subscribed};

/// A live, subscribed session
pub trait Subscription: Send + Sized {
    /// Waits for the next report. An error ends the session.
    fn receive(&mut self) -> impl Future<Output = Result<VesselReport, SourceError>> + Send;

    /// Releases the session.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens sessions, once at startup and again after every failure
pub trait Connector: Send + Sync {
    type Session: Subscription;

    fn connect(&self) -> impl Future<Output = Result<Self::Session, SourceError>> + Send;
}

#[derive(Debug, Clone)]
pub struct MqttConnector {
    settings: MqttSettings,
}

impl MqttConnector {
    pub fn new(settings: MqttSettings) -> Self {
        Self { settings }
    }
}

impl Connector for MqttConnector {
    type Session = MessageSource<Subscribed>;

    async fn connect(&self) -> Result<Self::Session, SourceError> {
        MessageSource::create(&self.settings).connect().await
    }
}

impl Subscription for MessageSource<Subscribed> {
    async fn receive(&mut self) -> Result<VesselReport, SourceError> {
        self.next_report().await
    }

    async fn close(self) {
        MessageSource::<Subscribed>::close(self).await;
    }
}
