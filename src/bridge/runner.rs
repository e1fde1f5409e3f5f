use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::connector::{Connector, MqttConnector, Subscription};
use crate::backoff::Backoff;
use crate::config::{BridgeConfig, ReconnectSettings};
use crate::forwarder::{ForwardOutcome, StateForwarder};
use crate::mqtt::SourceError;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("giving up after {attempts} failed connection attempts: {source}")]
    ConnectAttemptsExhausted {
        attempts: u32,
        #[source]
        source: SourceError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Totals over the lifetime of one `run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub reports: usize,
    pub delivered: usize,
    pub unchanged: usize,
    pub ignored: usize,
    pub dropped: usize,
    pub sessions: usize,
}

impl BridgeStats {
    fn record(&mut self, outcome: &ForwardOutcome) {
        self.reports += 1;
        match outcome {
            ForwardOutcome::Delivered { .. } => self.delivered += 1,
            ForwardOutcome::Unchanged => self.unchanged += 1,
            ForwardOutcome::Ignored => self.ignored += 1,
            ForwardOutcome::Dropped { .. } => self.dropped += 1,
        }
    }
}

/// The long-lived receive → decode → forward loop
///
/// Reports are handled strictly one at a time in delivery order. The next
/// report is only pulled once the previous forward has finished.
pub struct Bridge<C: Connector> {
    connector: C,
    forwarder: StateForwarder,
    reconnect: ReconnectSettings,
    stats: BridgeStats,
}

impl Bridge<MqttConnector> {
    pub fn from_config(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let forwarder = StateForwarder::new(&config.home_assistant, &config.forwarding)?;
        Ok(Self::new(
            MqttConnector::new(config.mqtt.clone()),
            forwarder,
            config.reconnect,
        ))
    }
}

impl<C: Connector> Bridge<C> {
    pub fn new(connector: C, forwarder: StateForwarder, reconnect: ReconnectSettings) -> Self {
        Self {
            connector,
            forwarder,
            reconnect,
            stats: BridgeStats::default(),
        }
    }

    /// Runs until `shutdown` is cancelled
    ///
    /// Connection failures are retried with exponential backoff. Only an
    /// exhausted `max_connect_attempts` ends the loop with an error.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<BridgeStats, BridgeError> {
        let mut backoff = Backoff::new(self.reconnect.backoff());
        let mut failed_connects: u32 = 0;

        info!("Bridge started, forwarding to {}", self.forwarder.endpoint());
        loop {
            let connected = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let mut session = match connected {
                Ok(session) => {
                    failed_connects = 0;
                    backoff.reset();
                    self.stats.sessions += 1;
                    session
                }
                Err(e) => {
                    failed_connects += 1;
                    if let Some(limit) = self.reconnect.max_connect_attempts {
                        if failed_connects >= limit {
                            error!(attempts = failed_connects, "Unable to connect: {}", e);
                            return Err(BridgeError::ConnectAttemptsExhausted {
                                attempts: failed_connects,
                                source: e,
                            });
                        }
                    }
                    let delay = backoff.next_delay();
                    warn!(
                        attempt = failed_connects,
                        "Connection failed: {}, retrying in {:?}", e, delay
                    );
                    if sleep_or_cancel(delay, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            let result = self.pump(&mut session, &shutdown).await;
            session.close().await;
            match result {
                Ok(()) => break,
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("MQTT session lost: {}, reconnecting in {:?}", e, delay);
                    if sleep_or_cancel(delay, &shutdown).await {
                        break;
                    }
                }
            }
        }

        info!(
            reports = self.stats.reports,
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            "Bridge stopped"
        );
        Ok(self.stats)
    }

    /// Forwards reports from one session until it fails or shutdown is requested.
    async fn pump(
        &mut self,
        session: &mut C::Session,
        shutdown: &CancellationToken,
    ) -> Result<(), SourceError> {
        loop {
            let report = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                result = session.receive() => result?,
            };
            let outcome = self.forwarder.forward_until(&report, shutdown).await;
            self.stats.record(&outcome);
        }
    }
}

/// Returns `true` when cancelled before the delay elapsed.
async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
