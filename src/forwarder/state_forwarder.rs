use reqwest::{Client, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::ForwardError;
use super::traffic::VesselTracker;
use super::update::{map, truncate_chars, SensorUpdate};
use crate::ais::VesselReport;
use crate::backoff::Backoff;
use crate::config::{ForwardingSettings, HomeAssistantSettings};

const ERROR_BODY_CHARS: usize = 200;

enum Delivery {
    Sent { attempts: u32 },
    Failed { error: ForwardError, attempts: u32 },
    Interrupted { error: ForwardError, attempts: u32 },
}

/// What happened to one report
#[derive(Debug)]
pub enum ForwardOutcome {
    /// Acknowledged with 2xx after `attempts` requests
    Delivered { attempts: u32 },
    /// Identical to the last delivered update, not sent
    Unchanged,
    /// Message type is on the ignore list
    Ignored,
    /// Given up; the next report refreshes the sensor
    Dropped { error: ForwardError, attempts: u32 },
}

impl ForwardOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ForwardOutcome::Delivered { .. })
    }
}

/// Pushes sensor updates to the home-automation state endpoint
///
/// Owns the HTTP client and the only cross-report state of the pipeline: the
/// last delivered update (for change detection) and the optional traffic
/// tracker.
pub struct StateForwarder {
    client: Client,
    endpoint: Url,
    token: String,
    settings: ForwardingSettings,
    tracker: Option<VesselTracker>,
    last_delivered: Option<SensorUpdate>,
}

impl StateForwarder {
    pub fn new(
        home_assistant: &HomeAssistantSettings,
        settings: &ForwardingSettings,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .user_agent(concat!("ais-bridge/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let tracker = settings
            .track_traffic
            .then(|| VesselTracker::new(settings.traffic_window()));

        Ok(Self {
            client,
            endpoint: home_assistant.uri.clone(),
            token: home_assistant.token.clone(),
            settings: settings.clone(),
            tracker,
            last_delivered: None,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Issues one authenticated request. Succeeds only on 2xx.
    pub async fn send(&self, update: &SensorUpdate) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .json(update)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = %status, state = %update.state, "Endpoint accepted update");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForwardError::from_status(
            status,
            truncate_chars(body.trim(), ERROR_BODY_CHARS),
        ))
    }

    /// Sends with retries on transient failures, at most `max_attempts` requests.
    ///
    /// Cancelling `shutdown` ends the retry backoff early; a request already in
    /// flight still completes within the request timeout.
    async fn deliver(&self, update: &SensorUpdate, shutdown: &CancellationToken) -> Delivery {
        let mut backoff = Backoff::new(self.settings.backoff());
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.send(update).await {
                Ok(()) => return Delivery::Sent { attempts },
                Err(error) if error.is_retriable() && attempts < self.settings.max_attempts => {
                    let delay = backoff.next_delay();
                    warn!(
                        attempt = attempts,
                        max_attempts = self.settings.max_attempts,
                        "{}, retrying in {:?}",
                        error,
                        delay
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            return Delivery::Interrupted { error, attempts };
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(error) => return Delivery::Failed { error, attempts },
            }
        }
    }

    /// Maps a report and delivers it according to the forwarding policy.
    ///
    /// Never fails: every problem ends in a logged [`ForwardOutcome::Dropped`].
    pub async fn forward(&mut self, report: &VesselReport) -> ForwardOutcome {
        self.forward_until(report, &CancellationToken::new()).await
    }

    /// Like [`forward`](Self::forward), but gives up retrying once `shutdown`
    /// is cancelled. The update is dropped with the last transient error.
    pub async fn forward_until(
        &mut self,
        report: &VesselReport,
        shutdown: &CancellationToken,
    ) -> ForwardOutcome {
        if let Some(message_type) = report.message_type() {
            if self.settings.ignore_types.contains(&message_type) {
                info!(
                    mmsi = report.mmsi(),
                    "Ignoring type {} message", message_type
                );
                return ForwardOutcome::Ignored;
            }
        }

        let mut update = map(report);
        if let Some(tracker) = self.tracker.as_mut() {
            if let Some(summary) = tracker.observe(report) {
                update = update.with_traffic(&summary);
            }
        }

        if self.settings.skip_unchanged && self.last_delivered.as_ref() == Some(&update) {
            debug!(state = %update.state, "Update unchanged, not sending");
            return ForwardOutcome::Unchanged;
        }

        match self.deliver(&update, shutdown).await {
            Delivery::Sent { attempts } => {
                info!(
                    state = %update.state,
                    attempts,
                    "Posted update to {}",
                    self.endpoint
                );
                self.last_delivered = Some(update);
                ForwardOutcome::Delivered { attempts }
            }
            Delivery::Interrupted { error, attempts } => {
                warn!(
                    attempts,
                    state = %update.state,
                    "Shutdown requested during retry, update dropped: {}",
                    error
                );
                ForwardOutcome::Dropped { error, attempts }
            }
            Delivery::Failed { error, attempts } => {
                match &error {
                    ForwardError::Auth { status } => error!(
                        status = %status,
                        "Endpoint rejected the access token, check HA_TOKEN; update dropped"
                    ),
                    ForwardError::Client { status, .. } => error!(
                        status = %status,
                        state = %update.state,
                        "Failed forward, update dropped: {}",
                        error
                    ),
                    ForwardError::Transient { .. } => error!(
                        attempts,
                        state = %update.state,
                        "Failed forward after {} attempts, update dropped: {}",
                        attempts,
                        error
                    ),
                }
                ForwardOutcome::Dropped { error, attempts }
            }
        }
    }
}
