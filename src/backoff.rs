//! Exponential backoff shared by reconnects and send retries

use std::time::Duration;

use crate::config::BackoffSettings;

/// Doubling delay, capped at a ceiling
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(settings: BackoffSettings) -> Self {
        Self {
            initial: settings.initial,
            max: settings.max,
            current: settings.initial,
        }
    }

    /// Returns the delay to wait now and doubles the following one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
