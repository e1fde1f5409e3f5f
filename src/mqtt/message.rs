use chrono::{DateTime, Utc};
use std::fmt;

const PREVIEW_CHARS: usize = 48;

/// Publish received from the broker, before decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    /// Lossy, shortened rendering of the payload for log lines.
    pub fn preview(&self) -> String {
        let text = String::from_utf8_lossy(&self.payload);
        let mut preview: String = text.trim().chars().take(PREVIEW_CHARS).collect();
        if text.trim().chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        preview
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} ({} bytes) {}",
            self.received_at.format("%H:%M:%S%.3f"),
            self.topic,
            self.payload.len(),
            self.preview()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_shortened() {
        let msg = InboundMessage::new("ais/data", "x".repeat(100));
        assert_eq!(msg.preview().chars().count(), PREVIEW_CHARS + 1);

        let short = InboundMessage::new("ais/data", "  !AIVDM  ");
        assert_eq!(short.preview(), "!AIVDM");
    }
}
