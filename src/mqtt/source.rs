//! MQTT message source with statum state machine for the session lifecycle
//!
//! ```text
//! Idle ──connect()──► Subscribed ──close()──► Idle
//!                        │
//!                  next_report() (repeat)
//! ```
//!
//! `connect` only returns once the broker has acknowledged the subscription,
//! so a `MessageSource<Subscribed>` is always receiving on the topic.
//! Publishes that overtake the SUBACK are queued and handed out first.

use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};
use statum::{machine, state};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::SourceError;
use super::message::InboundMessage;
use crate::ais::VesselReport;
use crate::config::MqttSettings;

/// Capacity of the client request queue. Only SUBSCRIBE and DISCONNECT are
/// ever queued.
const REQUEST_CAPACITY: usize = 10;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Per-session counters, logged when the session ends
#[derive(Clone, Debug, Default)]
pub struct SourceStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub decode_failures: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl SourceStatus {
    fn record(&mut self, report: &VesselReport) {
        self.messages_received += 1;
        if !report.decoded() {
            self.decode_failures += 1;
        }
        self.last_activity = Some(Local::now());
    }
}

#[state]
#[derive(Debug, Clone)]
pub enum SourceState {
    Idle,
    Subscribed,
}

#[machine]
pub struct MessageSource<S: SourceState> {
    settings: MqttSettings,
    client: Option<AsyncClient>,
    eventloop: Option<EventLoop>,
    pending: VecDeque<InboundMessage>,
    status: SourceStatus,
}

impl<S: SourceState> MessageSource<S> {
    pub fn settings(&self) -> &MqttSettings {
        &self.settings
    }

    pub fn status(&self) -> &SourceStatus {
        &self.status
    }
}

impl MessageSource<Idle> {
    pub fn create(settings: &MqttSettings) -> Self {
        Self::new(
            settings.clone(),
            None,
            None,
            VecDeque::new(),
            SourceStatus::default(),
        )
    }

    fn options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(&self.settings.client_id, &self.settings.host, self.settings.port);
        options
            .set_keep_alive(self.settings.keep_alive)
            .set_clean_session(true);
        if let Some(credentials) = &self.settings.credentials {
            options.set_credentials(&credentials.username, &credentials.password);
        }
        options
    }

    /// Opens a session and subscribes to the configured topic
    ///
    /// Drives the event loop until the SUBACK arrives, bounded by the
    /// configured connect timeout. Re-subscribing after a reconnect is the same
    /// call with the same topic.
    pub async fn connect(mut self) -> Result<MessageSource<Subscribed>, SourceError> {
        info!("Connecting to MQTT broker {}", self.settings);
        self.status.connection_state = ConnectionState::Connecting;

        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        client
            .subscribe(&self.settings.topic, QoS::AtLeastOnce)
            .await?;

        let wait = self.settings.connect_timeout;
        match timeout(
            wait,
            await_subscription(&mut eventloop, &self.settings.topic, &mut self.pending),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SourceError::Timeout(wait)),
        }

        info!("Subscribed to MQTT topic: {}", self.settings.topic);
        self.client = Some(client);
        self.eventloop = Some(eventloop);
        self.status.connection_state = ConnectionState::Connected;
        self.status.last_activity = Some(Local::now());
        Ok(self.transition())
    }
}

async fn await_subscription(
    eventloop: &mut EventLoop,
    topic: &str,
    pending: &mut VecDeque<InboundMessage>,
) -> Result<(), SourceError> {
    loop {
        match eventloop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                debug!(
                    "Broker accepted connection (session present: {})",
                    ack.session_present
                );
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    return Err(SourceError::SubscriptionRejected(topic.to_string()));
                }
                return Ok(());
            }
            Event::Incoming(Packet::Publish(publish)) => {
                pending.push_back(InboundMessage::new(publish.topic, publish.payload.to_vec()));
            }
            _ => {}
        }
    }
}

impl MessageSource<Subscribed> {
    /// Waits for the next publish on the subscription.
    pub async fn next_message(&mut self) -> Result<InboundMessage, SourceError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }

        let eventloop = self.eventloop.as_mut().ok_or(SourceError::NotConnected)?;
        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::Publish(publish)) => {
                    return Ok(InboundMessage::new(publish.topic, publish.payload.to_vec()));
                }
                Event::Incoming(Packet::Disconnect) => return Err(SourceError::Closed),
                Event::Incoming(Packet::PingResp) => {
                    // Keep-alive answered, connection healthy
                }
                _ => {}
            }
        }
    }

    /// Waits for the next publish and decodes it
    ///
    /// Undecodable payloads still produce a report; they are only counted and
    /// logged here.
    pub async fn next_report(&mut self) -> Result<VesselReport, SourceError> {
        let message = self.next_message().await?;
        let report = VesselReport::from_message(&message);
        self.status.record(&report);

        match report.decode_error() {
            None => debug!(
                mmsi = report.mmsi(),
                message_type = report.message_type(),
                "Received {}",
                message
            ),
            Some(e) => warn!(topic = %message.topic, "Undecodable payload ({}): {}", e, message.preview()),
        }
        Ok(report)
    }

    /// Sends DISCONNECT and returns to the idle state.
    pub async fn close(mut self) -> MessageSource<Idle> {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.try_disconnect() {
                debug!("Disconnect not queued: {}", e);
            }
        }
        if let Some(mut eventloop) = self.eventloop.take() {
            // One poll flushes the DISCONNECT if the socket is still alive
            let _ = timeout(Duration::from_millis(500), eventloop.poll()).await;
        }

        info!(
            "MQTT session closed: {} messages, {} undecodable, last activity {}",
            self.status.messages_received,
            self.status.decode_failures,
            self.status
                .last_activity
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
        self.status.connection_state = ConnectionState::Disconnected;
        self.transition()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqttCredentials;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    const GRANTED_QOS1: u8 = 0x01;
    const SUBSCRIBE_FAILURE: u8 = 0x80;
    const EARLY_SENTENCE: &str = "!AIVDM,1,1,,A,15RTgt0PAso;90TKcjM8h6g208CQ,0*4A";
    const LATE_SENTENCE: &str = "!AIVDM,1,1,,B,15M:Ih0P1so?Vt@EWFs3Jjht0000,0*4F";

    fn frame(header: u8, body: &[u8]) -> Vec<u8> {
        let mut packet = vec![header];
        let mut remaining = body.len();
        loop {
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            packet.push(byte);
            if remaining == 0 {
                break;
            }
        }
        packet.extend_from_slice(body);
        packet
    }

    fn publish(topic: &str, payload: &str) -> Vec<u8> {
        let mut body = (topic.len() as u16).to_be_bytes().to_vec();
        body.extend_from_slice(topic.as_bytes());
        body.extend_from_slice(payload.as_bytes());
        frame(0x30, &body)
    }

    async fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let header = stream.read_u8().await.unwrap();
        let mut length = 0usize;
        let mut shift = 0;
        loop {
            let byte = stream.read_u8().await.unwrap();
            length |= ((byte & 0x7f) as usize) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await.unwrap();
        (header, body)
    }

    /// Single-connection MQTT 3.1.1 broker: CONNACK, then a publish that
    /// overtakes the SUBACK, the SUBACK itself, one more publish, then close.
    async fn scripted_broker(suback_code: u8) -> (u16, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let (header, _) = read_packet(&mut stream).await;
            assert_eq!(header >> 4, 1, "expected CONNECT");
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

            let (header, body) = read_packet(&mut stream).await;
            assert_eq!(header, 0x82, "expected SUBSCRIBE");
            stream
                .write_all(&publish("ais/data", EARLY_SENTENCE))
                .await
                .unwrap();
            stream
                .write_all(&frame(0x90, &[body[0], body[1], suback_code]))
                .await
                .unwrap();
            // a rejected client may already be gone
            let _ = stream.write_all(&publish("ais/data", LATE_SENTENCE)).await;

            tokio::time::sleep(Duration::from_millis(300)).await;
        });
        (port, handle)
    }

    fn local_settings(port: u16) -> MqttSettings {
        MqttSettings {
            port,
            credentials: None,
            ..settings()
        }
    }

    fn settings() -> MqttSettings {
        MqttSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            topic: "ais/data".to_string(),
            client_id: "ais-bridge-test".to_string(),
            credentials: Some(MqttCredentials {
                username: "ais".to_string(),
                password: "pw".to_string(),
            }),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn options_follow_settings() {
        let source = MessageSource::create(&settings());
        let options = source.options();
        assert_eq!(options.client_id(), "ais-bridge-test");
        assert_eq!(options.broker_address(), ("127.0.0.1".to_string(), 1));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert_eq!(
            options.credentials(),
            Some(("ais".to_string(), "pw".to_string()))
        );
        assert_eq!(source.status().connection_state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_to_connect() {
        let result = MessageSource::create(&settings()).connect().await;
        assert!(matches!(
            result,
            Err(SourceError::Connection(_)) | Err(SourceError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn receives_buffered_and_live_publishes_until_broker_closes() {
        let (port, broker) = scripted_broker(GRANTED_QOS1).await;
        let mut source = MessageSource::create(&local_settings(port))
            .connect()
            .await
            .unwrap();
        assert_eq!(source.status().connection_state, ConnectionState::Connected);

        let early = source.next_report().await.unwrap();
        assert!(early.decoded());
        assert_eq!(early.mmsi(), Some(371798000));
        assert_eq!(early.topic(), "ais/data");

        let late = source.next_report().await.unwrap();
        assert_eq!(late.mmsi(), Some(366123456));
        assert_eq!(source.status().messages_received, 2);
        assert_eq!(source.status().decode_failures, 0);

        let closed = source.next_report().await;
        assert!(matches!(
            closed,
            Err(SourceError::Connection(_)) | Err(SourceError::Closed)
        ));

        let idle = source.close().await;
        assert_eq!(idle.status().connection_state, ConnectionState::Disconnected);
        broker.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_subscription_fails_to_connect() {
        let (port, broker) = scripted_broker(SUBSCRIBE_FAILURE).await;
        let result = MessageSource::create(&local_settings(port)).connect().await;
        match result {
            Err(SourceError::SubscriptionRejected(topic)) => assert_eq!(topic, "ais/data"),
            Err(other) => panic!("expected rejected subscription, got {}", other),
            Ok(_) => panic!("subscription should have been rejected"),
        }
        broker.await.unwrap();
    }
}
