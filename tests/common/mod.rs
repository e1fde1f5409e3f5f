#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ais_bridge::ais::VesselReport;
use ais_bridge::bridge::{Connector, Subscription};
use ais_bridge::config::{ForwardingSettings, HomeAssistantSettings};
use ais_bridge::mqtt::SourceError;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use reqwest::Url;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const TOKEN: &str = "test-token";
pub const ENTITY_PATH: &str = "/api/states/sensor.ais";

pub const CLASS_A_SENTENCE: &str = "!AIVDM,1,1,,B,15M:Ih0P1so?Vt@EWFs3Jjht0000,0*4F";
pub const GPSD_SENTENCE: &str = "!AIVDM,1,1,,A,15RTgt0PAso;90TKcjM8h6g208CQ,0*4A";
pub const CLASS_B_SENTENCE: &str = "!AIVDM,1,1,,B,B5Mwr>h0<P59Uh7LwF1hSwWWP000,0*76";
pub const BASE_STATION_SENTENCE: &str = "!AIVDM,1,1,,B,403OviQvQWdNeoRfB`CCLw700000,0*69";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

impl RecordedRequest {
    pub fn state(&self) -> &str {
        self.body["state"].as_str().unwrap_or_default()
    }
}

#[derive(Clone)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    script: Arc<Mutex<VecDeque<u16>>>,
    fallback: u16,
    delay: Duration,
}

/// Minimal stand-in for the Home Assistant state API
///
/// Answers with the scripted status codes in order, then with `fallback`.
pub struct FakeHomeAssistant {
    addr: SocketAddr,
    state: ServerState,
    handle: JoinHandle<()>,
}

impl FakeHomeAssistant {
    pub async fn start(script: &[u16], fallback: u16) -> Self {
        Self::start_with_delay(script, fallback, Duration::ZERO).await
    }

    pub async fn start_with_delay(script: &[u16], fallback: u16, delay: Duration) -> Self {
        let state = ServerState {
            requests: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(script.iter().copied().collect())),
            fallback,
            delay,
        };
        let app = Router::new()
            .route(ENTITY_PATH, post(record))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn uri(&self) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, ENTITY_PATH)).unwrap()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn settings(&self) -> HomeAssistantSettings {
        HomeAssistantSettings {
            uri: self.uri(),
            token: TOKEN.to_string(),
        }
    }
}

impl Drop for FakeHomeAssistant {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, &'static str) {
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let code = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(state.fallback);
    let status = StatusCode::from_u16(code).unwrap();
    let body = if status.is_success() { "{}" } else { "scripted failure" };
    (status, body)
}

/// Forwarding settings with millisecond backoffs
pub fn fast_forwarding() -> ForwardingSettings {
    ForwardingSettings {
        max_attempts: 3,
        initial_backoff_ms: 5,
        max_backoff_ms: 20,
        request_timeout_ms: 2_000,
        ..ForwardingSettings::default()
    }
}

pub fn report(payload: &str) -> VesselReport {
    VesselReport::decode("ais/data", payload.as_bytes(), Utc::now())
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Payload(String),
    Drop,
}

#[derive(Debug, Clone)]
pub enum ConnectStep {
    Fail,
    Session(Vec<SessionEvent>),
}

#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// In-memory connector replaying a fixed script
///
/// Connect attempts beyond the script fail. A session that runs out of events
/// cancels `shutdown` and then idles, ending the bridge run.
pub struct ScriptedConnector {
    steps: Mutex<VecDeque<ConnectStep>>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl ScriptedConnector {
    pub fn new(steps: Vec<ConnectStep>, shutdown: CancellationToken) -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let connector = Self {
            steps: Mutex::new(steps.into()),
            counters: counters.clone(),
            shutdown,
        };
        (connector, counters)
    }
}

pub struct ScriptedSession {
    events: VecDeque<SessionEvent>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    async fn connect(&self) -> Result<ScriptedSession, SourceError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(ConnectStep::Session(events)) => Ok(ScriptedSession {
                events: events.into(),
                counters: self.counters.clone(),
                shutdown: self.shutdown.clone(),
            }),
            Some(ConnectStep::Fail) | None => Err(SourceError::Timeout(Duration::from_millis(1))),
        }
    }
}

impl Subscription for ScriptedSession {
    async fn receive(&mut self) -> Result<VesselReport, SourceError> {
        match self.events.pop_front() {
            Some(SessionEvent::Payload(payload)) => Ok(report(&payload)),
            Some(SessionEvent::Drop) => Err(SourceError::Closed),
            None => {
                self.shutdown.cancel();
                std::future::pending().await
            }
        }
    }

    async fn close(self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}
