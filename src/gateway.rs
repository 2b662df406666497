//! Gateway (WebSocket) transport for the Discord API.
//!
//! This module owns the WebSocket connection lifecycle:
//!   - connect → receive HELLO → send IDENTIFY
//!   - background heartbeat task
//!   - sequence number + session_id tracking
//!   - reconnect + RESUME on disconnect once the session is established
//!
//! The rest of the codebase consumes [`GatewayEvent`] values through the
//! [`GatewaySession`] trait without ever touching `tokio_tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::events::GatewayEvent;
use crate::session::GatewaySession;
use crate::types::{GatewayIntents, GatewayPayload, ReadyEvent};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Reconnect attempts allowed after the session is established.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct GatewayConfig {
    url: String,
    token: String,
    intents: GatewayIntents,
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    /// Resume URL provided by Discord in the READY event.
    resume_gateway_url: Option<String>,
    sequence: Option<u64>,
}

type LoginResult = Result<ReadyEvent, GatewayError>;

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A gateway session backed by a spawned driver task.
///
/// The driver keeps running until the session ends fatally, reconnects are
/// exhausted, or this value is dropped.
pub struct Gateway {
    url: String,
    intents: GatewayIntents,
    events: Option<mpsc::Receiver<GatewayEvent>>,
    driver: Option<tokio::task::JoinHandle<()>>,
}

impl Gateway {
    pub fn new(intents: GatewayIntents) -> Self {
        Self::with_url(DEFAULT_GATEWAY_URL, intents)
    }

    /// Connect to `url` instead of Discord's public gateway.
    pub fn with_url(url: impl Into<String>, intents: GatewayIntents) -> Self {
        Self {
            url: url.into(),
            intents,
            events: None,
            driver: None,
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

#[async_trait]
impl GatewaySession for Gateway {
    async fn login(&mut self, token: &str) -> LoginResult {
        let (event_tx, event_rx) = mpsc::channel::<GatewayEvent>(256);
        let (ready_tx, ready_rx) = oneshot::channel::<LoginResult>();

        let config = GatewayConfig {
            url: self.url.clone(),
            token: token.to_string(),
            intents: self.intents,
        };
        if let Some(previous) = self.driver.replace(tokio::spawn(gateway_driver(
            config, event_tx, ready_tx,
        ))) {
            previous.abort();
        }
        self.events = Some(event_rx);

        ready_rx.await.unwrap_or(Err(GatewayError::Ended))
    }

    async fn next_event(&mut self) -> Option<GatewayEvent> {
        self.events.as_mut()?.recv().await
    }
}

// ---------------------------------------------------------------------------
// The main driver loop (runs in a spawned task)
// ---------------------------------------------------------------------------

async fn gateway_driver(
    config: GatewayConfig,
    event_tx: mpsc::Sender<GatewayEvent>,
    ready_tx: oneshot::Sender<LoginResult>,
) {
    let mut login = Some(ready_tx);
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut reconnect_attempts: u32 = 0;

    loop {
        let url = {
            let s = session.lock().await;
            gateway_url(&config.url, s.resume_gateway_url.as_deref())
        };

        info!(url = %url, "connecting to Discord gateway");

        let outcome = run_connection(&url, &config, &session, &event_tx, &mut login).await;

        let reason = match outcome {
            // Without a READY there is no session to resume.
            Ok(DisconnectReason::ShouldResume | DisconnectReason::ShouldReidentify)
                if login.is_some() =>
            {
                DisconnectReason::Transport(GatewayError::Ended)
            }
            Ok(reason) => {
                reconnect_attempts = 0;
                reason
            }
            Err(e) => DisconnectReason::Transport(e),
        };

        match reason {
            DisconnectReason::ShouldResume => {
                info!("will attempt RESUME");
            }
            DisconnectReason::ShouldReidentify => {
                info!("session invalidated, will re-IDENTIFY");
                let mut s = session.lock().await;
                s.session_id = None;
                s.sequence = None;
            }
            DisconnectReason::Transport(e) => {
                error!(error = %e, "gateway connection failed");
                // Before READY there is no session to recover.
                if let Some(tx) = login.take() {
                    let _ = tx.send(Err(e));
                    return;
                }
                let _ = event_tx.send(GatewayEvent::Error(e.to_string())).await;
            }
            DisconnectReason::Fatal(e) => {
                error!(error = %e, "fatal gateway error, shutting down");
                match login.take() {
                    Some(tx) => {
                        let _ = tx.send(Err(e));
                    }
                    None => {
                        let _ = event_tx.send(GatewayEvent::Error(e.to_string())).await;
                    }
                }
                return;
            }
            DisconnectReason::EventChannelClosed => {
                info!("event channel closed, shutting down gateway driver");
                return;
            }
        }

        reconnect_attempts += 1;
        if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            error!("exceeded max reconnect attempts, giving up");
            let err = GatewayError::ReconnectExhausted(MAX_RECONNECT_ATTEMPTS);
            let _ = event_tx.send(GatewayEvent::Error(err.to_string())).await;
            return;
        }
        let delay = backoff_delay(reconnect_attempts);
        warn!(
            delay_ms = delay.as_millis() as u64,
            attempt = reconnect_attempts,
            "reconnecting after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Append the API version and encoding unless the URL already carries them.
fn gateway_url(base: &str, resume_url: Option<&str>) -> String {
    let Some(url) = resume_url else {
        return base.to_string();
    };
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&v=10&encoding=json", url)
    } else {
        format!("{}?v=10&encoding=json", url)
    }
}

#[derive(Debug)]
enum DisconnectReason {
    ShouldResume,
    ShouldReidentify,
    Transport(GatewayError),
    Fatal(GatewayError),
    EventChannelClosed,
}

/// One WebSocket connection, from handshake to disconnect.
async fn run_connection(
    url: &str,
    config: &GatewayConfig,
    session: &Arc<Mutex<SessionState>>,
    event_tx: &mpsc::Sender<GatewayEvent>,
    login: &mut Option<oneshot::Sender<LoginResult>>,
) -> Result<DisconnectReason, GatewayError> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| GatewayError::Connect(e.to_string()))?;

    info!("WebSocket connected");

    let (ws_write, mut ws_read) = ws_stream.split();
    let ws_write = Arc::new(Mutex::new(ws_write));

    // 1. HELLO
    let heartbeat_interval = read_hello(&mut ws_read).await?;
    info!(interval_ms = heartbeat_interval, "received HELLO");

    // 2. IDENTIFY or RESUME
    let resume = {
        let s = session.lock().await;
        s.session_id.clone().zip(s.sequence)
    };
    let resuming = resume.is_some();
    let handshake = match resume {
        Some((session_id, seq)) => json!({
            "op": 6,
            "d": { "token": config.token, "session_id": session_id, "seq": seq }
        }),
        None => json!({
            "op": 2,
            "d": {
                "token": config.token,
                "properties": { "os": std::env::consts::OS, "browser": "slash-bot", "device": "slash-bot" },
                "intents": config.intents.bits(),
            }
        }),
    };
    send_json(&ws_write, &handshake).await?;
    info!(resume = resuming, "sent handshake");

    // 3. Heartbeat, aborted when this connection is dropped
    let mut heartbeat = JoinSet::new();
    heartbeat.spawn(heartbeat_loop(
        Arc::clone(&ws_write),
        Arc::clone(session),
        heartbeat_interval,
    ));

    // 4. Read until disconnect
    let reason = read_loop(&mut ws_read, &ws_write, event_tx, session, login).await;

    heartbeat.abort_all();
    {
        let mut w = ws_write.lock().await;
        let _ = w.send(WsMessage::Close(None)).await;
    }

    Ok(reason)
}

async fn heartbeat_loop(
    ws_write: Arc<Mutex<WsSink>>,
    session: Arc<Mutex<SessionState>>,
    interval_ms: u64,
) {
    // First heartbeat goes out after `interval * jitter`, jitter ∈ [0, 1).
    let jitter = rand::random::<f64>();
    tokio::time::sleep(Duration::from_millis((interval_ms as f64 * jitter) as u64)).await;

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        interval.tick().await;
        let seq = session.lock().await.sequence;
        if let Err(e) = send_json(&ws_write, &json!({ "op": 1, "d": seq })).await {
            warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
            return;
        }
        debug!(seq = ?seq, "sent heartbeat");
    }
}

async fn read_loop(
    ws_read: &mut WsStream,
    ws_write: &Arc<Mutex<WsSink>>,
    event_tx: &mpsc::Sender<GatewayEvent>,
    session: &Arc<Mutex<SessionState>>,
    login: &mut Option<oneshot::Sender<LoginResult>>,
) -> DisconnectReason {
    while let Some(msg) = ws_read.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(frame)) => {
                let code = frame.as_ref().map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return code.map_or(DisconnectReason::ShouldResume, close_code_reason);
            }
            // Ping/Pong/Binary: ignore.
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "WebSocket read error");
                if login.is_some() {
                    return DisconnectReason::Transport(GatewayError::Connect(e.to_string()));
                }
                let _ = event_tx.send(GatewayEvent::Error(e.to_string())).await;
                return DisconnectReason::ShouldResume;
            }
        };

        let payload: GatewayPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse gateway payload");
                continue;
            }
        };

        if let Some(s) = payload.s {
            session.lock().await.sequence = Some(s);
        }

        let event = GatewayEvent::from_payload(payload);

        match &event {
            GatewayEvent::Ready(ready) => {
                {
                    let mut sess = session.lock().await;
                    sess.session_id = Some(ready.session_id.clone());
                    sess.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                }
                info!(session_id = %ready.session_id, user = %ready.user.username, "gateway READY");

                // The first READY completes login instead of being forwarded.
                if let Some(tx) = login.take() {
                    let _ = tx.send(Ok(ready.clone()));
                    continue;
                }
            }
            GatewayEvent::HeartbeatRequest => {
                let seq = session.lock().await.sequence;
                if let Err(e) = send_json(ws_write, &json!({ "op": 1, "d": seq })).await {
                    warn!(error = %e, "failed to send requested heartbeat");
                }
                continue;
            }
            GatewayEvent::HeartbeatAck => {
                debug!("heartbeat acknowledged");
                continue;
            }
            GatewayEvent::Reconnect => {
                info!("gateway requested reconnect (op 7)");
                return DisconnectReason::ShouldResume;
            }
            GatewayEvent::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated (op 9)");
                if *resumable {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    return DisconnectReason::ShouldResume;
                }
                tokio::time::sleep(Duration::from_secs(3)).await;
                return DisconnectReason::ShouldReidentify;
            }
            _ => {}
        }

        if event_tx.send(event).await.is_err() {
            return DisconnectReason::EventChannelClosed;
        }
    }

    info!("WebSocket stream ended");
    DisconnectReason::ShouldResume
}

/// Map a server close code to what the driver should do next.
fn close_code_reason(code: u16) -> DisconnectReason {
    let fatal = |reason| DisconnectReason::Fatal(GatewayError::Fatal { code, reason });
    match code {
        4004 => DisconnectReason::Fatal(GatewayError::AuthenticationFailed),
        4010 => fatal("invalid shard"),
        4011 => fatal("sharding required"),
        4012 => fatal("invalid API version"),
        4013 => fatal("invalid intents"),
        4014 => fatal("disallowed intents"),
        // Invalid seq or session timed out.
        4007 | 4009 => DisconnectReason::ShouldReidentify,
        _ => DisconnectReason::ShouldResume,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn read_hello(stream: &mut WsStream) -> Result<u64, GatewayError> {
    let msg = tokio::time::timeout(HELLO_TIMEOUT, stream.next())
        .await
        .map_err(|_| GatewayError::Handshake("timed out waiting for HELLO".into()))?
        .ok_or_else(|| GatewayError::Handshake("stream ended before HELLO".into()))?
        .map_err(|e| GatewayError::Handshake(format!("WS error reading HELLO: {}", e)))?;

    match msg {
        WsMessage::Text(text) => parse_hello(&text),
        other => Err(GatewayError::Handshake(format!(
            "expected text message for HELLO, got {:?}",
            other
        ))),
    }
}

/// Extract `heartbeat_interval` from an op-10 HELLO payload.
fn parse_hello(text: &str) -> Result<u64, GatewayError> {
    let payload: GatewayPayload = serde_json::from_str(text)
        .map_err(|e| GatewayError::Handshake(format!("failed to parse HELLO: {}", e)))?;

    if payload.op != 10 {
        return Err(GatewayError::Handshake(format!(
            "expected op 10 (HELLO), got op {}",
            payload.op
        )));
    }

    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| GatewayError::Handshake("HELLO missing heartbeat_interval".into()))
}

async fn send_json(
    ws_write: &Arc<Mutex<WsSink>>,
    payload: &serde_json::Value,
) -> Result<(), GatewayError> {
    let text = payload.to_string();
    let mut w = ws_write.lock().await;
    w.send(WsMessage::Text(text))
        .await
        .map_err(|e| GatewayError::Connect(format!("WS send error: {}", e)))
}

/// Exponential backoff with jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jitter = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jitter.min(60_000.0) as u64)
}
