//! Discord Gateway (WebSocket) client.
//!
//! Identifies with the `GUILDS` intent only; interactions are delivered
//! regardless of intents. One supervising task owns the event channel and
//! reconnects across sockets, resuming the session when Discord allows it.
//! The channel only ends on a fatal close code or when the receiver is
//! dropped.

use std::fmt;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::error::{DiscordError, DiscordResult};
use crate::interaction::Interaction;
use rolesync_core::User;

const GATEWAY_VERSION: &str = "10";
const INTENT_GUILDS: u64 = 1 << 0;
const EVENT_BUFFER: usize = 256;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Discord Gateway opcodes used by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum GatewayOpcode {
    Dispatch = 0,
    Heartbeat = 1,
    Identify = 2,
    Resume = 6,
    Reconnect = 7,
    InvalidSession = 9,
    Hello = 10,
    HeartbeatAck = 11,
}

impl TryFrom<i32> for GatewayOpcode {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Dispatch),
            1 => Ok(Self::Heartbeat),
            2 => Ok(Self::Identify),
            6 => Ok(Self::Resume),
            7 => Ok(Self::Reconnect),
            9 => Ok(Self::InvalidSession),
            10 => Ok(Self::Hello),
            11 => Ok(Self::HeartbeatAck),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GatewayPayload {
    op: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    d: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayHello {
    heartbeat_interval: u64,
}

#[derive(Debug, Deserialize)]
struct GatewayReady {
    user: User,
    #[serde(default)]
    guilds: Vec<serde_json::Value>,
}

/// The part of READY needed to resume later.
#[derive(Debug, Deserialize)]
struct ReadySession {
    session_id: String,
    #[serde(default)]
    resume_gateway_url: Option<String>,
}

/// Events forwarded to the bot.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready { user: User, guild_count: usize },
    InteractionCreate(Box<Interaction>),
}

/// Discord Gateway connection settings.
#[derive(Clone)]
pub struct Gateway {
    url: String,
    token: String,
    intents: u64,
    reconnect_delay: Duration,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("intents", &self.intents)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish()
    }
}

impl Gateway {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            intents: INTENT_GUILDS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Base delay before reconnecting after a dropped socket or an invalid
    /// session. Doubles per consecutive failure up to one minute. A socket
    /// that received any dispatch resets the count.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Opens the first socket and spawns the supervising task. The returned
    /// receiver yields `None` only after a fatal close (bad token, bad
    /// intents).
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn connect(&self) -> DiscordResult<mpsc::Receiver<GatewayEvent>> {
        let ws_stream = open_socket(&self.url).await?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let gateway = self.clone();
        tokio::spawn(async move {
            gateway.supervise(ws_stream, event_tx).await;
        });

        Ok(event_rx)
    }

    async fn supervise(self, first: WsStream, event_tx: mpsc::Sender<GatewayEvent>) {
        let mut session = Session::default();
        let mut next = Some(first);
        let mut failures = 0u32;

        loop {
            let ws_stream = match next.take() {
                Some(ws_stream) => ws_stream,
                None => {
                    let url = session.reconnect_url().unwrap_or(self.url.as_str());
                    match open_socket(url).await {
                        Ok(ws_stream) => ws_stream,
                        Err(e) => {
                            failures += 1;
                            warn!(error = %e, failures, "Gateway reconnect failed");
                            tokio::time::sleep(self.backoff(failures)).await;
                            continue;
                        }
                    }
                }
            };

            let last_sequence = session.sequence;
            let outcome =
                run_session(ws_stream, &self.token, self.intents, &mut session, &event_tx).await;
            if session.sequence != last_sequence {
                failures = 0;
            }

            let delay = match outcome {
                Ok(Disconnect::Reconnect) => Duration::ZERO,
                Ok(Disconnect::Resume) => {
                    failures += 1;
                    self.backoff(failures)
                }
                Ok(Disconnect::Reidentify) => {
                    session.clear();
                    failures += 1;
                    self.backoff(failures)
                }
                Ok(Disconnect::Fatal(code)) => {
                    error!(code, "Gateway closed with a fatal code, not reconnecting");
                    return;
                }
                Ok(Disconnect::ReceiverDropped) => {
                    info!("Event receiver dropped, closing gateway");
                    return;
                }
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "Gateway connection error");
                    self.backoff(failures)
                }
            };

            if event_tx.is_closed() {
                return;
            }
            info!(resume = session.can_resume(), "Reconnecting to Discord gateway");
            tokio::time::sleep(delay).await;
        }
    }

    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.saturating_sub(1).min(6);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(MAX_RECONNECT_DELAY)
    }
}

/// Resume state carried from one socket to the next.
#[derive(Debug, Default)]
struct Session {
    id: Option<String>,
    resume_url: Option<String>,
    sequence: Option<u64>,
}

impl Session {
    fn can_resume(&self) -> bool {
        self.id.is_some() && self.sequence.is_some()
    }

    fn reconnect_url(&self) -> Option<&str> {
        self.resume_url.as_deref().filter(|_| self.can_resume())
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// How a socket ended, and what the next one should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    /// Discord asked for a new socket (op 7).
    Reconnect,
    /// The socket dropped; resume on the next one if the session allows.
    Resume,
    Reidentify,
    Fatal(u16),
    ReceiverDropped,
}

/// Maps a close code to the follow-up. 4004 and 4010-4014 cannot be fixed
/// by reconnecting; 4007 and 4009 leave a session that cannot be resumed.
fn close_action(code: u16) -> Disconnect {
    match code {
        4004 | 4010..=4014 => Disconnect::Fatal(code),
        4007 | 4009 => Disconnect::Reidentify,
        _ => Disconnect::Resume,
    }
}

fn gateway_ws_url(base: &str) -> DiscordResult<Url> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .clear()
        .append_pair("v", GATEWAY_VERSION)
        .append_pair("encoding", "json");
    Ok(url)
}

async fn open_socket(base: &str) -> DiscordResult<WsStream> {
    let ws_url = gateway_ws_url(base)?;
    info!(url = %ws_url, "Connecting to Discord gateway");
    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .map_err(|e| DiscordError::Gateway(format!("Failed to connect: {e}")))?;
    Ok(ws_stream)
}

fn heartbeat(sequence: Option<u64>) -> WsMessage {
    let payload = json!({
        "op": GatewayOpcode::Heartbeat as i32,
        "d": sequence
    });
    WsMessage::Text(payload.to_string().into())
}

/// Identify for a fresh session, Resume when the previous one is still valid.
fn handshake(session: &Session, token: &str, intents: u64) -> GatewayPayload {
    match (&session.id, session.sequence) {
        (Some(session_id), Some(seq)) => GatewayPayload {
            op: GatewayOpcode::Resume as i32,
            d: Some(json!({
                "token": token,
                "session_id": session_id,
                "seq": seq
            })),
            s: None,
            t: None,
        },
        _ => GatewayPayload {
            op: GatewayOpcode::Identify as i32,
            d: Some(json!({
                "token": token,
                "intents": intents,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": "rolesync",
                    "device": "rolesync"
                }
            })),
            s: None,
            t: None,
        },
    }
}

/// Maps a dispatch to a forwarded event; `Ok(None)` for events the bot ignores.
fn dispatch_event(name: &str, data: serde_json::Value) -> DiscordResult<Option<GatewayEvent>> {
    match name {
        "READY" => {
            let ready: GatewayReady = serde_json::from_value(data)?;
            Ok(Some(GatewayEvent::Ready {
                user: ready.user,
                guild_count: ready.guilds.len(),
            }))
        }
        "INTERACTION_CREATE" => {
            let interaction: Interaction = serde_json::from_value(data)?;
            Ok(Some(GatewayEvent::InteractionCreate(Box::new(interaction))))
        }
        _ => Ok(None),
    }
}

/// Drives one socket until it ends. Errors before the handshake completes
/// count as failed attempts; everything after is reported as a `Disconnect`.
async fn run_session(
    ws_stream: WsStream,
    token: &str,
    intents: u64,
    session: &mut Session,
    event_tx: &mpsc::Sender<GatewayEvent>,
) -> DiscordResult<Disconnect> {
    let (mut write, mut read) = ws_stream.split();

    // Wait for Hello
    let hello: GatewayHello = match read.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            let payload: GatewayPayload = serde_json::from_str(&text)?;
            if payload.op != GatewayOpcode::Hello as i32 {
                return Err(DiscordError::Gateway("Expected Hello opcode".into()));
            }
            serde_json::from_value(payload.d.unwrap_or_default())?
        }
        Some(Ok(msg)) => {
            return Err(DiscordError::Gateway(format!("Unexpected message: {msg:?}")));
        }
        Some(Err(e)) => return Err(DiscordError::WebSocket(e)),
        None => {
            return Err(DiscordError::Gateway("Connection closed before Hello".into()));
        }
    };

    let heartbeat_interval = Duration::from_millis(hello.heartbeat_interval);
    debug!(interval_ms = hello.heartbeat_interval, "Received Hello");

    let greeting = handshake(session, token, intents);
    let resuming = greeting.op == GatewayOpcode::Resume as i32;
    write
        .send(WsMessage::Text(serde_json::to_string(&greeting)?.into()))
        .await
        .map_err(|e| DiscordError::Gateway(format!("Failed to send handshake: {e}")))?;
    debug!(resuming, "Sent handshake");

    let mut heartbeat_acked = true;
    let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
    // Skip the first tick which fires immediately
    heartbeat_timer.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat_timer.tick() => {
                if !heartbeat_acked {
                    warn!("Heartbeat not acknowledged, connection is zombied");
                    return Ok(Disconnect::Resume);
                }
                if let Err(e) = write.send(heartbeat(session.sequence)).await {
                    error!(error = %e, "Failed to send heartbeat");
                    return Ok(Disconnect::Resume);
                }
                heartbeat_acked = false;
                debug!("Sent heartbeat");
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let payload: GatewayPayload = match serde_json::from_str(&text) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "Failed to parse gateway payload");
                                continue;
                            }
                        };

                        if let Some(s) = payload.s {
                            session.sequence = Some(s);
                        }

                        match GatewayOpcode::try_from(payload.op) {
                            Ok(GatewayOpcode::Dispatch) => {
                                let name = payload.t.unwrap_or_default();
                                let data = payload.d.unwrap_or_default();
                                match name.as_str() {
                                    "READY" => match serde_json::from_value::<ReadySession>(data.clone()) {
                                        Ok(ready) => {
                                            info!(session_id = %ready.session_id, "Gateway session started");
                                            session.id = Some(ready.session_id);
                                            session.resume_url = ready.resume_gateway_url;
                                        }
                                        Err(e) => warn!(error = %e, "READY without session details"),
                                    },
                                    "RESUMED" => info!("Gateway session resumed"),
                                    _ => {}
                                }
                                let event = match dispatch_event(&name, data) {
                                    Ok(Some(event)) => event,
                                    Ok(None) => continue,
                                    Err(e) => {
                                        warn!(event = %name, error = %e, "Failed to decode dispatch");
                                        continue;
                                    }
                                };
                                if event_tx.send(event).await.is_err() {
                                    return Ok(Disconnect::ReceiverDropped);
                                }
                            }
                            Ok(GatewayOpcode::HeartbeatAck) => {
                                heartbeat_acked = true;
                                debug!("Heartbeat acknowledged");
                            }
                            Ok(GatewayOpcode::Heartbeat) => {
                                if let Err(e) = write.send(heartbeat(session.sequence)).await {
                                    error!(error = %e, "Failed to send heartbeat response");
                                    return Ok(Disconnect::Resume);
                                }
                            }
                            Ok(GatewayOpcode::Reconnect) => {
                                info!("Received reconnect request");
                                return Ok(Disconnect::Reconnect);
                            }
                            Ok(GatewayOpcode::InvalidSession) => {
                                let resumable = payload.d.and_then(|v| v.as_bool()).unwrap_or(false);
                                warn!(resumable, "Session invalidated");
                                return Ok(if resumable {
                                    Disconnect::Resume
                                } else {
                                    Disconnect::Reidentify
                                });
                            }
                            _ => {
                                debug!(op = payload.op, "Unhandled opcode");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(frame = ?frame, "Gateway connection closed");
                        return Ok(frame
                            .map(|f| close_action(u16::from(f.code)))
                            .unwrap_or(Disconnect::Resume));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        return Ok(Disconnect::Resume);
                    }
                    None => {
                        info!("Gateway connection ended");
                        return Ok(Disconnect::Resume);
                    }
                }
            }
        }
    }
}
