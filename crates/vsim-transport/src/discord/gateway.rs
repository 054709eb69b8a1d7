//! Discord gateway client.
//!
//! Speaks the JSON gateway protocol over a WebSocket:
//!
//! 1. wait for `HELLO` (op 10) and read the heartbeat interval,
//! 2. send `IDENTIFY` (op 2) with the bot token and intents,
//! 3. heartbeat (op 1) with the last sequence number on every interval,
//! 4. forward every `DISPATCH` (op 0) to the listener.
//!
//! `RECONNECT` (op 7) and `INVALID_SESSION` (op 9) end the session with an
//! error: resuming is not implemented.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use vsim_core::{NativeCallback, TransportError, TransportResult};

use super::directory::ChannelDirectory;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Default gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// `GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT`.
pub const DEFAULT_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 15);

/// Gateway opcodes used by the client.
pub mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Native events produced by the Discord transport.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscordEvent {
    /// The WebSocket to `url` is being opened.
    Connecting {
        url: String,
    },
    /// A gateway dispatch: `kind` is the `t` field, `data` the `d` field.
    Dispatch {
        kind: String,
        data: Value,
    },
    /// The session ended.
    Disconnected {
        reason: String,
    },
    /// A protocol or socket error.
    Error(String),
}

/// Gateway session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub url: String,
    /// Bot token, without the `Bot ` prefix.
    pub token: String,
    pub intents: u64,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: token.into(),
            intents: DEFAULT_INTENTS,
        }
    }
}

/// One gateway frame.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

impl GatewayPayload {
    pub fn parse(text: &str) -> TransportResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| TransportError::Io(format!("malformed gateway frame: {e}")))
    }

    /// Heartbeat interval from a `HELLO` frame.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
    }
}

/// The `IDENTIFY` frame.
pub fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": op::IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "vsim",
                "device": "vsim",
            },
        },
    })
}

/// A heartbeat frame carrying the last seen sequence number.
pub fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": op::HEARTBEAT, "d": seq })
}

/// Opens the gateway, identifies and spawns the session loop.
///
/// The returned handle completes when the session ends; the listener always
/// sees a final [`DiscordEvent::Disconnected`].
pub async fn connect(
    config: GatewayConfig,
    directory: Arc<ChannelDirectory>,
    callback: NativeCallback<DiscordEvent>,
    cancel: CancellationToken,
) -> TransportResult<JoinHandle<()>> {
    callback(DiscordEvent::Connecting {
        url: config.url.clone(),
    });
    info!(url = %config.url, "Connecting to Discord gateway");

    let (stream, _response) =
        connect_async(config.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: config.url.clone(),
                reason: format!("WebSocket connection failed: {e}"),
            })?;
    let (mut sink, mut source) = stream.split();

    let hello = next_payload(&mut source).await?;
    let interval = match (hello.op, hello.heartbeat_interval()) {
        (op::HELLO, Some(interval)) => interval,
        _ => {
            return Err(TransportError::ConnectionFailed {
                url: config.url,
                reason: format!("expected HELLO, got op {}", hello.op),
            });
        }
    };
    debug!(interval = ?interval, "Gateway HELLO received");

    send_json(&mut sink, &identify_payload(&config.token, config.intents)).await?;

    let session = Session {
        sink,
        source,
        interval,
        seq: None,
        directory,
        callback,
    };
    Ok(tokio::spawn(session.run(cancel)))
}

struct Session {
    sink: WsSink,
    source: WsSource,
    interval: Duration,
    seq: Option<u64>,
    directory: Arc<ChannelDirectory>,
    callback: NativeCallback<DiscordEvent>,
}

impl Session {
    async fn run(mut self, cancel: CancellationToken) {
        let mut heartbeat = tokio::time::interval(self.interval);
        // The first tick completes immediately; the first beat is due after
        // one full interval.
        heartbeat.tick().await;

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = self.sink.close().await;
                    break "shutdown".to_string();
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = send_json(&mut self.sink, &heartbeat_payload(self.seq)).await {
                        (self.callback)(DiscordEvent::Error(e.to_string()));
                        break e.to_string();
                    }
                    trace!(seq = ?self.seq, "Heartbeat sent");
                }
                frame = self.source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reason) = self.handle_text(text.as_str()).await {
                            break reason;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(|| "closed by gateway".to_string(), |f| f.reason.as_str().to_string());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        (self.callback)(DiscordEvent::Error(e.to_string()));
                        break e.to_string();
                    }
                    None => break "gateway stream ended".to_string(),
                },
            }
        };

        info!(reason = %reason, "Discord session ended");
        (self.callback)(DiscordEvent::Disconnected { reason });
    }

    /// Handles one text frame; returns a reason when the session must end.
    async fn handle_text(&mut self, text: &str) -> Option<String> {
        let payload = match GatewayPayload::parse(text) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Ignoring gateway frame");
                return None;
            }
        };

        match payload.op {
            op::DISPATCH => {
                if payload.s.is_some() {
                    self.seq = payload.s;
                }
                let kind = payload.t.unwrap_or_default();
                self.directory.absorb(&kind, &payload.d);
                (self.callback)(DiscordEvent::Dispatch {
                    kind,
                    data: payload.d,
                });
                None
            }
            op::HEARTBEAT => {
                send_json(&mut self.sink, &heartbeat_payload(self.seq))
                    .await
                    .err()
                    .map(|e| e.to_string())
            }
            op::HEARTBEAT_ACK => {
                trace!("Heartbeat acknowledged");
                None
            }
            op::RECONNECT | op::INVALID_SESSION => {
                let reason = format!("gateway requested a new session (op {})", payload.op);
                (self.callback)(DiscordEvent::Error(reason.clone()));
                Some(reason)
            }
            other => {
                trace!(op = other, "Unhandled gateway opcode");
                None
            }
        }
    }
}

async fn next_payload(source: &mut WsSource) -> TransportResult<GatewayPayload> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return GatewayPayload::parse(text.as_str()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
            None => {
                return Err(TransportError::ConnectionClosed {
                    reason: "gateway closed before HELLO".into(),
                });
            }
        }
    }
}

async fn send_json(sink: &mut WsSink, value: &Value) -> TransportResult<()> {
    sink.send(Message::Text(value.to_string().into()))
        .await
        .map_err(|e| TransportError::SendFailed(e.to_string()))
}
