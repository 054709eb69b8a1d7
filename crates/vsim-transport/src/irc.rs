//! IRC line transport.
//!
//! A plain TCP connection speaking the IRC client protocol (RFC 1459 framing
//! with IRCv3 message tags, as served by Twitch chat). The transport takes
//! care of what every connection needs regardless of the bot's logic:
//!
//! - registration (`PASS`, `NICK`, `USER`) and `CAP REQ` for each configured
//!   capability,
//! - answering `PING` with `PONG`,
//! - joining the configured channels once the server sends `001`.
//!
//! Every received line is handed to the listener as [`IrcEvent::Line`] without
//! further interpretation; parsing belongs to the adapter. There is no
//! reconnect: when the socket closes the listener gets
//! [`IrcEvent::Disconnected`] and the client stops.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use vsim_core::{NativeCallback, Transport, TransportClient, TransportError, TransportResult};

/// Default plaintext IRC port.
pub const DEFAULT_PORT: u16 = 6667;

/// Native events produced by the IRC transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// The TCP connection to `server` is being established.
    Connecting {
        server: String,
    },
    /// A raw protocol line, without the trailing CRLF.
    Line(String),
    /// The connection ended.
    Disconnected {
        reason: String,
    },
    /// A socket-level error.
    Error(String),
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcConfig {
    /// Server host name.
    pub server: String,
    pub port: u16,
    /// Nickname to register with.
    pub nick: String,
    /// Server password (`oauth:...` on Twitch).
    pub password: Option<String>,
    /// Channels joined after registration.
    pub channels: Vec<String>,
    /// Capabilities requested with `CAP REQ`.
    pub capabilities: Vec<String>,
}

impl IrcConfig {
    pub fn new(server: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_PORT,
            nick: nick.into(),
            password: None,
            channels: Vec::new(),
            capabilities: Vec::new(),
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    fn registration(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(password) = &self.password {
            lines.push(format!("PASS {password}"));
        }
        lines.push(format!("NICK {}", self.nick));
        lines.push(format!("USER {} 0 * :{}", self.nick, self.nick));
        for capability in &self.capabilities {
            lines.push(format!("CAP REQ :{capability}"));
        }
        lines
    }
}

/// A connected IRC client.
#[derive(Debug)]
pub struct IrcClient {
    outgoing: mpsc::UnboundedSender<String>,
    server: String,
}

impl IrcClient {
    /// Connects, registers and starts the read and write loops.
    ///
    /// `callback` receives every native event; `cancel` stops both loops and
    /// sends `QUIT`.
    pub async fn connect(
        config: IrcConfig,
        callback: NativeCallback<IrcEvent>,
        cancel: CancellationToken,
    ) -> TransportResult<Arc<Self>> {
        let address = config.address();
        callback(IrcEvent::Connecting {
            server: config.server.clone(),
        });

        info!(server = %address, nick = %config.nick, "Connecting to IRC server");
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| TransportError::ConnectionFailed {
                url: address.clone(),
                reason: e.to_string(),
            })?;
        let (reader, writer) = stream.into_split();

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        for line in config.registration() {
            // The receiver is alive: the writer task has not been spawned yet.
            let _ = outgoing.send(line);
        }

        tokio::spawn(write_loop(writer, outgoing_rx, cancel.clone()));
        tokio::spawn(read_loop(
            reader,
            outgoing.clone(),
            config.channels.clone(),
            callback,
            cancel,
        ));

        Ok(Arc::new(Self {
            outgoing,
            server: address,
        }))
    }

    /// Queues a raw protocol line.
    pub fn send_raw(&self, line: impl Into<String>) -> TransportResult<()> {
        self.outgoing
            .send(line.into())
            .map_err(|_| TransportError::ConnectionClosed {
                reason: format!("connection to {} is closed", self.server),
            })
    }
}

#[async_trait]
impl TransportClient for IrcClient {
    fn transport(&self) -> Transport {
        Transport::Irc
    }

    async fn send(&self, target: &str, text: &str) -> TransportResult<()> {
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            self.send_raw(format!("PRIVMSG {target} :{line}"))?;
        }
        Ok(())
    }

    async fn join(&self, channel: &str) -> TransportResult<()> {
        self.send_raw(format!("JOIN {}", strip_crlf(channel)))
    }

    async fn part(&self, channel: &str) -> TransportResult<()> {
        self.send_raw(format!("PART {}", strip_crlf(channel)))
    }
}

fn strip_crlf(s: &str) -> String {
    s.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// The command word of a raw line, skipping tags and prefix.
fn command_of(line: &str) -> &str {
    let mut rest = line;
    if rest.starts_with('@') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }
    if rest.starts_with(':') {
        rest = rest.split_once(' ').map_or("", |(_, r)| r);
    }
    rest.split(' ').next().unwrap_or("")
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = writer.write_all(b"QUIT :shutting down\r\n").await;
                break;
            }
            line = outgoing.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        trace!(line = %line, "IRC >>");
        let framed = format!("{}\r\n", strip_crlf(&line));
        if let Err(e) = writer.write_all(framed.as_bytes()).await {
            warn!(error = %e, "IRC write failed");
            break;
        }
    }
    debug!("IRC writer stopped");
}

async fn read_loop(
    reader: OwnedReadHalf,
    outgoing: mpsc::UnboundedSender<String>,
    channels: Vec<String>,
    callback: NativeCallback<IrcEvent>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(reader).lines();
    let reason = loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break "shutdown".to_string(),
            next = lines.next_line() => next,
        };
        let line = match next {
            Ok(Some(line)) => line,
            Ok(None) => break "connection closed by server".to_string(),
            Err(e) => {
                callback(IrcEvent::Error(e.to_string()));
                break e.to_string();
            }
        };
        trace!(line = %line, "IRC <<");

        match command_of(&line) {
            "PING" => {
                let token = line.split_once("PING").map_or("", |(_, t)| t.trim_start());
                let _ = outgoing.send(format!("PONG {token}"));
            }
            "001" => {
                for channel in &channels {
                    let _ = outgoing.send(format!("JOIN {channel}"));
                }
            }
            _ => {}
        }
        callback(IrcEvent::Line(line));
    };

    info!(reason = %reason, "IRC connection ended");
    callback(IrcEvent::Disconnected { reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[test]
    fn command_skips_tags_and_prefix() {
        assert_eq!(command_of("PING :tmi.twitch.tv"), "PING");
        assert_eq!(command_of(":srv 001 vsimbot :Welcome"), "001");
        assert_eq!(
            command_of("@badges=;color= :nick!nick@host PRIVMSG #chan :hi"),
            "PRIVMSG"
        );
        assert_eq!(command_of(""), "");
    }

    #[test]
    fn registration_order() {
        let mut config = IrcConfig::new("irc.example.org", "vsimbot");
        config.password = Some("oauth:secret".into());
        config.capabilities = vec!["twitch.tv/membership".into()];

        assert_eq!(
            config.registration(),
            vec![
                "PASS oauth:secret",
                "NICK vsimbot",
                "USER vsimbot 0 * :vsimbot",
                "CAP REQ :twitch.tv/membership",
            ]
        );
    }

    #[tokio::test]
    async fn registers_answers_ping_and_joins_on_welcome() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: NativeCallback<IrcEvent> = Arc::new(move |e| sink.lock().unwrap().push(e));

        let mut config = IrcConfig::new("127.0.0.1", "vsimbot");
        config.port = port;
        config.channels = vec!["#vsimbot".into()];
        let cancel = CancellationToken::new();
        let client = IrcClient::connect(config, callback, cancel.clone()).await.unwrap();

        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut lines = BufReader::new(read).lines();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK vsimbot");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "USER vsimbot 0 * :vsimbot");

        write.write_all(b"PING :tmi.twitch.tv\r\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG :tmi.twitch.tv");

        write.write_all(b":srv 001 vsimbot :Welcome\r\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "JOIN #vsimbot");

        client.send("#vsimbot", "one\ntwo").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PRIVMSG #vsimbot :one");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PRIVMSG #vsimbot :two");

        drop(write);
        drop(lines);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = events.lock().unwrap();
        assert_eq!(
            events[0],
            IrcEvent::Connecting {
                server: "127.0.0.1".into()
            }
        );
        assert!(events.contains(&IrcEvent::Line(":srv 001 vsimbot :Welcome".into())));
        assert!(matches!(events.last(), Some(IrcEvent::Disconnected { .. })));
    }
}
