//! IRC adapter.
//!
//! Maps [`IrcEvent`]s to canonical events:
//!
//! | Native                     | Canonical                              |
//! |----------------------------|----------------------------------------|
//! | `Connecting`               | `connect` (detail: server)             |
//! | `Disconnected`             | `disconnect` (detail: reason)          |
//! | `Error`, `ERROR`, 4xx/5xx  | `error` (detail: command and params)   |
//! | `JOIN` / `PART`            | `join` / `part` (channel, nick)        |
//! | `PRIVMSG #chan`            | message                                |
//! | `WHISPER`                  | rewritten to `PRIVMSG`, then as above  |
//!
//! Channel messages from the bot's own nick are dropped. Private messages
//! that are not whispers are dropped as well.

use serde_json::Value;
use tracing::{debug, trace};

use vsim_core::{
    AdapterResult, CanonicalMessage, InboundEvent, LifecycleEvent, LifecycleSignal, Transport,
    TransportAdapter,
};
use vsim_transport::IrcEvent;

use crate::model::IrcMessage;

/// Converts IRC transport events into canonical events.
#[derive(Debug, Clone)]
pub struct IrcAdapter {
    identity: String,
    whisper_channel: String,
}

impl IrcAdapter {
    /// Creates an adapter for the bot nick `identity`. Whispers go to
    /// `#identity` until [`whisper_channel`](Self::whisper_channel) says
    /// otherwise.
    pub fn new(identity: impl Into<String>) -> Self {
        let identity = identity.into();
        let whisper_channel = format!("#{}", identity.to_ascii_lowercase());
        Self {
            identity,
            whisper_channel,
        }
    }

    /// Sets the channel whispers are redelivered to.
    pub fn whisper_channel(mut self, channel: impl Into<String>) -> Self {
        self.whisper_channel = channel.into();
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn is_self(&self, nick: &str) -> bool {
        nick.eq_ignore_ascii_case(&self.identity)
    }

    /// Adapts one parsed protocol line.
    pub fn adapt_message(&self, mut msg: IrcMessage) -> Option<InboundEvent> {
        match msg.command.as_str() {
            "PRIVMSG" => {
                let nick = msg.nick()?.to_string();
                if self.is_self(&nick) {
                    trace!(nick = %nick, "Dropping own message");
                    return None;
                }
                let target = msg.param(0)?.to_string();
                if !target.starts_with('#') {
                    trace!(from = %nick, "Dropping private message");
                    return None;
                }
                let body = msg.param(1).unwrap_or_default().to_string();
                let raw = to_raw(&msg);
                Some(CanonicalMessage::new(Transport::Irc, nick, target, body, raw).into())
            }
            "WHISPER" => {
                debug!(from = ?msg.nick(), channel = %self.whisper_channel, "Redelivering whisper");
                msg.command = "PRIVMSG".to_string();
                match msg.params.first_mut() {
                    Some(target) => *target = self.whisper_channel.clone(),
                    None => msg.params.push(self.whisper_channel.clone()),
                }
                self.adapt_message(msg)
            }
            "JOIN" | "PART" => {
                let event = if msg.command == "JOIN" {
                    LifecycleEvent::Join
                } else {
                    LifecycleEvent::Part
                };
                let mut signal = LifecycleSignal::new(Transport::Irc, event).with_raw(to_raw(&msg));
                if let Some(channel) = msg.param(0) {
                    signal = signal.with_channel(channel);
                }
                if let Some(nick) = msg.nick() {
                    signal = signal.with_nick(nick);
                }
                Some(signal.into())
            }
            "ERROR" => Some(
                LifecycleSignal::new(Transport::Irc, LifecycleEvent::Error)
                    .with_detail(msg.trailing().unwrap_or("ERROR"))
                    .with_raw(to_raw(&msg))
                    .into(),
            ),
            _ if msg.is_error_reply() => Some(
                LifecycleSignal::new(Transport::Irc, LifecycleEvent::Error)
                    .with_detail(format!("{}: {}", msg.command, msg.params.join(" ")))
                    .with_raw(to_raw(&msg))
                    .into(),
            ),
            _ => None,
        }
    }
}

fn to_raw(msg: &IrcMessage) -> Value {
    serde_json::to_value(msg).unwrap_or(Value::Null)
}

impl TransportAdapter for IrcAdapter {
    type Native = IrcEvent;

    fn transport(&self) -> Transport {
        Transport::Irc
    }

    fn adapt(&self, native: IrcEvent) -> AdapterResult<Option<InboundEvent>> {
        let event = match native {
            IrcEvent::Connecting { server } => Some(
                LifecycleSignal::new(Transport::Irc, LifecycleEvent::Connect)
                    .with_detail(server)
                    .into(),
            ),
            IrcEvent::Disconnected { reason } => Some(
                LifecycleSignal::new(Transport::Irc, LifecycleEvent::Disconnect)
                    .with_detail(reason)
                    .into(),
            ),
            IrcEvent::Error(detail) => Some(
                LifecycleSignal::new(Transport::Irc, LifecycleEvent::Error)
                    .with_detail(detail)
                    .into(),
            ),
            IrcEvent::Line(line) => self.adapt_message(IrcMessage::parse(&line)?),
        };
        Ok(event)
    }
}
