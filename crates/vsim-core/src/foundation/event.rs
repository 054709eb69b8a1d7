//! Inbound event types.
//!
//! Adapters emit [`InboundEvent`]s: either a content [`CanonicalMessage`] or a
//! [`LifecycleSignal`] describing a connection-state transition. Transports
//! must map their native notions onto the fixed [`LifecycleEvent`] vocabulary
//! before the dispatcher sees them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{CanonicalMessage, Transport};

/// The lifecycle vocabulary understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    /// The transport connection was established.
    Connect,
    /// The transport connection was lost or closed.
    Disconnect,
    /// Someone (possibly the bot) joined a channel.
    Join,
    /// Someone (possibly the bot) left a channel.
    Part,
    /// The transport reported an error.
    Error,
}

impl LifecycleEvent {
    /// Every lifecycle event, in a fixed order.
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::Connect,
        LifecycleEvent::Disconnect,
        LifecycleEvent::Join,
        LifecycleEvent::Part,
        LifecycleEvent::Error,
    ];

    /// Returns the lowercase event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Join => "join",
            Self::Part => "part",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "join" => Self::Join,
            "part" => Self::Part,
            "error" => Self::Error,
            _ => return Err(()),
        })
    }
}

/// A connection-state signal emitted by an adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSignal {
    transport: Transport,
    event: LifecycleEvent,
    channel: Option<String>,
    nick: Option<String>,
    detail: Option<String>,
    raw: Value,
}

impl LifecycleSignal {
    /// Creates a bare signal with no channel, nick or detail.
    pub fn new(transport: Transport, event: LifecycleEvent) -> Self {
        Self {
            transport,
            event,
            channel: None,
            nick: None,
            detail: None,
            raw: Value::Null,
        }
    }

    /// Sets the channel the signal refers to.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Sets the nick the signal refers to.
    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Sets free-form detail text (server address, error text, ...).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attaches the transport-native payload.
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn event(&self) -> LifecycleEvent {
        self.event
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn nick(&self) -> Option<&str> {
        self.nick.as_deref()
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Anything an adapter hands to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A content message.
    Message(CanonicalMessage),
    /// A lifecycle transition.
    Lifecycle(LifecycleSignal),
}

impl InboundEvent {
    /// The transport the event originated from.
    pub fn transport(&self) -> Transport {
        match self {
            Self::Message(msg) => msg.transport(),
            Self::Lifecycle(signal) => signal.transport(),
        }
    }

    /// A short name for logging: `message` or the lifecycle event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Lifecycle(signal) => signal.event().as_str(),
        }
    }
}

impl From<CanonicalMessage> for InboundEvent {
    fn from(msg: CanonicalMessage) -> Self {
        Self::Message(msg)
    }
}

impl From<LifecycleSignal> for InboundEvent {
    fn from(signal: LifecycleSignal) -> Self {
        Self::Lifecycle(signal)
    }
}
