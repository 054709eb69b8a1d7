//! The canonical message model.
//!
//! Every inbound chat line, whatever transport it arrived on, is normalized
//! into a [`CanonicalMessage`] by the owning adapter before anything else in
//! the bot sees it. Downstream code never touches transport-native shapes
//! except through the opaque [`CanonicalMessage::raw`] payload.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The transports the bot can be connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// An IRC (or IRC-compatible, e.g. Twitch chat) connection.
    Irc,
    /// A Discord gateway connection.
    Discord,
}

impl Transport {
    /// All transports, in registration order.
    pub const ALL: [Transport; 2] = [Transport::Irc, Transport::Discord];

    /// Returns the lowercase transport name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Irc => "irc",
            Self::Discord => "discord",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "irc" => Ok(Self::Irc),
            "discord" => Ok(Self::Discord),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}

/// Returned when parsing an unknown transport name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transport '{0}'")]
pub struct UnknownTransport(pub String);

/// A transport-independent inbound chat message.
///
/// Instances are immutable: adapters build one per inbound event with
/// [`CanonicalMessage::new`] and the dispatcher only ever borrows it.
///
/// `channel` is the human-readable channel name handlers match and log
/// against. `reply_to` is the address the transport delivers replies to; it
/// equals `channel` unless the adapter sets it with
/// [`with_reply_to`](CanonicalMessage::with_reply_to) (Discord channel ids).
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalMessage {
    transport: Transport,
    from: String,
    channel: String,
    reply_to: String,
    body: String,
    raw: Value,
}

impl CanonicalMessage {
    /// Creates a new canonical message.
    pub fn new(
        transport: Transport,
        from: impl Into<String>,
        channel: impl Into<String>,
        body: impl Into<String>,
        raw: Value,
    ) -> Self {
        let channel = channel.into();
        Self {
            transport,
            from: from.into(),
            reply_to: channel.clone(),
            channel,
            body: body.into(),
            raw,
        }
    }

    /// Sets the transport address replies go to.
    pub fn with_reply_to(mut self, target: impl Into<String>) -> Self {
        self.reply_to = target.into();
        self
    }

    /// The transport this message arrived on.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The sender identity as the transport reports it.
    pub fn from(&self) -> &str {
        &self.from
    }

    /// The channel or room the message was addressed to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Where replies to this message are delivered.
    pub fn reply_to(&self) -> &str {
        &self.reply_to
    }

    /// The user-visible text of the message.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// The transport-native payload the message was built from.
    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transport_names_round_trip() {
        for transport in Transport::ALL {
            assert_eq!(transport.as_str().parse::<Transport>(), Ok(transport));
        }
        assert_eq!("IRC".parse::<Transport>(), Ok(Transport::Irc));
        assert!("slack".parse::<Transport>().is_err());
    }

    #[test]
    fn message_exposes_fields() {
        let msg = CanonicalMessage::new(
            Transport::Discord,
            "alice",
            "general",
            "hello",
            json!({ "content": "hello" }),
        );

        assert_eq!(msg.transport(), Transport::Discord);
        assert_eq!(msg.from(), "alice");
        assert_eq!(msg.channel(), "general");
        assert_eq!(msg.body(), "hello");
        assert_eq!(msg.raw()["content"], "hello");
        assert_eq!(msg.reply_to(), "general");
    }

    #[test]
    fn reply_target_can_differ_from_display_channel() {
        let msg = CanonicalMessage::new(Transport::Discord, "alice", "general", "hi", Value::Null)
            .with_reply_to("200");

        assert_eq!(msg.channel(), "general");
        assert_eq!(msg.reply_to(), "200");
    }
}
