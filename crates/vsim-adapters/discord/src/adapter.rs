//! Discord adapter.
//!
//! `MESSAGE_CREATE` dispatches become canonical messages: the author's
//! username is the sender, the channel id is resolved to a name through the
//! shared [`ChannelDirectory`] (falling back to the id), and `content` is the
//! body. Replies are addressed to the channel id itself, since names are only
//! unique within a guild. `READY` becomes `connect`; session end and errors become
//! `disconnect` and `error`. Everything else is dropped.

use std::sync::Arc;

use tracing::trace;

use vsim_core::{
    AdapterResult, CanonicalMessage, InboundEvent, LifecycleEvent, LifecycleSignal, Transport,
    TransportAdapter,
};
use vsim_transport::{ChannelDirectory, DiscordEvent};

use crate::model::{MessageCreate, Ready, parse_dispatch};

/// Converts Discord transport events into canonical events.
#[derive(Debug, Clone)]
pub struct DiscordAdapter {
    identity: String,
    directory: Arc<ChannelDirectory>,
}

impl DiscordAdapter {
    /// Creates an adapter for the bot username `identity`.
    pub fn new(identity: impl Into<String>, directory: Arc<ChannelDirectory>) -> Self {
        Self {
            identity: identity.into(),
            directory,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    fn message(&self, data: serde_json::Value) -> AdapterResult<Option<InboundEvent>> {
        let msg: MessageCreate = parse_dispatch("MESSAGE_CREATE", &data)?;
        if msg.author.username == self.identity {
            trace!(author = %msg.author.username, "Dropping own message");
            return Ok(None);
        }

        let channel = self
            .directory
            .name_of(&msg.channel_id)
            .unwrap_or_else(|| msg.channel_id.clone());
        Ok(Some(
            CanonicalMessage::new(Transport::Discord, msg.author.username, channel, msg.content, data)
                .with_reply_to(msg.channel_id)
                .into(),
        ))
    }
}

impl TransportAdapter for DiscordAdapter {
    type Native = DiscordEvent;

    fn transport(&self) -> Transport {
        Transport::Discord
    }

    fn adapt(&self, native: DiscordEvent) -> AdapterResult<Option<InboundEvent>> {
        match native {
            DiscordEvent::Connecting { url } => {
                trace!(url = %url, "Discord gateway connecting");
                Ok(None)
            }
            DiscordEvent::Dispatch { kind, data } => match kind.as_str() {
                "MESSAGE_CREATE" => self.message(data),
                "READY" => {
                    let ready: Ready = parse_dispatch(&kind, &data)?;
                    Ok(Some(
                        LifecycleSignal::new(Transport::Discord, LifecycleEvent::Connect)
                            .with_nick(ready.user.username)
                            .with_detail("Discord gateway")
                            .with_raw(data)
                            .into(),
                    ))
                }
                _ => Ok(None),
            },
            DiscordEvent::Disconnected { reason } => Ok(Some(
                LifecycleSignal::new(Transport::Discord, LifecycleEvent::Disconnect)
                    .with_detail(reason)
                    .into(),
            )),
            DiscordEvent::Error(detail) => Ok(Some(
                LifecycleSignal::new(Transport::Discord, LifecycleEvent::Error)
                    .with_detail(detail)
                    .into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter() -> DiscordAdapter {
        let directory = Arc::new(ChannelDirectory::new());
        directory.absorb(
            "GUILD_CREATE",
            &json!({ "channels": [{ "id": "100", "name": "general" }] }),
        );
        DiscordAdapter::new("vsimbot", directory)
    }

    fn message_create(author: &str, channel_id: &str, content: &str) -> DiscordEvent {
        DiscordEvent::Dispatch {
            kind: "MESSAGE_CREATE".into(),
            data: json!({
                "id": "1",
                "channel_id": channel_id,
                "author": { "id": "42", "username": author },
                "content": content,
            }),
        }
    }

    #[test]
    fn message_create_resolves_channel_name() {
        let Some(InboundEvent::Message(m)) = adapter().adapt(message_create("alice", "100", "!ping")).unwrap()
        else {
            panic!("expected a message");
        };

        assert_eq!(m.transport(), Transport::Discord);
        assert_eq!(m.from(), "alice");
        assert_eq!(m.channel(), "general");
        assert_eq!(m.body(), "!ping");
        assert_eq!(m.raw()["author"]["id"], "42");
    }

    #[test]
    fn replies_address_the_originating_channel_id() {
        let directory = Arc::new(ChannelDirectory::new());
        for (guild, id) in [("g1", "100"), ("g2", "200")] {
            directory.absorb(
                "GUILD_CREATE",
                &json!({ "id": guild, "channels": [{ "id": id, "name": "general" }] }),
            );
        }
        let adapter = DiscordAdapter::new("vsimbot", directory);

        for id in ["100", "200"] {
            let Some(InboundEvent::Message(m)) = adapter.adapt(message_create("alice", id, "!ping")).unwrap()
            else {
                panic!("expected a message");
            };
            assert_eq!(m.channel(), "general");
            assert_eq!(m.reply_to(), id);
        }
    }

    #[test]
    fn unknown_channel_falls_back_to_id() {
        let Some(InboundEvent::Message(m)) = adapter().adapt(message_create("alice", "555", "hi")).unwrap()
        else {
            panic!("expected a message");
        };
        assert_eq!(m.channel(), "555");
        assert_eq!(m.reply_to(), "555");
    }

    #[test]
    fn own_messages_are_suppressed() {
        assert_eq!(adapter().adapt(message_create("vsimbot", "100", "pong")).unwrap(), None);
    }

    #[test]
    fn ready_is_connect_and_other_dispatches_are_dropped() {
        let adapter = adapter();
        let ready = adapter
            .adapt(DiscordEvent::Dispatch {
                kind: "READY".into(),
                data: json!({ "user": { "id": "1", "username": "vsimbot", "bot": true }, "session_id": "s" }),
            })
            .unwrap();
        let Some(InboundEvent::Lifecycle(signal)) = ready else {
            panic!("expected lifecycle");
        };
        assert_eq!(signal.event(), LifecycleEvent::Connect);
        assert_eq!(signal.nick(), Some("vsimbot"));

        let typing = adapter
            .adapt(DiscordEvent::Dispatch {
                kind: "TYPING_START".into(),
                data: json!({}),
            })
            .unwrap();
        assert!(typing.is_none());
    }

    #[test]
    fn malformed_message_is_an_error() {
        let err = adapter().adapt(DiscordEvent::Dispatch {
            kind: "MESSAGE_CREATE".into(),
            data: json!({ "content": "no author" }),
        });
        assert!(err.is_err());
    }

    #[test]
    fn session_end_maps_to_disconnect() {
        let event = adapter()
            .adapt(DiscordEvent::Disconnected {
                reason: "closed".into(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(event.event_name(), "disconnect");
        assert_eq!(event.transport(), Transport::Discord);
    }
}
