//! The transport adapter contract.
//!
//! An adapter converts one native transport event into zero or one
//! [`InboundEvent`]. It applies the transport's own filtering on the way:
//! messages sent by the bot itself are dropped, and quirks such as IRC
//! whispers are rewritten into ordinary channel messages.
//!
//! Adapters perform no I/O. Native event shapes never leave the adapter.

use crate::foundation::error::AdapterResult;
use crate::foundation::event::InboundEvent;
use crate::foundation::message::Transport;

/// Converts native events of one transport into canonical events.
pub trait TransportAdapter: Send + Sync {
    /// The transport's native event type.
    type Native;

    /// Which transport this adapter serves.
    fn transport(&self) -> Transport;

    /// Adapts one native event.
    ///
    /// `Ok(None)` means the event is deliberately dropped (self-message,
    /// protocol chatter the dispatcher has no use for).
    fn adapt(&self, native: Self::Native) -> AdapterResult<Option<InboundEvent>>;
}
