//! The transport collaborator contract.
//!
//! The dispatch core depends on transports only through this module:
//!
//! - connection establishment and credentials are handled by each transport's
//!   constructor, which receives a [`NativeCallback`] (the listener) that is
//!   invoked for every native event the connection produces;
//! - outbound operations go through [`TransportClient`].
//!
//! Reconnection policy belongs to the transport implementation, not here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::foundation::error::TransportResult;
use crate::foundation::message::Transport;

/// Listener invoked by a transport for every native event it produces.
///
/// Implementations must not block: the runtime's callback only enqueues.
pub type NativeCallback<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Outbound operations a connected transport offers.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Which transport this client drives.
    fn transport(&self) -> Transport;

    /// Sends `text` to a channel or user.
    async fn send(&self, target: &str, text: &str) -> TransportResult<()>;

    /// Joins a channel.
    async fn join(&self, channel: &str) -> TransportResult<()>;

    /// Leaves a channel.
    async fn part(&self, channel: &str) -> TransportResult<()>;
}

/// A shared transport client.
pub type BoxedTransportClient = Arc<dyn TransportClient>;
