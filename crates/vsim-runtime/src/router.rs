//! Outbound message routing.
//!
//! Handlers and the channel-control worker queue [`OutboundMessage`]s on the
//! shared outbox; the [`OutboundRouter`] drains it and hands each message to
//! the client of the transport it names.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use vsim_core::{BoxedTransportClient, Transport, TransportError, TransportResult};
use vsim_framework::OutboundMessage;

/// Maps transports to their connected clients.
#[derive(Default, Clone)]
pub struct OutboundRouter {
    clients: HashMap<Transport, BoxedTransportClient>,
}

impl OutboundRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client, replacing any earlier client for the same transport.
    pub fn insert(&mut self, client: BoxedTransportClient) -> &mut Self {
        self.clients.insert(client.transport(), client);
        self
    }

    pub fn client(&self, transport: Transport) -> Option<&BoxedTransportClient> {
        self.clients.get(&transport)
    }

    /// Transports with a connected client.
    pub fn transports(&self) -> Vec<Transport> {
        let mut transports: Vec<_> = self.clients.keys().copied().collect();
        transports.sort();
        transports
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Delivers one message.
    pub async fn deliver(&self, message: &OutboundMessage) -> TransportResult<()> {
        let client = self
            .clients
            .get(&message.transport)
            .ok_or(TransportError::NotAvailable {
                transport: message.transport.as_str(),
            })?;
        trace!(transport = %message.transport, target = %message.target, "Delivering message");
        client.send(&message.target, &message.text).await
    }

    /// Delivers queued messages in order until the outbox closes or `cancel`
    /// fires.
    pub async fn run(
        self,
        mut outbox: mpsc::UnboundedReceiver<OutboundMessage>,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = outbox.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            if let Err(e) = self.deliver(&message).await {
                warn!(
                    transport = %message.transport,
                    target = %message.target,
                    error = %e,
                    "Failed to deliver message"
                );
            }
        }
        debug!("Outbound router stopped");
    }
}

impl std::fmt::Debug for OutboundRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundRouter")
            .field("transports", &self.transports())
            .finish()
    }
}
