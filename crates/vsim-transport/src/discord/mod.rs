//! Discord transport: gateway for inbound events, REST for outbound messages.
//!
//! Bots do not join or leave guild channels by themselves, so
//! [`TransportClient::join`] and [`TransportClient::part`] report
//! [`TransportError::Unsupported`].

pub mod directory;
pub mod gateway;
pub mod rest;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vsim_core::{NativeCallback, Transport, TransportClient, TransportError, TransportResult};

pub use directory::ChannelDirectory;
pub use gateway::{DEFAULT_GATEWAY_URL, DEFAULT_INTENTS, DiscordEvent, GatewayConfig};
pub use rest::{DEFAULT_API_BASE, RestClient};

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordConfig {
    pub gateway: GatewayConfig,
    /// REST API base URL.
    pub api_base: String,
    /// REST request timeout.
    pub timeout: Duration,
}

impl DiscordConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            gateway: GatewayConfig::new(token),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A connected Discord client.
#[derive(Debug)]
pub struct DiscordClient {
    rest: RestClient,
    directory: Arc<ChannelDirectory>,
}

impl DiscordClient {
    /// Creates a client that sends through `rest` and resolves channel names
    /// through `directory`, without opening a gateway session.
    pub fn new(rest: RestClient, directory: Arc<ChannelDirectory>) -> Self {
        Self { rest, directory }
    }

    /// Opens a gateway session and returns the client.
    ///
    /// The directory is fed by the session before each dispatch reaches
    /// `callback`.
    pub async fn connect(
        config: DiscordConfig,
        directory: Arc<ChannelDirectory>,
        callback: NativeCallback<DiscordEvent>,
        cancel: CancellationToken,
    ) -> TransportResult<Arc<Self>> {
        let rest = RestClient::new(&config.api_base, &config.gateway.token, config.timeout)?;
        gateway::connect(config.gateway, Arc::clone(&directory), callback, cancel).await?;
        Ok(Arc::new(Self::new(rest, directory)))
    }

    pub fn directory(&self) -> &Arc<ChannelDirectory> {
        &self.directory
    }

    /// Resolves a send target to a channel id.
    ///
    /// Snowflake ids are used as given. A name resolves only when exactly one
    /// known channel carries it.
    pub fn resolve(&self, target: &str) -> TransportResult<String> {
        if self.directory.contains(target) || is_snowflake(target) {
            return Ok(target.to_string());
        }
        self.directory.id_of(target).ok_or_else(|| {
            TransportError::SendFailed(format!("unknown or ambiguous Discord channel '{target}'"))
        })
    }
}

fn is_snowflake(target: &str) -> bool {
    !target.is_empty() && target.bytes().all(|b| b.is_ascii_digit())
}

#[async_trait]
impl TransportClient for DiscordClient {
    fn transport(&self) -> Transport {
        Transport::Discord
    }

    async fn send(&self, target: &str, text: &str) -> TransportResult<()> {
        let channel_id = self.resolve(target)?;
        debug!(target, channel_id = %channel_id, "Sending Discord message");
        self.rest.create_message(&channel_id, text).await
    }

    async fn join(&self, _channel: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported {
            transport: "discord",
            operation: "join",
        })
    }

    async fn part(&self, _channel: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported {
            transport: "discord",
            operation: "part",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DiscordClient {
        let directory = Arc::new(ChannelDirectory::new());
        directory.insert("100", "general");
        let rest = RestClient::new(DEFAULT_API_BASE, "t", Duration::from_secs(1)).unwrap();
        DiscordClient::new(rest, directory)
    }

    #[test]
    fn resolve_by_name_or_id() {
        let client = client();
        assert_eq!(client.resolve("general").unwrap(), "100");
        assert_eq!(client.resolve("#general").unwrap(), "100");
        assert_eq!(client.resolve("555").unwrap(), "555");
        assert!(client.resolve("nowhere").is_err());
    }

    #[test]
    fn ids_resolve_to_themselves_across_guilds() {
        let client = client();
        client.directory().insert("200", "general");

        for _ in 0..50 {
            assert_eq!(client.resolve("200").unwrap(), "200");
            assert_eq!(client.resolve("100").unwrap(), "100");
        }
        assert!(client.resolve("general").is_err());
    }

    #[tokio::test]
    async fn membership_is_unsupported() {
        let client = client();
        assert!(matches!(
            client.join("#chess").await,
            Err(TransportError::Unsupported { operation: "join", .. })
        ));
        assert!(matches!(
            client.part("#chess").await,
            Err(TransportError::Unsupported { operation: "part", .. })
        ));
    }
}
