//! Discord REST sender.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Request};
use serde_json::json;
use tracing::trace;

use vsim_core::{TransportError, TransportResult};

/// Default REST API base.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Discord rejects longer message contents.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Posts messages through the REST API.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    api_base: String,
    token: String,
}

impl RestClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> TransportResult<Self> {
        let http = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Builds the create-message request without sending it.
    pub fn create_message_request(&self, channel_id: &str, content: &str) -> TransportResult<Request> {
        let content: String = content.chars().take(MAX_MESSAGE_LEN).collect();
        self.http
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": content }))
            .build()
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Posts `content` to `channel_id`.
    pub async fn create_message(&self, channel_id: &str, content: &str) -> TransportResult<()> {
        let request = self.create_message_request(channel_id, content)?;
        trace!(channel_id, "Discord POST message");

        let resp = self
            .http
            .execute(request)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::SendFailed(format!(
                "HTTP {} error: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(())
    }
}
