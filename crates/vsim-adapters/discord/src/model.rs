//! Discord gateway dispatch payloads the adapter reads.
//!
//! Only the fields the bot needs are modelled; unknown fields are ignored so
//! gateway additions never break parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vsim_core::{AdapterError, AdapterResult};

/// Message author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// `MESSAGE_CREATE` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreate {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    /// Empty unless the bot has the message-content intent.
    #[serde(default)]
    pub content: String,
}

/// `READY` data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    pub user: User,
    #[serde(default)]
    pub session_id: String,
}

/// Deserializes dispatch data of a known kind.
pub fn parse_dispatch<T: serde::de::DeserializeOwned>(kind: &str, data: &Value) -> AdapterResult<T> {
    T::deserialize(data).map_err(|e| AdapterError::parse(format!("{kind}: {e}")))
}
