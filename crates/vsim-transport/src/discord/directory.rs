//! Channel id ↔ name cache.
//!
//! Message dispatches carry only a `channel_id`. The directory learns names
//! from `GUILD_CREATE` (the guild's full channel list) and from
//! `CHANNEL_CREATE` / `CHANNEL_UPDATE` / `CHANNEL_DELETE`.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde_json::Value;

/// Shared channel directory.
#[derive(Debug, Default)]
pub struct ChannelDirectory {
    names: RwLock<HashMap<String, String>>,
}

impl ChannelDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as `name`.
    pub fn insert(&self, id: impl Into<String>, name: impl Into<String>) {
        self.names.write().insert(id.into(), name.into());
    }

    /// Updates the cache from a gateway dispatch. Other kinds are ignored.
    pub fn absorb(&self, kind: &str, data: &Value) {
        match kind {
            "GUILD_CREATE" => {
                let channels = data.get("channels").and_then(Value::as_array);
                let mut names = self.names.write();
                for channel in channels.into_iter().flatten() {
                    if let Some((id, name)) = id_and_name(channel) {
                        names.insert(id, name);
                    }
                }
            }
            "CHANNEL_CREATE" | "CHANNEL_UPDATE" => {
                if let Some((id, name)) = id_and_name(data) {
                    self.insert(id, name);
                }
            }
            "CHANNEL_DELETE" => {
                if let Some(id) = data.get("id").and_then(Value::as_str) {
                    self.names.write().remove(id);
                }
            }
            _ => {}
        }
    }

    /// Name of channel `id`, if known.
    pub fn name_of(&self, id: &str) -> Option<String> {
        self.names.read().get(id).cloned()
    }

    /// Whether channel `id` is known.
    pub fn contains(&self, id: &str) -> bool {
        self.names.read().contains_key(id)
    }

    /// Id of the channel called `name` (a leading `#` is ignored).
    ///
    /// Names are only unique within a guild; a name shared by several known
    /// channels resolves to nothing.
    pub fn id_of(&self, name: &str) -> Option<String> {
        let name = name.strip_prefix('#').unwrap_or(name);
        let names = self.names.read();
        let mut matches = names
            .iter()
            .filter(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| id);
        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(id.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

fn id_and_name(channel: &Value) -> Option<(String, String)> {
    let id = channel.get("id")?.as_str()?;
    let name = channel.get("name")?.as_str()?;
    Some((id.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guild_create_fills_directory() {
        let directory = ChannelDirectory::new();
        directory.absorb(
            "GUILD_CREATE",
            &json!({
                "id": "g1",
                "channels": [
                    { "id": "100", "name": "general" },
                    { "id": "101", "name": "chess" },
                    { "id": "102" },
                ],
            }),
        );

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.name_of("101").as_deref(), Some("chess"));
        assert_eq!(directory.id_of("#Chess").as_deref(), Some("101"));
    }

    #[test]
    fn channel_events_update_and_remove() {
        let directory = ChannelDirectory::new();
        directory.absorb("CHANNEL_CREATE", &json!({ "id": "7", "name": "blitz" }));
        directory.absorb("CHANNEL_UPDATE", &json!({ "id": "7", "name": "bullet" }));
        assert_eq!(directory.name_of("7").as_deref(), Some("bullet"));

        directory.absorb("CHANNEL_DELETE", &json!({ "id": "7" }));
        directory.absorb("MESSAGE_CREATE", &json!({ "id": "8", "name": "ignored" }));
        assert!(directory.is_empty());
    }

    #[test]
    fn shared_names_across_guilds_do_not_resolve() {
        let directory = ChannelDirectory::new();
        directory.absorb("GUILD_CREATE", &json!({ "id": "g1", "channels": [{ "id": "100", "name": "general" }] }));
        directory.absorb("GUILD_CREATE", &json!({ "id": "g2", "channels": [{ "id": "200", "name": "general" }] }));

        assert_eq!(directory.id_of("general"), None);
        assert!(directory.contains("200"));
        assert_eq!(directory.name_of("200").as_deref(), Some("general"));
    }
}
