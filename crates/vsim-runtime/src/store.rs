//! File-backed channel store.
//!
//! The channel list lives in memory and is written to a small JSON document
//! on [`persist`](ChannelStore::persist):
//!
//! ```json
//! { "channels": ["#vsimbot", "#chess"] }
//! ```
//!
//! Writes go to a sibling temporary file that is then renamed over the
//! target, so a crash never leaves a truncated document behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vsim_core::{ChannelStore, PersistResult};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChannelDocument {
    #[serde(default)]
    channels: Vec<String>,
}

/// A [`ChannelStore`] persisted to a JSON file.
#[derive(Debug)]
pub struct FileChannelStore {
    path: PathBuf,
    channels: RwLock<Vec<String>>,
}

impl FileChannelStore {
    /// Opens the store at `path`.
    ///
    /// A readable state file wins over `seed`. A missing or unreadable file
    /// falls back to `seed`. Either way `ensure` is put at the front when the
    /// list lacks it.
    pub fn open(path: impl Into<PathBuf>, seed: &[String], ensure: &str) -> Self {
        let path = path.into();
        let mut channels = match read_document(&path) {
            Some(doc) => {
                info!(path = %path.display(), count = doc.channels.len(), "Loaded channel list");
                doc.channels
            }
            None => {
                debug!(path = %path.display(), "Seeding channel list from configuration");
                seed.to_vec()
            }
        };
        if !channels.iter().any(|c| c.eq_ignore_ascii_case(ensure)) {
            channels.insert(0, ensure.to_string());
        }

        Self {
            path,
            channels: RwLock::new(channels),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_document(path: &Path) -> Option<ChannelDocument> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read channel list");
            return None;
        }
    };
    match serde_json::from_str(&text) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed channel list");
            None
        }
    }
}

#[async_trait]
impl ChannelStore for FileChannelStore {
    fn channels(&self) -> Vec<String> {
        self.channels.read().clone()
    }

    fn set_channels(&self, channels: Vec<String>) {
        *self.channels.write() = channels;
    }

    async fn persist(&self) -> PersistResult<()> {
        let doc = ChannelDocument {
            channels: self.channels(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), count = doc.channels.len(), "Channel list persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Vec<String> {
        vec!["#chess".to_string()]
    }

    #[test]
    fn missing_file_seeds_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileChannelStore::open(dir.path().join("channels.json"), &seed(), "#vsimbot");
        assert_eq!(store.channels(), vec!["#vsimbot", "#chess"]);
    }

    #[test]
    fn control_channel_is_not_duplicated() {
        let dir = tempfile::tempdir().unwrap();
        let seed = vec!["#VsimBot".to_string()];
        let store = FileChannelStore::open(dir.path().join("channels.json"), &seed, "#vsimbot");
        assert_eq!(store.channels(), vec!["#VsimBot"]);
    }

    #[tokio::test]
    async fn persisted_list_wins_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("channels.json");

        let store = FileChannelStore::open(&path, &seed(), "#vsimbot");
        store.set_channels(vec!["#vsimbot".into(), "#test".into()]);
        store.persist().await.unwrap();

        let reopened = FileChannelStore::open(&path, &seed(), "#vsimbot");
        assert_eq!(reopened.channels(), vec!["#vsimbot", "#test"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn persisted_list_without_control_channel_gets_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, r##"{ "channels": ["#chess"] }"##).unwrap();

        let store = FileChannelStore::open(&path, &[], "#vsimbot");
        assert_eq!(store.channels(), vec!["#vsimbot", "#chess"]);
    }

    #[test]
    fn malformed_file_falls_back_to_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileChannelStore::open(&path, &seed(), "#vsimbot");
        assert_eq!(store.channels(), vec!["#vsimbot", "#chess"]);
    }

    #[test]
    fn persist_into_missing_directory_fails_when_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();

        let store = FileChannelStore::open(blocker.join("channels.json"), &seed(), "#vsimbot");
        assert!(tokio_test::block_on(store.persist()).is_err());
    }
}
