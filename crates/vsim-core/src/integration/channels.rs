//! The channel-list persistence collaborator.
//!
//! The core reads the channel list to route meta-commands and writes it back
//! through [`ChannelStore::set_channels`] followed by
//! [`ChannelStore::persist`]. It never caches the list itself.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::foundation::error::PersistResult;

/// Read/write access to the persisted channel-membership list.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Returns the current channel list.
    fn channels(&self) -> Vec<String>;

    /// Replaces the channel list in memory.
    fn set_channels(&self, channels: Vec<String>);

    /// Writes the in-memory list to the backing store.
    async fn persist(&self) -> PersistResult<()>;
}

/// A shared channel store.
pub type BoxedChannelStore = Arc<dyn ChannelStore>;

/// A channel store that keeps the list in memory only.
///
/// `persist` always succeeds and counts how often it was called.
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    channels: Mutex<Vec<String>>,
    persisted: Mutex<usize>,
}

impl MemoryChannelStore {
    /// Creates a store seeded with `channels`.
    pub fn new(channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            channels: Mutex::new(channels.into_iter().map(Into::into).collect()),
            persisted: Mutex::new(0),
        }
    }

    /// Number of successful `persist` calls so far.
    pub fn persist_count(&self) -> usize {
        *self.persisted.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChannelStore for MemoryChannelStore {
    fn channels(&self) -> Vec<String> {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_channels(&self, channels: Vec<String>) {
        *self.channels.lock().unwrap_or_else(|e| e.into_inner()) = channels;
    }

    async fn persist(&self) -> PersistResult<()> {
        *self.persisted.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}
