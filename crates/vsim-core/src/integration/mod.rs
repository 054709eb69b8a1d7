//! Integration layer - contracts for external collaborators.
//!
//! - Transport adapters (native event to canonical event)
//! - Transport clients (outbound send/join/part, native event listener)
//! - Channel-list persistence

pub mod adapter;
pub mod channels;
pub mod transport;

pub use adapter::TransportAdapter;
pub use channels::{BoxedChannelStore, ChannelStore, MemoryChannelStore};
pub use transport::{BoxedTransportClient, NativeCallback, TransportClient};
