//! # vsim Adapter for Discord
//!
//! Turns the Discord transport's gateway events into canonical vsim events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vsim_adapter_discord::DiscordAdapter;
//! use vsim_core::TransportAdapter;
//!
//! let adapter = DiscordAdapter::new("vsimbot", client.directory().clone());
//! if let Some(event) = adapter.adapt(native)? {
//!     dispatcher.dispatch(&event);
//! }
//! ```
//!
//! The full `MESSAGE_CREATE` data object is kept as the raw payload.

mod adapter;
pub mod model;

pub use adapter::DiscordAdapter;
pub use model::{MessageCreate, Ready, User};
