//! # vsim Transport
//!
//! Network transports for the vsim chat bot.
//!
//! Each transport implements [`vsim_core::TransportClient`] for outbound
//! operations and reports everything it receives to a
//! [`vsim_core::NativeCallback`] as its own native event type. Turning native
//! events into canonical ones is the adapters' job.
//!
//! ## Features
//!
//! - `irc`: IRC line transport over TCP
//! - `discord`: Discord gateway (WebSocket) and REST sender
//! - `full`: both
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Adapter Layer      │  (IRC, Discord)
//! ├─────────────────────┤
//! │  vsim-core          │  (collaborator traits)
//! ├─────────────────────┤
//! │  vsim-transport     │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/WS)   │
//! └─────────────────────┘
//! ```

#[cfg(feature = "irc")]
pub mod irc;

#[cfg(feature = "discord")]
pub mod discord;

#[cfg(feature = "irc")]
pub use irc::{IrcClient, IrcConfig, IrcEvent};

#[cfg(feature = "discord")]
pub use discord::{ChannelDirectory, DiscordClient, DiscordConfig, DiscordEvent};
