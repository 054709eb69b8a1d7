//! # vsim Adapter for IRC
//!
//! Turns the IRC transport's native events into canonical vsim events.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vsim_adapter_irc::IrcAdapter;
//! use vsim_core::TransportAdapter;
//!
//! let adapter = IrcAdapter::new("vsimbot").whisper_channel("#vsimbot");
//! if let Some(event) = adapter.adapt(native)? {
//!     dispatcher.dispatch(&event);
//! }
//! ```
//!
//! The parsed line is kept as the canonical event's raw payload:
//!
//! ```json
//! { "tags": { "display-name": "Alice" }, "prefix": "alice!alice@host",
//!   "command": "PRIVMSG", "params": ["#chess", "1. e4"] }
//! ```

mod adapter;
pub mod model;

pub use adapter::IrcAdapter;
pub use model::IrcMessage;
