//! # vsim
//!
//! A chat bot for chess channels that speaks IRC and Discord through one
//! handler pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌──────────┐     ┌────────────┐     ┌──────────────────────┐
//! │ Transport │────▶│ Adapter  │────▶│ Dispatcher │────▶│ first matching       │──▶ outbox
//! │ IRC / DC  │     │ (native  │     │ (registry  │     │ handler, or every    │
//! └───────────┘     │ → event) │     │  order)    │     │ lifecycle subscriber │
//!                   └──────────┘     └────────────┘     └──────────────────────┘
//! ```
//!
//! - **Transports** hold the IRC and Discord connections
//! - **Adapters** turn native events into canonical messages and lifecycle signals
//! - **Handlers** are synchronous functions named by TOML manifests
//! - **Runtime** wires the pieces together and owns the channel list
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vsim::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = VsimRuntime::builder()
//!         .config_file("vsim.toml")
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The built-in actions in [`handlers`] are registered at link time; a
//! manifest such as
//!
//! ```toml
//! event = "message"
//! pattern = "^!ping\\b"
//! handler = "ping"
//! ```
//!
//! is all it takes to wire one up.

pub mod engine;
pub mod fen;
pub mod handlers;

pub use vsim_core as core;
pub use vsim_framework as framework;
pub use vsim_runtime as runtime;

use vsim_framework::HandlerCatalog;

/// The catalog of every action linked into this binary.
pub fn builtin_catalog() -> HandlerCatalog {
    HandlerCatalog::builtin()
}

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use vsim::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use vsim_runtime::{RuntimeBuilder, VsimConfig, VsimRuntime};

    // Handlers
    pub use vsim_framework::{
        ActionEntry, BUILTIN_ACTIONS, BotContext, HandlerCall, HandlerCatalog, HandlerError,
        HandlerResult, HandlerRegistry, LoadReport,
    };

    // Canonical model
    pub use vsim_core::{CanonicalMessage, InboundEvent, LifecycleEvent, Transport};

    pub use crate::builtin_catalog;
}
