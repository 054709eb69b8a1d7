//! vsim Runtime - orchestration layer for the vsim chat bot.
//!
//! This crate provides:
//! - Layered configuration (`config`)
//! - Logging setup (`logging`)
//! - The file-backed channel store (`store`)
//! - The outbound router (`router`)
//! - The runtime event loop (`VsimRuntime`)
//!
//! ```ignore
//! use vsim_runtime::VsimRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = VsimRuntime::builder().build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Connections are not retried: a transport that drops emits `disconnect`
//! and stays down. The runtime stops once every transport has closed.

pub mod config;
pub mod error;
pub mod logging;
pub mod router;
pub mod runtime;
pub mod store;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, VsimConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use router::OutboundRouter;
pub use runtime::{
    Adapters, NativeEvent, RuntimeBuilder, VsimRuntime, build_registry, enabled_transports,
    event_loop,
};
pub use store::FileChannelStore;

// Re-export tracing for use by other crates
pub use tracing;

/// Common logging macros.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
