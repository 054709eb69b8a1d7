//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while starting or running the bot.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The handler directory could not be loaded.
    #[error("Handler load error: {0}")]
    Load(#[from] vsim_framework::LoadError),

    /// A transport failed to connect.
    #[error("Transport error: {0}")]
    Transport(#[from] vsim_core::TransportError),

    /// Every enabled transport failed to start.
    #[error("No transport could be started")]
    NoTransport,

    /// The runtime was started twice.
    #[error("Runtime is already running")]
    AlreadyRunning,

    /// Installing a signal handler failed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
