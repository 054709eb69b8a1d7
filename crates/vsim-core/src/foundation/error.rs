//! Unified error types for the vsim core.
//!
//! Framework-level errors (load and handler errors) are defined in
//! vsim-framework; configuration errors live in vsim-runtime.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The address that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The transport cannot perform this operation.
    #[error("transport '{transport}' does not support {operation}")]
    Unsupported {
        /// The transport name.
        transport: &'static str,
        /// The unsupported operation.
        operation: &'static str,
    },

    /// Transport not available.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport type that's not available.
        transport: &'static str,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors that can occur while adapting native events.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Event parsing failed.
    #[error("failed to parse event: {reason}")]
    ParseError {
        /// Reason for failure.
        reason: String,
    },
}

impl AdapterError {
    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError { reason: msg.into() }
    }
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors raised by the channel-list persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Writing the backing store failed.
    #[error("failed to write channel store: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding the channel list failed.
    #[error("failed to encode channel store: {0}")]
    Encode(#[from] serde_json::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;
