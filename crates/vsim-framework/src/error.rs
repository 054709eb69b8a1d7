//! Error types for the vsim framework.

use thiserror::Error;
use vsim_core::{PersistError, TransportError};

/// A handler source could not be turned into a descriptor.
///
/// Load errors are never fatal for the load as a whole: the offending source
/// is skipped and reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// A required manifest field is absent.
    #[error("missing required field '{field}'")]
    MissingField {
        /// The missing field.
        field: &'static str,
    },

    /// The `event` field names no known event.
    #[error("unknown event name '{0}'")]
    UnknownEvent(String),

    /// The `handler` field names no action in the catalog.
    #[error("unknown handler action '{0}'")]
    UnknownAction(String),

    /// The pattern or condition regex does not compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending regex source.
        pattern: String,
        /// The compiler's message.
        reason: String,
    },

    /// A manifest or the manifest directory could not be read.
    #[error("failed to read '{path}': {reason}")]
    Read {
        /// The path that failed.
        path: String,
        /// The I/O error text.
        reason: String,
    },

    /// A manifest is not valid TOML for the expected shape.
    #[error("failed to parse '{path}': {reason}")]
    Parse {
        /// The manifest path.
        path: String,
        /// The parser's message.
        reason: String,
    },

    /// A descriptor with the same name is already registered.
    #[error("a handler named '{0}' is already registered")]
    Duplicate(String),
}

impl LoadError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self::MissingField { field }
    }
}

/// A handler failed while being invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The handler panicked; the panic was contained at the dispatch boundary.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The outbound queue has been closed (runtime shutting down).
    #[error("outbound queue closed")]
    OutboxClosed,

    /// No channel-control worker is attached to the context.
    #[error("channel control is not available")]
    ControlUnavailable,

    /// A background task was requested outside of an async runtime.
    #[error("no async runtime available to spawn '{0}'")]
    NoRuntime(String),
}

impl HandlerError {
    /// Creates a generic failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// A channel-membership change could not be completed.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Persisting the channel list failed; the membership change was not sent.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// The transport rejected the join/part.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The bot never leaves its control channel.
    #[error("refusing to leave the control channel {0}")]
    ControlChannel(String),
}

/// Result type returned by handlers.
pub type HandlerResult = Result<(), HandlerError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;
