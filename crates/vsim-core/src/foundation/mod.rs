//! Foundation layer - the canonical event model.
//!
//! This module contains the transport-independent building blocks:
//! - Canonical messages and the transport enum
//! - Lifecycle signals and the inbound event sum type
//! - Error types shared by every crate

pub mod error;
pub mod event;
pub mod message;

pub use error::{
    AdapterError, AdapterResult, PersistError, PersistResult, TransportError, TransportResult,
};
pub use event::{InboundEvent, LifecycleEvent, LifecycleSignal};
pub use message::{CanonicalMessage, Transport, UnknownTransport};
