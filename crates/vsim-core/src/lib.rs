//! # vsim Core
//!
//! The transport-independent core of the vsim chat bot.
//!
//! ## Architecture Layers
//!
//! ### Foundation Layer
//!
//! - **Canonical messages**: [`CanonicalMessage`] and [`Transport`]
//! - **Lifecycle signals**: [`LifecycleSignal`], [`LifecycleEvent`]
//! - **Inbound events**: [`InboundEvent`], the only thing adapters emit
//!
//! ### Integration Layer
//!
//! - **Transport adapters**: [`TransportAdapter`], native event to
//!   [`InboundEvent`]
//! - **Transport clients**: [`TransportClient`] and the [`NativeCallback`]
//!   listener type
//! - **Channel persistence**: [`ChannelStore`]
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐     ┌─────────┐     ┌────────────┐     ┌─────────┐
//! │ Transport │────▶│ Adapter │────▶│ Dispatcher │────▶│ Handler │
//! │ IRC / DC  │     │         │     │            │     │         │
//! └───────────┘     └─────────┘     └────────────┘     └─────────┘
//! ```

pub mod foundation;
pub mod integration;

pub use foundation::{
    AdapterError, AdapterResult, CanonicalMessage, InboundEvent, LifecycleEvent,
    LifecycleSignal, PersistError, PersistResult, Transport, TransportError, TransportResult,
    UnknownTransport,
};

pub use integration::{
    BoxedChannelStore, BoxedTransportClient, ChannelStore, MemoryChannelStore, NativeCallback,
    TransportAdapter, TransportClient,
};
