//! # vsim Framework
//!
//! Handler registry and dispatch for the vsim chat bot.
//!
//! This layer provides:
//! - Handler descriptors, validated from TOML manifests or built in code
//! - The handler catalog that manifests resolve action names against
//! - The ordered handler registry with its common lifecycle handlers
//! - The first-match-wins dispatcher with lifecycle fan-out
//! - The `join`/`part` meta-command and its channel-control worker
//!
//! Everything here works on the canonical event model from `vsim-core`;
//! nothing in this crate knows what an IRC line or a Discord payload is.

pub mod common;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod meta;
pub mod registry;

pub use common::{CommonHandlerFn, CommonHandlers};
pub use context::{BotContext, BotSettings, DEFAULT_TASK_TIMEOUT, OutboundMessage, Outbox};
pub use descriptor::{
    ConditionFn, ConditionSource, DescriptorBuilder, EventName, HandlerDescriptor, HandlerSource,
    Origin,
};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ControlError, HandlerError, HandlerResult, LoadError, LoadResult};
pub use handler::{
    ActionEntry, BUILTIN_ACTIONS, HandlerCall, HandlerCatalog, HandlerFn, MatchGroups, handler_fn,
};
pub use meta::{
    ChannelControl, ControlCommand, META_HANDLER_NAME, META_PATTERN, MembershipAction,
    meta_descriptor,
};
pub use registry::{HandlerRegistry, LoadReport, MANIFEST_EXTENSION, SharedRegistry, SkippedSource};

#[doc(hidden)]
pub use linkme;
