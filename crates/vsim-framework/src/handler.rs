//! Handler functions, invocation arguments and the handler catalog.
//!
//! A handler is a synchronous function that receives a [`HandlerCall`]:
//! sender, channel, body, raw payload, the pattern's capture groups and the
//! [`BotContext`]. Handlers queue replies and start background work through
//! the context; they never block the dispatch loop.
//!
//! # Catalog
//!
//! Manifests name their handler by action name. The [`HandlerCatalog`] maps
//! those names to functions. Built-in actions are contributed at link time
//! through the [`BUILTIN_ACTIONS`] distributed slice:
//!
//! ```rust,ignore
//! use vsim_framework::{ActionEntry, BUILTIN_ACTIONS, HandlerCall, HandlerResult};
//!
//! #[vsim_framework::linkme::distributed_slice(BUILTIN_ACTIONS)]
//! #[linkme(crate = vsim_framework::linkme)]
//! static PING: ActionEntry = ActionEntry { name: "ping", handler: ping };
//!
//! fn ping(call: &HandlerCall<'_>) -> HandlerResult {
//!     call.reply("pong")
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use linkme::distributed_slice;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

use vsim_core::Transport;

use crate::context::BotContext;
use crate::error::HandlerResult;

/// A type-erased, shareable handler function.
pub type HandlerFn = Arc<dyn Fn(&HandlerCall<'_>) -> HandlerResult + Send + Sync>;

/// Wraps a closure into a [`HandlerFn`].
pub fn handler_fn<F>(f: F) -> HandlerFn
where
    F: Fn(&HandlerCall<'_>) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Capture groups of a successful pattern match.
///
/// Index 0 is the whole match. Lifecycle invocations get an empty set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchGroups {
    groups: Vec<Option<String>>,
    names: Vec<(String, usize)>,
}

impl MatchGroups {
    /// An empty group set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Copies the groups out of `captures` produced by `regex`.
    pub fn from_captures(regex: &Regex, captures: &Captures<'_>) -> Self {
        let groups = captures
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()))
            .collect();
        let names = regex
            .capture_names()
            .enumerate()
            .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
            .collect();
        Self { groups, names }
    }

    /// Returns group `index`, if it participated in the match.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// Returns the named group, if it participated in the match.
    pub fn name(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, i)| self.get(*i))
    }

    /// Returns the whole match, or an empty string for lifecycle calls.
    pub fn full(&self) -> &str {
        self.get(0).unwrap_or("")
    }

    /// Number of groups including the whole match.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether there are no groups at all.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// The arguments of a single handler invocation.
#[derive(Debug, Clone, Copy)]
pub struct HandlerCall<'a> {
    /// Transport the triggering event arrived on.
    pub transport: Transport,
    /// Sender identity.
    pub sender: &'a str,
    /// Channel the event concerns.
    pub channel: &'a str,
    /// Transport address of that channel; replies go here.
    pub reply_to: &'a str,
    /// Message body (lifecycle detail text for lifecycle calls).
    pub body: &'a str,
    /// Transport-native payload.
    pub raw: &'a Value,
    /// Capture groups of the pattern match.
    pub groups: &'a MatchGroups,
    /// The bot context.
    pub ctx: &'a BotContext,
}

impl HandlerCall<'_> {
    /// Replies in the channel the event came from.
    pub fn reply(&self, text: impl Into<String>) -> HandlerResult {
        self.ctx.say(self.transport, self.reply_to, text)
    }
}

/// A link-time registered handler action.
#[derive(Debug, Clone, Copy)]
pub struct ActionEntry {
    /// Name manifests refer to.
    pub name: &'static str,
    /// The handler function.
    pub handler: fn(&HandlerCall<'_>) -> HandlerResult,
}

/// Built-in handler actions contributed by any crate linked into the binary.
#[distributed_slice]
pub static BUILTIN_ACTIONS: [ActionEntry];

/// Name → handler table that manifests are resolved against.
#[derive(Clone, Default)]
pub struct HandlerCatalog {
    actions: BTreeMap<String, HandlerFn>,
}

impl HandlerCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding every link-time registered action.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for entry in BUILTIN_ACTIONS {
            let handler = entry.handler;
            if catalog.actions.contains_key(entry.name) {
                warn!(action = entry.name, "Duplicate built-in action, keeping the first");
                continue;
            }
            catalog.insert(entry.name, move |call: &HandlerCall<'_>| handler(call));
        }
        catalog
    }

    /// Adds or replaces an action.
    pub fn insert<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&HandlerCall<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), handler_fn(f));
        self
    }

    /// Looks up an action by name.
    pub fn get(&self, name: &str) -> Option<HandlerFn> {
        self.actions.get(name).cloned()
    }

    /// Names of all actions, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl std::fmt::Debug for HandlerCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}
