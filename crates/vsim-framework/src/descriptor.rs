//! Handler descriptors and their manifest form.
//!
//! A [`HandlerDescriptor`] declares which event it answers, the
//! case-insensitive pattern a message body must match, an optional
//! [`condition`](DescriptorBuilder::condition) that can veto a match, and the
//! handler to invoke. Descriptors are validated once, when they are built:
//! patterns are compiled here so no regex error can surface during dispatch.
//!
//! On disk a descriptor is a TOML manifest ([`HandlerSource`]):
//!
//! ```toml
//! event = "message"
//! pattern = '([rnbqkp1-8]+/){7}[rnbqkp1-8]+ [bw] ...'
//! handler = "chess.add_fen"
//!
//! [condition]
//! unless = '(eval|evaluate|analyze|score)\s'
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use vsim_core::LifecycleEvent;

use crate::error::{LoadError, LoadResult};
use crate::handler::{HandlerCatalog, HandlerFn};

/// The event category a descriptor answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// The generic message category, matched by pattern.
    Message,
    /// A lifecycle event, fanned out without pattern matching.
    Lifecycle(LifecycleEvent),
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Lifecycle(event) => event.as_str(),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            // `message#` is the channel-message spelling older manifests use.
            "message" | "message#" => Ok(Self::Message),
            other => other
                .parse::<LifecycleEvent>()
                .map(Self::Lifecycle)
                .map_err(|_| LoadError::UnknownEvent(s.to_string())),
        }
    }
}

/// A secondary predicate over the message body.
pub type ConditionFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Where a descriptor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Registered programmatically.
    Builtin,
    /// Loaded from a manifest file.
    Manifest(PathBuf),
}

/// A validated, ready-to-dispatch handler.
pub struct HandlerDescriptor {
    name: String,
    event: EventName,
    pattern: Option<Regex>,
    condition: Option<ConditionFn>,
    channels: Vec<String>,
    handler: HandlerFn,
    origin: Origin,
}

impl HandlerDescriptor {
    /// Starts building a descriptor.
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event(&self) -> EventName {
        self.event
    }

    /// The compiled pattern, if any.
    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    /// The pattern source text, or `-` when there is none.
    pub fn pattern_str(&self) -> &str {
        self.pattern.as_ref().map(Regex::as_str).unwrap_or("-")
    }

    /// Whether a veto condition is attached.
    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Channels this descriptor is scoped to; empty means everywhere.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub(crate) fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    /// Whether this descriptor applies in `channel`.
    pub fn applies_in(&self, channel: &str) -> bool {
        self.channels.is_empty() || self.channels.iter().any(|c| c.eq_ignore_ascii_case(channel))
    }

    /// Evaluates the veto condition; passes when there is none.
    pub fn condition_passes(&self, body: &str) -> bool {
        self.condition.as_ref().is_none_or(|condition| condition(body))
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("event", &self.event)
            .field("pattern", &self.pattern_str())
            .field("condition", &self.condition.is_some())
            .field("channels", &self.channels)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Builder that validates a descriptor on [`build`](DescriptorBuilder::build).
pub struct DescriptorBuilder {
    name: String,
    event: Option<String>,
    pattern: Option<String>,
    condition: Option<ConditionFn>,
    channels: Vec<String>,
    handler: Option<HandlerFn>,
    origin: Origin,
}

impl DescriptorBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event: None,
            pattern: None,
            condition: None,
            channels: Vec::new(),
            handler: None,
            origin: Origin::Builtin,
        }
    }

    /// Sets the event name (`message` or a lifecycle name).
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Shorthand for `event("message")`.
    pub fn on_message(self) -> Self {
        self.event(EventName::Message.as_str())
    }

    /// Shorthand for a lifecycle event.
    pub fn on(self, event: LifecycleEvent) -> Self {
        self.event(event.as_str())
    }

    /// Sets the pattern; compiled case-insensitively.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Sets a veto predicate evaluated after a successful match.
    pub fn condition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(f));
        self
    }

    /// Scopes the descriptor to `channel` (may be called repeatedly).
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channels.push(channel.into());
        self
    }

    /// Sets the handler.
    pub fn handler(mut self, handler: HandlerFn) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Records where the descriptor came from.
    pub fn origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Validates and builds the descriptor.
    pub fn build(self) -> LoadResult<HandlerDescriptor> {
        let event: EventName = self
            .event
            .as_deref()
            .ok_or(LoadError::missing("event"))?
            .parse()?;

        let pattern = match (event, self.pattern) {
            (EventName::Message, None) => return Err(LoadError::missing("pattern")),
            (_, Some(source)) => Some(compile_pattern(&source)?),
            (EventName::Lifecycle(_), None) => None,
        };

        let handler = self.handler.ok_or(LoadError::missing("handler"))?;

        Ok(HandlerDescriptor {
            name: self.name,
            event,
            pattern,
            condition: self.condition,
            channels: self.channels,
            handler,
            origin: self.origin,
        })
    }
}

fn compile_pattern(source: &str) -> LoadResult<Regex> {
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .map_err(|e| LoadError::InvalidPattern {
            pattern: source.to_string(),
            reason: e.to_string(),
        })
}

/// The on-disk manifest of a handler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerSource {
    /// Descriptor name; defaults to the manifest's file stem.
    #[serde(default)]
    pub name: Option<String>,
    /// Event name.
    #[serde(default)]
    pub event: Option<String>,
    /// Body pattern.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Catalog action name.
    #[serde(default)]
    pub handler: Option<String>,
    /// Optional veto condition.
    #[serde(default)]
    pub condition: Option<ConditionSource>,
    /// Optional channel scope.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// The manifest form of a condition.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSource {
    /// The match is vetoed when this regex matches the body.
    pub unless: String,
}

impl HandlerSource {
    /// Validates the manifest and resolves its handler against `catalog`.
    ///
    /// Field checks run in order `event`, `pattern`, `handler`, so the
    /// reported error names the first missing piece.
    pub fn into_descriptor(
        self,
        fallback_name: &str,
        origin: Origin,
        catalog: &HandlerCatalog,
    ) -> LoadResult<HandlerDescriptor> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());

        let event = self.event.ok_or(LoadError::missing("event"))?;
        if event.parse::<EventName>()? == EventName::Message && self.pattern.is_none() {
            return Err(LoadError::missing("pattern"));
        }
        let action = self.handler.ok_or(LoadError::missing("handler"))?;
        let handler = catalog
            .get(&action)
            .ok_or_else(|| LoadError::UnknownAction(action.clone()))?;

        let mut builder = HandlerDescriptor::builder(name)
            .origin(origin)
            .event(event)
            .handler(handler);
        if let Some(pattern) = self.pattern {
            builder = builder.pattern(pattern);
        }
        for channel in self.channels {
            builder = builder.channel(channel);
        }
        if let Some(condition) = self.condition {
            let veto = Regex::new(&condition.unless).map_err(|e| LoadError::InvalidPattern {
                pattern: condition.unless.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.condition(move |body| !veto.is_match(body));
        }

        builder.build()
    }
}
