//! Event dispatcher for the vsim framework.
//!
//! The [`Dispatcher`] routes one [`InboundEvent`] at a time into the shared
//! [`HandlerRegistry`](crate::registry::HandlerRegistry).
//!
//! # Message events
//!
//! Descriptors are scanned in registry order. The first descriptor that
//!
//! 1. answers the `message` category,
//! 2. applies in the message's channel,
//! 3. has a pattern matching the body, and
//! 4. whose condition does not veto the match
//!
//! is invoked, and the scan stops. Zero or one handler fires per message.
//!
//! # Lifecycle events
//!
//! Lifecycle events fan out without short-circuiting: first to the common
//! handler of every transport that registered one for the event, in
//! transport-registration order, then to every registry descriptor subscribed
//! to the event.
//!
//! # Failure isolation
//!
//! Handler errors and panics are contained at the invocation boundary, logged
//! with the event, handler, pattern and sender, and reported in the
//! [`DispatchOutcome`]. They never prevent the next event from dispatching.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{Level, debug, error, span, trace};

use vsim_core::{CanonicalMessage, InboundEvent, LifecycleSignal};

use crate::context::BotContext;
use crate::descriptor::{EventName, HandlerDescriptor};
use crate::error::{HandlerError, HandlerResult};
use crate::handler::{HandlerCall, MatchGroups};
use crate::registry::SharedRegistry;

/// What a single dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A message handler ran and succeeded.
    Handled {
        handler: String,
    },
    /// A message handler ran and failed.
    Failed {
        handler: String,
        error: HandlerError,
    },
    /// No descriptor matched the message.
    Unmatched,
    /// A lifecycle fan-out ran.
    Lifecycle {
        /// Handlers invoked, common and registry alike.
        fired: usize,
        /// Handlers that failed, with their errors.
        failed: Vec<(String, HandlerError)>,
    },
}

impl DispatchOutcome {
    /// The message handler that ran, if any.
    pub fn handler(&self) -> Option<&str> {
        match self {
            Self::Handled { handler } | Self::Failed { handler, .. } => Some(handler),
            _ => None,
        }
    }
}

/// Routes inbound events into the handler registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
    ctx: BotContext,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry` that hands `ctx` to every handler.
    pub fn new(registry: SharedRegistry, ctx: BotContext) -> Self {
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn context(&self) -> &BotContext {
        &self.ctx
    }

    /// Dispatches one event to completion.
    pub fn dispatch(&self, event: &InboundEvent) -> DispatchOutcome {
        match event {
            InboundEvent::Message(message) => self.dispatch_message(message),
            InboundEvent::Lifecycle(signal) => self.dispatch_lifecycle(signal),
        }
    }

    /// Runs the first-match-wins scan for a message.
    pub fn dispatch_message(&self, message: &CanonicalMessage) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            event = "message",
            transport = %message.transport(),
            channel = %message.channel()
        );
        let _enter = span.enter();

        let descriptors = self.registry.read().snapshot();
        let body = message.body();

        for descriptor in &descriptors {
            if descriptor.event() != EventName::Message || !descriptor.applies_in(message.channel()) {
                continue;
            }
            let Some(pattern) = descriptor.pattern() else {
                continue;
            };
            let Some(captures) = pattern.captures(body) else {
                continue;
            };
            if !descriptor.condition_passes(body) {
                trace!(handler = descriptor.name(), "Match vetoed by condition");
                continue;
            }

            let groups = MatchGroups::from_captures(pattern, &captures);
            let call = HandlerCall {
                transport: message.transport(),
                sender: message.from(),
                channel: message.channel(),
                reply_to: message.reply_to(),
                body,
                raw: message.raw(),
                groups: &groups,
                ctx: &self.ctx,
            };

            debug!(handler = descriptor.name(), sender = message.from(), "Handler matched");
            return match invoke(descriptor, &call) {
                Ok(()) => DispatchOutcome::Handled {
                    handler: descriptor.name().to_string(),
                },
                Err(error) => DispatchOutcome::Failed {
                    handler: descriptor.name().to_string(),
                    error,
                },
            };
        }

        trace!("No handler matched");
        DispatchOutcome::Unmatched
    }

    /// Fans a lifecycle signal out to common and registry handlers.
    pub fn dispatch_lifecycle(&self, signal: &LifecycleSignal) -> DispatchOutcome {
        let event = signal.event();
        let span = span!(
            Level::DEBUG,
            "dispatch",
            event = event.as_str(),
            transport = %signal.transport()
        );
        let _enter = span.enter();

        let (common, descriptors) = {
            let registry = self.registry.read();
            (registry.common().handlers_for(event), registry.snapshot())
        };

        let mut fired = 0;
        let mut failed = Vec::new();

        for (transport, handler) in common {
            fired += 1;
            let name = format!("common.{transport}.{event}", event = event.as_str());
            let result = contain(|| handler(signal, &self.ctx));
            if let Err(e) = result {
                error!(
                    event = event.as_str(),
                    handler = %name,
                    pattern = "-",
                    sender = signal.nick().unwrap_or("-"),
                    error = %e,
                    "Common handler failed"
                );
                failed.push((name, e));
            }
        }

        let groups = MatchGroups::empty();
        let call = HandlerCall {
            transport: signal.transport(),
            sender: signal.nick().unwrap_or(""),
            channel: signal.channel().unwrap_or(""),
            reply_to: signal.channel().unwrap_or(""),
            body: signal.detail().unwrap_or(""),
            raw: signal.raw(),
            groups: &groups,
            ctx: &self.ctx,
        };

        for descriptor in descriptors
            .iter()
            .filter(|d| d.event() == EventName::Lifecycle(event))
            .filter(|d| signal.channel().is_none_or(|c| d.applies_in(c)))
        {
            fired += 1;
            if let Err(e) = invoke(descriptor, &call) {
                failed.push((descriptor.name().to_string(), e));
            }
        }

        debug!(fired, failed = failed.len(), "Lifecycle fan-out finished");
        DispatchOutcome::Lifecycle { fired, failed }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.registry.read().len())
            .finish()
    }
}

fn invoke(descriptor: &Arc<HandlerDescriptor>, call: &HandlerCall<'_>) -> HandlerResult {
    let handler = descriptor.handler();
    let result = contain(|| handler(call));
    if let Err(e) = &result {
        error!(
            event = %descriptor.event(),
            handler = descriptor.name(),
            pattern = descriptor.pattern_str(),
            sender = call.sender,
            error = %e,
            "Handler failed"
        );
    }
    result
}

fn contain(f: impl FnOnce() -> HandlerResult) -> HandlerResult {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use serde_json::Value;
    use tokio::sync::mpsc;
    use vsim_core::{LifecycleEvent, Transport};

    use crate::common::CommonHandlers;
    use crate::context::{BotSettings, OutboundMessage};
    use crate::handler::handler_fn;
    use crate::registry::HandlerRegistry;

    type Calls = Arc<Mutex<Vec<String>>>;

    fn recorder(calls: &Calls, tag: &'static str) -> crate::handler::HandlerFn {
        let calls = Arc::clone(calls);
        handler_fn(move |call: &HandlerCall<'_>| {
            calls.lock().unwrap().push(format!("{tag}:{}", call.groups.full()));
            Ok(())
        })
    }

    fn descriptor(name: &str, pattern: &str, handler: crate::handler::HandlerFn) -> HandlerDescriptor {
        HandlerDescriptor::builder(name)
            .on_message()
            .pattern(pattern)
            .handler(handler)
            .build()
            .unwrap()
    }

    fn dispatcher(registry: HandlerRegistry) -> (Dispatcher, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = BotContext::new(
            BotSettings::new("#vsimbot").identity(Transport::Irc, "vsimbot"),
            tx,
        );
        (Dispatcher::new(registry.into_shared(), ctx), rx)
    }

    fn msg(body: &str) -> InboundEvent {
        CanonicalMessage::new(Transport::Irc, "alice", "#chess", body, Value::Null).into()
    }

    #[test]
    fn first_match_wins() {
        let calls = Calls::default();
        let mut registry = HandlerRegistry::new();
        registry.register(descriptor("a", "e4", recorder(&calls, "a"))).unwrap();
        registry.register(descriptor("b", "E4", recorder(&calls, "b"))).unwrap();
        let (dispatcher, _rx) = dispatcher(registry);

        let outcome = dispatcher.dispatch(&msg("1. e4 e5"));

        assert_eq!(outcome.handler(), Some("a"));
        assert_eq!(*calls.lock().unwrap(), vec!["a:e4"]);
    }

    #[test]
    fn unmatched_message_fires_nothing() {
        let calls = Calls::default();
        let mut registry = HandlerRegistry::new();
        registry.register(descriptor("a", "^!fen", recorder(&calls, "a"))).unwrap();
        let (dispatcher, _rx) = dispatcher(registry);

        assert_eq!(dispatcher.dispatch(&msg("hello")), DispatchOutcome::Unmatched);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn vetoed_match_falls_through_to_next_descriptor() {
        let calls = Calls::default();
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerDescriptor::builder("fen")
                    .on_message()
                    .pattern(r"\d/\d")
                    .condition(|body| !body.contains("eval "))
                    .handler(recorder(&calls, "fen"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry.register(descriptor("eval", "^eval", recorder(&calls, "eval"))).unwrap();
        let (dispatcher, _rx) = dispatcher(registry);

        let outcome = dispatcher.dispatch(&msg("eval 8/8"));

        assert_eq!(outcome.handler(), Some("eval"));
        assert_eq!(*calls.lock().unwrap(), vec!["eval:eval"]);
    }

    #[test]
    fn channel_scoped_descriptor_is_skipped_elsewhere() {
        let calls = Calls::default();
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                HandlerDescriptor::builder("scoped")
                    .on_message()
                    .pattern(".")
                    .channel("#vsimbot")
                    .handler(recorder(&calls, "scoped"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let (dispatcher, _rx) = dispatcher(registry);

        assert_eq!(dispatcher.dispatch(&msg("anything")), DispatchOutcome::Unmatched);
    }

    #[test]
    fn failing_handler_does_not_stop_next_message() {
        let calls = Calls::default();
        let mut registry = HandlerRegistry::new();
        registry
            .register(descriptor(
                "boom",
                "^boom",
                handler_fn(|_call: &HandlerCall<'_>| panic!("kaboom")),
            ))
            .unwrap();
        registry
            .register(descriptor(
                "err",
                "^err",
                handler_fn(|_call: &HandlerCall<'_>| Err(HandlerError::failed("nope"))),
            ))
            .unwrap();
        registry.register(descriptor("ok", "^ok", recorder(&calls, "ok"))).unwrap();
        let (dispatcher, _rx) = dispatcher(registry);

        let panicked = dispatcher.dispatch(&msg("boom"));
        assert_eq!(
            panicked,
            DispatchOutcome::Failed {
                handler: "boom".into(),
                error: HandlerError::Panicked("kaboom".into()),
            }
        );
        assert!(matches!(dispatcher.dispatch(&msg("err")), DispatchOutcome::Failed { .. }));
        assert_eq!(dispatcher.dispatch(&msg("ok")).handler(), Some("ok"));
        assert_eq!(*calls.lock().unwrap(), vec!["ok:ok"]);
    }

    #[test]
    fn handler_reply_goes_to_outbox() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(descriptor(
                "ping",
                "^!ping$",
                handler_fn(|call: &HandlerCall<'_>| call.reply("pong")),
            ))
            .unwrap();
        let (dispatcher, mut rx) = dispatcher(registry);

        dispatcher.dispatch(&msg("!PING"));

        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.transport, Transport::Irc);
        assert_eq!(reply.target, "#chess");
        assert_eq!(reply.text, "pong");
    }

    #[test]
    fn lifecycle_fans_out_across_transports_in_registration_order() {
        let order = Calls::default();
        let mut common = CommonHandlers::new();
        for transport in [Transport::Discord, Transport::Irc] {
            let order = Arc::clone(&order);
            common.register(transport, LifecycleEvent::Join, move |_, _| {
                order.lock().unwrap().push(transport.to_string());
                Ok(())
            });
        }
        common.register(Transport::Irc, LifecycleEvent::Part, |_, _| {
            Err(HandlerError::failed("unreachable"))
        });

        let mut registry = HandlerRegistry::with_common(common);
        let greet = Arc::clone(&order);
        registry
            .register(
                HandlerDescriptor::builder("greet")
                    .on(LifecycleEvent::Join)
                    .handler(handler_fn(move |call: &HandlerCall<'_>| {
                        greet.lock().unwrap().push(format!("greet {}", call.sender));
                        Ok(())
                    }))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let (dispatcher, _rx) = dispatcher(registry);

        let signal = LifecycleSignal::new(Transport::Irc, LifecycleEvent::Join)
            .with_channel("#chess")
            .with_nick("bob");
        let outcome = dispatcher.dispatch(&signal.into());

        assert_eq!(outcome, DispatchOutcome::Lifecycle { fired: 3, failed: vec![] });
        assert_eq!(*order.lock().unwrap(), vec!["discord", "irc", "greet bob"]);
    }

    #[test]
    fn lifecycle_failure_does_not_short_circuit() {
        let count = Arc::new(Mutex::new(0));
        let mut common = CommonHandlers::new();
        common.register(Transport::Irc, LifecycleEvent::Error, |_, _| panic!("first"));
        let counter = Arc::clone(&count);
        common.register(Transport::Discord, LifecycleEvent::Error, move |_, _| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });
        let (dispatcher, _rx) = dispatcher(HandlerRegistry::with_common(common));

        let outcome =
            dispatcher.dispatch(&LifecycleSignal::new(Transport::Irc, LifecycleEvent::Error).into());

        let DispatchOutcome::Lifecycle { fired, failed } = outcome else {
            panic!("expected lifecycle outcome");
        };
        assert_eq!(fired, 2);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "common.irc.error");
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
