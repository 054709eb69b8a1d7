//! Common lifecycle handlers.
//!
//! Common handlers are a small, fixed table from lifecycle event to one
//! function, registered once per transport at startup and always active. They
//! are invoked by fan-out: a lifecycle event fires the matching common handler
//! of every transport that registered one, in transport-registration order.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use vsim_core::{LifecycleEvent, LifecycleSignal, Transport};

use crate::context::BotContext;
use crate::error::HandlerResult;

/// A common lifecycle handler.
pub type CommonHandlerFn = Arc<dyn Fn(&LifecycleSignal, &BotContext) -> HandlerResult + Send + Sync>;

/// Per-transport lifecycle handler tables, kept in registration order.
#[derive(Clone, Default)]
pub struct CommonHandlers {
    transports: Vec<(Transport, HashMap<LifecycleEvent, CommonHandlerFn>)>,
}

impl CommonHandlers {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard logging handlers for every transport in `transports`.
    pub fn standard(transports: &[Transport]) -> Self {
        let mut common = Self::new();
        for &transport in transports {
            common
                .register(transport, LifecycleEvent::Connect, on_connect)
                .register(transport, LifecycleEvent::Disconnect, on_disconnect)
                .register(transport, LifecycleEvent::Join, on_join)
                .register(transport, LifecycleEvent::Part, on_part)
                .register(transport, LifecycleEvent::Error, on_error);
        }
        common
    }

    /// Registers `f` as `transport`'s handler for `event`, replacing any
    /// previous one.
    pub fn register<F>(&mut self, transport: Transport, event: LifecycleEvent, f: F) -> &mut Self
    where
        F: Fn(&LifecycleSignal, &BotContext) -> HandlerResult + Send + Sync + 'static,
    {
        let handler: CommonHandlerFn = Arc::new(f);
        match self.transports.iter_mut().find(|(t, _)| *t == transport) {
            Some((_, table)) => {
                table.insert(event, handler);
            }
            None => {
                self.transports
                    .push((transport, HashMap::from([(event, handler)])));
            }
        }
        self
    }

    /// Handlers for `event`, one per transport that has one, in
    /// transport-registration order.
    pub fn handlers_for(&self, event: LifecycleEvent) -> Vec<(Transport, CommonHandlerFn)> {
        self.transports
            .iter()
            .filter_map(|(t, table)| table.get(&event).map(|h| (*t, Arc::clone(h))))
            .collect()
    }

    /// Transports with at least one handler, in registration order.
    pub fn transports(&self) -> impl Iterator<Item = Transport> + '_ {
        self.transports.iter().map(|(t, _)| *t)
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.transports.iter().map(|(_, table)| table.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CommonHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (transport, table) in &self.transports {
            let events: Vec<_> = LifecycleEvent::ALL
                .iter()
                .filter(|e| table.contains_key(e))
                .map(LifecycleEvent::as_str)
                .collect();
            map.entry(&transport.as_str(), &events);
        }
        map.finish()
    }
}

fn is_self(signal: &LifecycleSignal, ctx: &BotContext) -> bool {
    match (signal.nick(), ctx.identity(signal.transport())) {
        (Some(nick), Some(me)) => nick.eq_ignore_ascii_case(me),
        _ => false,
    }
}

fn on_connect(signal: &LifecycleSignal, _ctx: &BotContext) -> HandlerResult {
    info!(
        transport = %signal.transport(),
        server = signal.detail().unwrap_or("-"),
        "*** connecting"
    );
    Ok(())
}

fn on_disconnect(signal: &LifecycleSignal, _ctx: &BotContext) -> HandlerResult {
    info!(
        transport = %signal.transport(),
        reason = signal.detail().unwrap_or("-"),
        "*** disconnected"
    );
    Ok(())
}

fn on_join(signal: &LifecycleSignal, ctx: &BotContext) -> HandlerResult {
    if is_self(signal, ctx) {
        info!(transport = %signal.transport(), channel = signal.channel().unwrap_or("-"), "*** joined");
    }
    Ok(())
}

fn on_part(signal: &LifecycleSignal, ctx: &BotContext) -> HandlerResult {
    if is_self(signal, ctx) {
        info!(transport = %signal.transport(), channel = signal.channel().unwrap_or("-"), "*** parted");
    }
    Ok(())
}

fn on_error(signal: &LifecycleSignal, _ctx: &BotContext) -> HandlerResult {
    error!(
        transport = %signal.transport(),
        detail = signal.detail().unwrap_or("-"),
        "Transport error"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_set_covers_every_event_per_transport() {
        let common = CommonHandlers::standard(&Transport::ALL);
        assert_eq!(common.len(), 10);

        let joins = common.handlers_for(LifecycleEvent::Join);
        let order: Vec<_> = joins.iter().map(|(t, _)| *t).collect();
        assert_eq!(order, vec![Transport::Irc, Transport::Discord]);
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut common = CommonHandlers::new();
        common.register(Transport::Discord, LifecycleEvent::Connect, |_, _| Ok(()));
        common.register(Transport::Discord, LifecycleEvent::Connect, |_, _| Ok(()));
        common.register(Transport::Irc, LifecycleEvent::Error, |_, _| Ok(()));

        assert_eq!(common.len(), 2);
        assert_eq!(
            common.transports().collect::<Vec<_>>(),
            vec![Transport::Discord, Transport::Irc]
        );
        assert!(common.handlers_for(LifecycleEvent::Part).is_empty());
    }
}
