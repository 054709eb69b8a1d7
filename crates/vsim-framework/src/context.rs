//! The explicit bot context handed to every handler.
//!
//! There are no module-level singletons: everything a handler may need
//! (the bot's identities, the control channel, handler settings, the outbound
//! queue, the channel-control queue and the task spawner) lives in a
//! [`BotContext`] that the runtime builds once and the dispatcher forwards to
//! each invocation.
//!
//! Handlers never perform I/O inline. Replies are queued on the outbox, and
//! longer work is started with [`BotContext::spawn_task`], which runs it under
//! a deadline and the runtime's cancellation token without the dispatcher
//! waiting for it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use vsim_core::Transport;

use crate::error::{HandlerError, HandlerResult};
use crate::meta::ControlCommand;

/// Default deadline for background tasks started by handlers.
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// A chat line queued for delivery by the runtime's outbound router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Transport that should deliver the message.
    pub transport: Transport,
    /// Channel or user to deliver to.
    pub target: String,
    /// Message text.
    pub text: String,
}

/// Sending half of the outbound queue.
pub type Outbox = mpsc::UnboundedSender<OutboundMessage>;

/// Static bot settings shared by all handlers.
#[derive(Debug, Clone)]
pub struct BotSettings {
    identities: HashMap<Transport, String>,
    control_channel: String,
    task_timeout: Duration,
    handler_settings: Map<String, Value>,
}

impl BotSettings {
    /// Creates settings with the given control channel and no identities.
    pub fn new(control_channel: impl Into<String>) -> Self {
        Self {
            identities: HashMap::new(),
            control_channel: control_channel.into(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
            handler_settings: Map::new(),
        }
    }

    /// Sets the bot's own identity on a transport.
    pub fn identity(mut self, transport: Transport, name: impl Into<String>) -> Self {
        self.identities.insert(transport, name.into());
        self
    }

    /// Sets the deadline for background tasks.
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Sets the free-form handler settings table.
    pub fn handler_settings(mut self, settings: Map<String, Value>) -> Self {
        self.handler_settings = settings;
        self
    }

    /// Returns the bot's identity on `transport`, if configured.
    pub fn identity_for(&self, transport: Transport) -> Option<&str> {
        self.identities.get(&transport).map(String::as_str)
    }

    /// Returns the channel meta-commands are accepted in.
    pub fn control_channel(&self) -> &str {
        &self.control_channel
    }

    /// Returns the background task deadline.
    pub fn timeout(&self) -> Duration {
        self.task_timeout
    }
}

#[derive(Clone)]
struct ContextInner {
    settings: BotSettings,
    outbox: Outbox,
    control: Option<mpsc::UnboundedSender<ControlCommand>>,
    cancel: CancellationToken,
}

/// The context forwarded to every handler invocation.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct BotContext {
    inner: Arc<ContextInner>,
}

impl BotContext {
    /// Creates a context with the given settings and outbound queue.
    pub fn new(settings: BotSettings, outbox: Outbox) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                settings,
                outbox,
                control: None,
                cancel: CancellationToken::new(),
            }),
        }
    }

    fn inner_mut(&mut self) -> &mut ContextInner {
        Arc::make_mut(&mut self.inner)
    }

    /// Attaches the channel-control queue used by the meta-command.
    pub fn with_control(mut self, control: mpsc::UnboundedSender<ControlCommand>) -> Self {
        self.inner_mut().control = Some(control);
        self
    }

    /// Uses `token` as the parent of every background task's token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.inner_mut().cancel = token;
        self
    }

    /// Returns the bot settings.
    pub fn settings(&self) -> &BotSettings {
        &self.inner.settings
    }

    /// Returns the bot's identity on `transport`, if configured.
    pub fn identity(&self, transport: Transport) -> Option<&str> {
        self.inner.settings.identity_for(transport)
    }

    /// Returns the runtime-wide cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Deserializes the handler setting stored under `key`.
    ///
    /// Returns `None` when the key is absent or has the wrong shape.
    pub fn handler_setting<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.inner.settings.handler_settings.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Ignoring malformed handler setting");
                None
            }
        }
    }

    /// Queues `text` for delivery to `target` on `transport`.
    pub fn say(
        &self,
        transport: Transport,
        target: impl Into<String>,
        text: impl Into<String>,
    ) -> HandlerResult {
        let message = OutboundMessage {
            transport,
            target: target.into(),
            text: text.into(),
        };
        trace!(transport = %message.transport, target = %message.target, "Queueing outbound message");
        self.inner
            .outbox
            .send(message)
            .map_err(|_| HandlerError::OutboxClosed)
    }

    /// Queues a channel-membership change for the channel-control worker.
    pub fn control(&self, command: ControlCommand) -> HandlerResult {
        let control = self
            .inner
            .control
            .as_ref()
            .ok_or(HandlerError::ControlUnavailable)?;
        control
            .send(command)
            .map_err(|_| HandlerError::ControlUnavailable)
    }

    /// Starts `task` in the background under the configured deadline.
    ///
    /// The dispatcher does not wait for the task. It is dropped when the
    /// deadline passes or the runtime is shutting down; failures are logged.
    pub fn spawn_task<F>(&self, name: impl Into<String>, task: F) -> Result<JoinHandle<()>, HandlerError>
    where
        F: Future<Output = HandlerResult> + Send + 'static,
    {
        let name = name.into();
        let handle = Handle::try_current().map_err(|_| HandlerError::NoRuntime(name.clone()))?;
        let deadline = self.inner.settings.task_timeout;
        let cancel = self.inner.cancel.child_token();

        debug!(task = %name, deadline = ?deadline, "Spawning handler task");

        Ok(handle.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(task = %name, "Handler task cancelled");
                }
                result = tokio::time::timeout(deadline, task) => match result {
                    Ok(Ok(())) => trace!(task = %name, "Handler task finished"),
                    Ok(Err(e)) => warn!(task = %name, error = %e, "Handler task failed"),
                    Err(_) => warn!(task = %name, deadline = ?deadline, "Handler task exceeded its deadline"),
                },
            }
        }))
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("settings", &self.inner.settings)
            .field("control", &self.inner.control.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn context() -> (BotContext, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut settings = Map::new();
        settings.insert("engine".into(), json!({ "depth": 12 }));
        let ctx = BotContext::new(
            BotSettings::new("#vsimbot")
                .identity(Transport::Irc, "vsimbot")
                .task_timeout(Duration::from_millis(50))
                .handler_settings(settings),
            tx,
        );
        (ctx, rx)
    }

    #[test]
    fn say_queues_outbound_message() {
        let (ctx, mut rx) = context();
        ctx.say(Transport::Irc, "#chess", "hi").unwrap();

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.target, "#chess");
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn say_fails_once_outbox_is_closed() {
        let (ctx, rx) = context();
        drop(rx);
        assert_eq!(ctx.say(Transport::Irc, "#chess", "hi"), Err(HandlerError::OutboxClosed));
    }

    #[test]
    fn control_requires_attached_queue() {
        let (ctx, _rx) = context();
        let cmd = ControlCommand::join("#test", Transport::Irc, "#vsimbot", "op");
        assert_eq!(ctx.control(cmd), Err(HandlerError::ControlUnavailable));
    }

    #[test]
    fn handler_settings_deserialize() {
        #[derive(serde::Deserialize)]
        struct Engine {
            depth: u32,
        }

        let (ctx, _rx) = context();
        let engine: Engine = ctx.handler_setting("engine").unwrap();
        assert_eq!(engine.depth, 12);
        assert!(ctx.handler_setting::<Engine>("missing").is_none());
        assert_eq!(ctx.identity(Transport::Irc), Some("vsimbot"));
        assert_eq!(ctx.identity(Transport::Discord), None);
    }

    #[test]
    fn spawn_task_outside_runtime_is_an_error() {
        let (ctx, _rx) = context();
        let err = ctx.spawn_task("orphan", async { Ok(()) }).unwrap_err();
        assert_eq!(err, HandlerError::NoRuntime("orphan".into()));
    }

    #[tokio::test]
    async fn spawn_task_drops_work_past_deadline() {
        let (ctx, _rx) = context();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let handle = ctx
            .spawn_task("slow", async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        handle.await.unwrap();
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawn_task_stops_on_cancellation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let ctx = BotContext::new(
            BotSettings::new("#vsimbot").task_timeout(Duration::from_secs(60)),
            tx,
        )
        .with_cancellation(token.clone());

        let handle = ctx
            .spawn_task("forever", std::future::pending::<HandlerResult>())
            .unwrap();
        token.cancel();

        handle.await.unwrap();
    }
}
