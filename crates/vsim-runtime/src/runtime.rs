//! Main runtime orchestration.
//!
//! [`VsimRuntime`] owns the handler registry and the channel store, connects
//! the enabled transports and runs the single event loop:
//!
//! ```text
//!  IRC ──callback──┐
//!                  ├──► native queue ──► adapt ──► Dispatcher ──► handlers
//!  Discord ─callback┘                                               │
//!                                                                   ▼
//!  transports ◄── OutboundRouter ◄── outbox ◄── ChannelControl ◄── control queue
//! ```
//!
//! Transport callbacks only enqueue. Every event is adapted and dispatched to
//! completion before the next one is taken off the queue, so events from one
//! transport are handled in arrival order.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use vsim_runtime::VsimRuntime;
//!
//! let runtime = VsimRuntime::builder()
//!     .config_file("vsim.toml")
//!     .build()?;
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vsim_adapter_discord::DiscordAdapter;
use vsim_adapter_irc::IrcAdapter;
use vsim_core::{
    AdapterResult, BoxedChannelStore, BoxedTransportClient, ChannelStore, InboundEvent,
    NativeCallback, Transport, TransportAdapter,
};
use vsim_framework::{
    BotContext, BotSettings, ChannelControl, CommonHandlers, DispatchOutcome, Dispatcher,
    HandlerCatalog, HandlerRegistry, LoadReport, SharedRegistry, meta_descriptor,
};
use vsim_transport::discord::GatewayConfig;
use vsim_transport::{
    ChannelDirectory, DiscordClient, DiscordConfig, DiscordEvent, IrcClient, IrcConfig, IrcEvent,
};

use crate::config::{ConfigLoader, ConfigResult, VsimConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::router::OutboundRouter;
use crate::store::FileChannelStore;

/// A native event from any transport.
#[derive(Debug, Clone)]
pub enum NativeEvent {
    Irc(IrcEvent),
    Discord(DiscordEvent),
}

/// The adapters of the enabled transports.
#[derive(Debug, Clone, Default)]
pub struct Adapters {
    pub irc: Option<IrcAdapter>,
    pub discord: Option<DiscordAdapter>,
}

impl Adapters {
    /// Adapts one native event. Events of a transport without an adapter are
    /// dropped.
    pub fn adapt(&self, native: NativeEvent) -> AdapterResult<Option<InboundEvent>> {
        match native {
            NativeEvent::Irc(event) => match &self.irc {
                Some(adapter) => adapter.adapt(event),
                None => Ok(None),
            },
            NativeEvent::Discord(event) => match &self.discord {
                Some(adapter) => adapter.adapt(event),
                None => Ok(None),
            },
        }
    }
}

/// Adapts and dispatches native events until every sender is gone.
pub async fn event_loop(
    mut events: mpsc::UnboundedReceiver<NativeEvent>,
    adapters: Adapters,
    dispatcher: Dispatcher,
) {
    while let Some(native) = events.recv().await {
        process(&adapters, &dispatcher, native);
    }
    info!("All transports closed");
}

/// Adapts and dispatches one native event.
fn process(adapters: &Adapters, dispatcher: &Dispatcher, native: NativeEvent) {
    let event = match adapters.adapt(native) {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "Failed to adapt native event");
            return;
        }
    };

    match dispatcher.dispatch(&event) {
        DispatchOutcome::Handled { handler } => {
            debug!(event = event.event_name(), handler = %handler, "Event handled");
        }
        DispatchOutcome::Failed { handler, error } => {
            debug!(event = event.event_name(), handler = %handler, error = %error, "Handler failed");
        }
        DispatchOutcome::Unmatched => {}
        DispatchOutcome::Lifecycle { fired, failed } => {
            debug!(
                event = event.event_name(),
                transport = %event.transport(),
                fired,
                failed = failed.len(),
                "Lifecycle event dispatched"
            );
        }
    }
}

/// Builds the registry: common handlers for `transports`, the meta-command,
/// then every manifest in `dir`.
///
/// A missing manifest directory leaves only the meta-command registered.
pub fn build_registry(
    control_channel: &str,
    transports: &[Transport],
    dir: &Path,
    catalog: &HandlerCatalog,
) -> RuntimeResult<(HandlerRegistry, LoadReport)> {
    let mut registry = HandlerRegistry::with_common(CommonHandlers::standard(transports));
    registry.register(meta_descriptor(control_channel)?)?;

    let report = if dir.is_dir() {
        registry.load(dir, catalog)?
    } else {
        warn!(dir = %dir.display(), "Handler directory not found, only the meta-command is active");
        LoadReport::default()
    };
    Ok((registry, report))
}

/// The vsim runtime.
pub struct VsimRuntime {
    config: VsimConfig,
    catalog: HandlerCatalog,
    registry: SharedRegistry,
    report: LoadReport,
    store: Arc<FileChannelStore>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl VsimRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from a loaded configuration.
    ///
    /// Loads the handler manifests and opens the channel store; no
    /// connection is made until [`run`](Self::run).
    pub fn from_config(config: VsimConfig, catalog: HandlerCatalog) -> RuntimeResult<Self> {
        let control_channel = config.bot.control_channel();
        let (registry, report) = build_registry(
            &control_channel,
            &enabled_transports(&config),
            &config.bot.handlers_dir,
            &catalog,
        )?;

        let store = FileChannelStore::open(
            &config.bot.state_file,
            &config.irc.channels,
            &control_channel,
        );

        info!(
            user_name = %config.bot.user_name,
            control_channel = %control_channel,
            handlers = registry.len(),
            actions = catalog.len(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            catalog,
            registry: registry.into_shared(),
            report,
            store: Arc::new(store),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &VsimConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &HandlerCatalog {
        &self.catalog
    }

    /// The report of the initial manifest load.
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    pub fn store(&self) -> &Arc<FileChannelStore> {
        &self.store
    }

    /// Token cancelled at shutdown; background handler tasks derive from it.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether `run` is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Reloads the handler manifests, keeping the meta-command and other
    /// programmatic registrations.
    pub fn reload_handlers(&self) -> RuntimeResult<LoadReport> {
        let report = self
            .registry
            .write()
            .reload(&self.config.bot.handlers_dir, &self.catalog)?;
        Ok(report)
    }

    /// The settings handed to every handler.
    pub fn settings(&self) -> BotSettings {
        let bot = &self.config.bot;
        let discord_name = self
            .config
            .discord
            .user_name
            .clone()
            .unwrap_or_else(|| bot.user_name.clone());

        BotSettings::new(bot.control_channel())
            .identity(Transport::Irc, &bot.user_name)
            .identity(Transport::Discord, discord_name)
            .task_timeout(bot.task_timeout())
            .handler_settings(self.config.handlers.clone())
    }

    /// The adapters for the enabled transports.
    pub fn adapters(&self, directory: &Arc<ChannelDirectory>) -> Adapters {
        let bot = &self.config.bot;
        let identity = |transport| {
            self.settings()
                .identity_for(transport)
                .unwrap_or(&bot.user_name)
                .to_string()
        };

        Adapters {
            irc: self.config.irc.enabled.then(|| {
                IrcAdapter::new(identity(Transport::Irc)).whisper_channel(bot.whisper_channel())
            }),
            discord: self
                .config
                .discord
                .enabled
                .then(|| DiscordAdapter::new(identity(Transport::Discord), Arc::clone(directory))),
        }
    }

    fn irc_config(&self) -> IrcConfig {
        let irc = &self.config.irc;
        let mut config = IrcConfig::new(&irc.server, &self.config.bot.user_name);
        config.port = irc.port;
        config.password.clone_from(&irc.password);
        config.capabilities.clone_from(&irc.capabilities);
        config.channels = self.store.channels();
        config
    }

    fn discord_config(&self) -> DiscordConfig {
        let discord = &self.config.discord;
        let mut gateway = GatewayConfig::new(discord.token.clone().unwrap_or_default());
        gateway.url.clone_from(&discord.gateway_url);
        gateway.intents = discord.intents;

        let mut config = DiscordConfig::new(gateway.token.clone());
        config.gateway = gateway;
        config.api_base.clone_from(&discord.api_base);
        config.timeout = std::time::Duration::from_secs(discord.timeout_secs);
        config
    }

    /// Runs until Ctrl+C or SIGTERM, reloading handlers on SIGHUP.
    pub async fn run(&self) -> RuntimeResult<()> {
        let shutdown = shutdown_signal()?;
        let reload = self.reload_signal()?;

        tokio::select! {
            result = self.run_until(shutdown) => result,
            () = reload => Ok(()),
        }
    }

    /// Installs the SIGHUP handler and returns a future that reloads the
    /// handlers on every hangup and never completes.
    fn reload_signal(&self) -> std::io::Result<impl Future<Output = ()> + '_> {
        #[cfg(unix)]
        let mut hangup = signal::unix::signal(signal::unix::SignalKind::hangup())?;

        Ok(async move {
            #[cfg(unix)]
            while hangup.recv().await.is_some() {
                info!("Received SIGHUP, reloading handlers");
                if let Err(e) = self.reload_handlers() {
                    error!(error = %e, "Handler reload failed, keeping the current set");
                }
            }
            std::future::pending::<()>().await
        })
    }

    /// Connects the transports and runs until `shutdown` completes or every
    /// transport has closed.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Runtime is already running");
            return Err(RuntimeError::AlreadyRunning);
        }

        info!("Starting vsim runtime");

        let (native_tx, mut native_rx) = mpsc::unbounded_channel();
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let directory = Arc::new(ChannelDirectory::new());
        let adapters = self.adapters(&directory);
        let mut router = OutboundRouter::new();

        if self.config.irc.enabled {
            let tx = native_tx.clone();
            let callback: NativeCallback<IrcEvent> = Arc::new(move |event| {
                let _ = tx.send(NativeEvent::Irc(event));
            });
            match IrcClient::connect(self.irc_config(), callback, self.cancel.child_token()).await {
                Ok(client) => {
                    router.insert(client);
                }
                Err(e) => {
                    error!(server = %self.config.irc.server, error = %e, "Failed to start IRC transport");
                    let _ = native_tx.send(NativeEvent::Irc(IrcEvent::Error(e.to_string())));
                }
            }
        }

        if self.config.discord.enabled {
            let tx = native_tx.clone();
            let callback: NativeCallback<DiscordEvent> = Arc::new(move |event| {
                let _ = tx.send(NativeEvent::Discord(event));
            });
            match DiscordClient::connect(
                self.discord_config(),
                Arc::clone(&directory),
                callback,
                self.cancel.child_token(),
            )
            .await
            {
                Ok(client) => {
                    router.insert(client);
                }
                Err(e) => {
                    error!(error = %e, "Failed to start Discord transport");
                    let _ = native_tx.send(NativeEvent::Discord(DiscordEvent::Error(e.to_string())));
                }
            }
        }
        // The queue closes once every transport has dropped its callback.
        drop(native_tx);

        let Some(membership) = membership_client(&router) else {
            // Nothing will drain the queue now, so the connect failures are
            // dispatched here before giving up.
            let dispatcher = Dispatcher::new(
                Arc::clone(&self.registry),
                BotContext::new(self.settings(), outbox),
            );
            while let Ok(native) = native_rx.try_recv() {
                process(&adapters, &dispatcher, native);
            }
            self.cancel.cancel();
            self.running.store(false, Ordering::SeqCst);
            return Err(RuntimeError::NoTransport);
        };

        let store: BoxedChannelStore = self.store.clone();
        let control = ChannelControl::new(store, membership, outbox.clone())
            .with_control_channel(self.config.bot.control_channel());
        let control_task = tokio::spawn(control.run(control_rx, self.cancel.clone()));
        let router_task = tokio::spawn(router.run(outbox_rx, self.cancel.clone()));

        let ctx = BotContext::new(self.settings(), outbox)
            .with_control(control_tx)
            .with_cancellation(self.cancel.clone());
        let dispatcher = Dispatcher::new(Arc::clone(&self.registry), ctx);

        info!("vsim runtime is now running");
        tokio::select! {
            _ = shutdown => info!("Shutdown requested"),
            _ = event_loop(native_rx, adapters, dispatcher) => {}
        }

        info!("Stopping vsim runtime");
        self.cancel.cancel();
        for task in [control_task, router_task] {
            if let Err(e) = task.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Runtime stopped");

        Ok(())
    }
}

impl std::fmt::Debug for VsimRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsimRuntime")
            .field("user_name", &self.config.bot.user_name)
            .field("handlers", &self.registry.read().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Transports enabled in `config`, IRC first.
pub fn enabled_transports(config: &VsimConfig) -> Vec<Transport> {
    let mut transports = Vec::new();
    if config.irc.enabled {
        transports.push(Transport::Irc);
    }
    if config.discord.enabled {
        transports.push(Transport::Discord);
    }
    transports
}

/// The client join/part requests go through: IRC when connected, since the
/// Discord client has no channel membership to change.
fn membership_client(router: &OutboundRouter) -> Option<BoxedTransportClient> {
    router
        .client(Transport::Irc)
        .or_else(|| router.client(Transport::Discord))
        .cloned()
}

/// Installs the shutdown signal handlers and returns a future that completes
/// on the first signal.
fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Received Ctrl+C, shutting down");
        }
    })
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`VsimRuntime`] with layered configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    catalog: Option<HandlerCatalog>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Searches the working directory and the user config directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir().with_user_config_dir(),
            catalog: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides the handler manifest directory.
    pub fn handlers_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_loader = self.config_loader.set("bot.handlers_dir", dir.into());
        self
    }

    /// Overrides the log level.
    pub fn log_level(mut self, level: crate::config::LogLevel) -> Self {
        self.config_loader = self.config_loader.set("logging.level", level);
        self
    }

    /// Overrides a single configuration key.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Uses `catalog` instead of the link-time built-in actions.
    pub fn catalog(mut self, catalog: HandlerCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads the configuration only.
    pub fn load_config(self) -> ConfigResult<VsimConfig> {
        self.config_loader.load()
    }

    /// Loads the configuration, initializes logging and builds the runtime.
    pub fn build(self) -> RuntimeResult<VsimRuntime> {
        let config = self.config_loader.load()?;
        if self.init_logging {
            logging::init_from_config(&config.logging, config.bot.theme.ansi());
        }
        let catalog = self.catalog.unwrap_or_else(HandlerCatalog::builtin);
        VsimRuntime::from_config(config, catalog)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use vsim_framework::{HandlerCall, META_HANDLER_NAME, OutboundMessage};

    fn catalog() -> HandlerCatalog {
        let mut catalog = HandlerCatalog::new();
        catalog.insert("test.pong", |call: &HandlerCall<'_>| call.reply("pong"));
        catalog
    }

    fn config_in(dir: &Path) -> VsimConfig {
        let mut config = VsimConfig::default();
        config.bot.handlers_dir = dir.join("handlers");
        config.bot.state_file = dir.join("channels.json");
        config.irc.channels = vec!["#chess".into()];
        config
    }

    fn write_manifest(dir: &Path, file: &str, text: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(file), text).unwrap();
    }

    #[test]
    fn meta_command_is_registered_before_manifests() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        write_manifest(
            &config.bot.handlers_dir,
            "ping.toml",
            "event = \"message\"\npattern = \"^!ping\"\nhandler = \"test.pong\"\n",
        );
        write_manifest(&config.bot.handlers_dir, "broken.toml", "event = \"message\"\n");

        let runtime = VsimRuntime::from_config(config, catalog()).unwrap();
        let registry = runtime.registry().read();

        assert_eq!(registry.names(), vec![META_HANDLER_NAME, "ping"]);
        assert_eq!(runtime.load_report().loaded, vec!["ping"]);
        assert_eq!(runtime.load_report().skipped.len(), 1);
        assert_eq!(registry.common().transports().collect::<Vec<_>>(), vec![Transport::Irc]);
    }

    #[test]
    fn missing_handler_dir_is_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let runtime = VsimRuntime::from_config(config_in(tmp.path()), catalog()).unwrap();
        assert_eq!(runtime.registry().read().len(), 1);
        assert_eq!(runtime.store().channels(), vec!["#vsimbot", "#chess"]);
    }

    #[test]
    fn reload_keeps_meta_command() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_in(tmp.path());
        let dir = config.bot.handlers_dir.clone();
        write_manifest(&dir, "a.toml", "event = \"message\"\npattern = \"^!a\"\nhandler = \"test.pong\"\n");
        let runtime = VsimRuntime::from_config(config, catalog()).unwrap();

        std::fs::remove_file(dir.join("a.toml")).unwrap();
        write_manifest(&dir, "b.toml", "event = \"message\"\npattern = \"^!b\"\nhandler = \"test.pong\"\n");
        let report = runtime.reload_handlers().unwrap();

        assert_eq!(report.loaded, vec!["b"]);
        assert_eq!(runtime.registry().read().names(), vec![META_HANDLER_NAME, "b"]);
    }

    #[test]
    fn settings_carry_identities_and_handler_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.discord.user_name = Some("VsimBot#0001".into());
        config.handlers.insert("engine".into(), serde_json::json!({ "depth": 10 }));
        let runtime = VsimRuntime::from_config(config, catalog()).unwrap();

        let settings = runtime.settings();
        assert_eq!(settings.identity_for(Transport::Irc), Some("vsimbot"));
        assert_eq!(settings.identity_for(Transport::Discord), Some("VsimBot#0001"));
        assert_eq!(settings.control_channel(), "#vsimbot");
        assert_eq!(settings.timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn event_loop_adapts_and_dispatches_in_order() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                vsim_framework::HandlerDescriptor::builder("ping")
                    .on_message()
                    .pattern("^!ping")
                    .handler(vsim_framework::handler_fn(|call: &HandlerCall<'_>| {
                        call.reply(format!("pong {}", call.sender))
                    }))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let dispatcher = Dispatcher::new(
            registry.into_shared(),
            BotContext::new(BotSettings::new("#vsimbot"), outbox),
        );
        let adapters = Adapters {
            irc: Some(IrcAdapter::new("vsimbot")),
            discord: None,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        for line in [
            ":alice!a@h PRIVMSG #chess :!ping",
            ":vsimbot!v@h PRIVMSG #chess :!ping",
            "garbage-without-params-is-still-a-command",
            ":bob!b@h PRIVMSG #chess :!ping",
        ] {
            tx.send(NativeEvent::Irc(IrcEvent::Line(line.into()))).unwrap();
        }
        tx.send(NativeEvent::Discord(DiscordEvent::Error("ignored".into())))
            .unwrap();
        drop(tx);

        event_loop(rx, adapters, dispatcher).await;

        let replies: Vec<_> = std::iter::from_fn(|| outbox_rx.try_recv().ok())
            .map(|m| m.text)
            .collect();
        assert_eq!(replies, vec!["pong alice", "pong bob"]);
    }

    #[tokio::test]
    async fn discord_replies_go_back_to_the_originating_channel() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(
                vsim_framework::HandlerDescriptor::builder("ping")
                    .on_message()
                    .pattern("^!ping")
                    .handler(vsim_framework::handler_fn(|call: &HandlerCall<'_>| call.reply("pong")))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let (outbox, mut outbox_rx) = mpsc::unbounded_channel::<OutboundMessage>();
        let dispatcher = Dispatcher::new(
            registry.into_shared(),
            BotContext::new(BotSettings::new("#vsimbot"), outbox),
        );

        let directory = Arc::new(ChannelDirectory::new());
        for (guild, id) in [("g1", "100"), ("g2", "200")] {
            directory.absorb(
                "GUILD_CREATE",
                &serde_json::json!({ "id": guild, "channels": [{ "id": id, "name": "general" }] }),
            );
        }
        let adapters = Adapters {
            irc: None,
            discord: Some(DiscordAdapter::new("vsimbot", directory)),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        for id in ["200", "100", "200"] {
            tx.send(NativeEvent::Discord(DiscordEvent::Dispatch {
                kind: "MESSAGE_CREATE".into(),
                data: serde_json::json!({
                    "id": "1",
                    "channel_id": id,
                    "author": { "id": "42", "username": "alice" },
                    "content": "!ping",
                }),
            }))
            .unwrap();
        }
        drop(tx);

        event_loop(rx, adapters, dispatcher).await;

        let targets: Vec<_> = std::iter::from_fn(|| outbox_rx.try_recv().ok())
            .map(|m| (m.transport, m.target))
            .collect();
        assert_eq!(
            targets,
            vec![
                (Transport::Discord, "200".to_string()),
                (Transport::Discord, "100".to_string()),
                (Transport::Discord, "200".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn join_command_persists_joins_and_confirms_over_irc() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.irc.server = "127.0.0.1".into();
        config.irc.port = port;
        config.irc.capabilities.clear();
        let state_file = config.bot.state_file.clone();
        let runtime = VsimRuntime::from_config(config, catalog()).unwrap();

        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();

            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK vsimbot");
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "USER vsimbot 0 * :vsimbot");
            write.write_all(b":srv 001 vsimbot :Welcome\r\n").await.unwrap();
            write
                .write_all(b":alice!a@h PRIVMSG #vsimbot :join #test\r\n")
                .await
                .unwrap();

            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let confirmed = line.starts_with("PRIVMSG #vsimbot :Joined");
                seen.push(line);
                if confirmed {
                    break;
                }
            }
            let _ = done_tx.send(());
            seen
        });

        let shutdown = async {
            let _ = done_rx.await;
        };
        tokio::time::timeout(Duration::from_secs(5), runtime.run_until(shutdown))
            .await
            .unwrap()
            .unwrap();
        let seen = server.await.unwrap();

        let join = seen.iter().position(|l| l == "JOIN #test").unwrap();
        let confirm = seen
            .iter()
            .position(|l| l == "PRIVMSG #vsimbot :Joined #test")
            .unwrap();
        assert!(join < confirm);
        assert!(seen.contains(&"JOIN #chess".to_string()));

        let persisted = std::fs::read_to_string(&state_file).unwrap();
        assert!(persisted.contains("#test"));
        assert_eq!(runtime.store().channels(), vec!["#vsimbot", "#chess", "#test"]);
        assert!(!runtime.is_running());
    }

    struct SilentClient;

    #[async_trait::async_trait]
    impl vsim_core::TransportClient for SilentClient {
        fn transport(&self) -> Transport {
            Transport::Irc
        }

        async fn send(&self, _target: &str, _text: &str) -> vsim_core::TransportResult<()> {
            Ok(())
        }

        async fn join(&self, _channel: &str) -> vsim_core::TransportResult<()> {
            Ok(())
        }

        async fn part(&self, _channel: &str) -> vsim_core::TransportResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn control_channel_survives_part_and_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("channels.json");
        let seed = vec!["#chess".to_string()];
        let store = Arc::new(FileChannelStore::open(&path, &seed, "#vsimbot"));
        let (outbox, _outbox_rx) = mpsc::unbounded_channel();
        let control = ChannelControl::new(store.clone(), Arc::new(SilentClient), outbox)
            .with_control_channel("#vsimbot");

        let part = vsim_framework::ControlCommand::part("#vsimbot", Transport::Irc, "#vsimbot", "op");
        assert!(control.apply(&part).await.is_err());
        let part = vsim_framework::ControlCommand::part("#chess", Transport::Irc, "#vsimbot", "op");
        control.apply(&part).await.unwrap();

        let reopened = FileChannelStore::open(&path, &seed, "#vsimbot");
        assert_eq!(reopened.channels(), vec!["#vsimbot"]);
    }

    #[tokio::test]
    async fn run_until_reports_when_no_transport_starts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_in(tmp.path());
        config.irc.server = "127.0.0.1".into();
        config.irc.port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let runtime = VsimRuntime::from_config(config, catalog()).unwrap();

        let errors = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        runtime
            .registry()
            .write()
            .register(
                vsim_framework::HandlerDescriptor::builder("on-error")
                    .on(vsim_core::LifecycleEvent::Error)
                    .handler(vsim_framework::handler_fn(move |call: &HandlerCall<'_>| {
                        seen.lock().unwrap().push((call.transport, call.body.to_string()));
                        Ok(())
                    }))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let err = runtime.run_until(std::future::pending()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::NoTransport));
        assert!(!runtime.is_running());

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, Transport::Irc);
        assert!(!errors[0].1.is_empty());
    }
}
