//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use vsim_transport::discord::{DEFAULT_API_BASE, DEFAULT_GATEWAY_URL, DEFAULT_INTENTS};
use vsim_transport::irc::DEFAULT_PORT;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VsimConfig {
    /// Bot identity and paths.
    #[serde(default)]
    pub bot: BotConfig,

    /// IRC connection.
    #[serde(default)]
    pub irc: IrcSection,

    /// Discord connection.
    #[serde(default)]
    pub discord: DiscordSection,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Free-form settings handed to handlers, keyed by handler concern.
    #[serde(default)]
    pub handlers: Map<String, Value>,
}

// =============================================================================
// [bot]
// =============================================================================

/// Console colour switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Coloured output.
    #[default]
    Default,
    /// No ANSI escapes.
    Plain,
}

impl Theme {
    /// Whether log output may use ANSI colours.
    pub fn ansi(&self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Bot-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// The bot's user name; its identity on every transport unless a
    /// transport section overrides it.
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Channel meta-commands are accepted in. Defaults to `#<user_name>`.
    #[serde(default)]
    pub control_channel: Option<String>,

    /// Channel IRC whispers are redelivered to. Defaults to the control
    /// channel.
    #[serde(default)]
    pub whisper_channel: Option<String>,

    /// Directory of handler manifests.
    #[serde(default = "default_handlers_dir")]
    pub handlers_dir: PathBuf,

    /// File the channel list is persisted to.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Deadline for background handler tasks, in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    #[serde(default)]
    pub theme: Theme,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            control_channel: None,
            whisper_channel: None,
            handlers_dir: default_handlers_dir(),
            state_file: default_state_file(),
            task_timeout_secs: default_task_timeout_secs(),
            theme: Theme::default(),
        }
    }
}

impl BotConfig {
    /// The effective control channel.
    pub fn control_channel(&self) -> String {
        self.control_channel
            .clone()
            .unwrap_or_else(|| format!("#{}", self.user_name.to_ascii_lowercase()))
    }

    /// The effective whisper channel.
    pub fn whisper_channel(&self) -> String {
        self.whisper_channel
            .clone()
            .unwrap_or_else(|| self.control_channel())
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

fn default_user_name() -> String {
    "vsimbot".to_string()
}

fn default_handlers_dir() -> PathBuf {
    PathBuf::from("handlers")
}

fn default_state_file() -> PathBuf {
    PathBuf::from("channels.json")
}

fn default_task_timeout_secs() -> u64 {
    30
}

// =============================================================================
// [irc]
// =============================================================================

/// IRC connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrcSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_irc_server")]
    pub server: String,

    #[serde(default = "default_irc_port")]
    pub port: u16,

    /// Server password (`oauth:...` on Twitch).
    #[serde(default)]
    pub password: Option<String>,

    /// Channels joined on first start. Once a channel list has been
    /// persisted, the persisted list wins.
    #[serde(default)]
    pub channels: Vec<String>,

    /// Capabilities requested after registration.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,
}

impl Default for IrcSection {
    fn default() -> Self {
        Self {
            enabled: true,
            server: default_irc_server(),
            port: default_irc_port(),
            password: None,
            channels: Vec::new(),
            capabilities: default_capabilities(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_irc_server() -> String {
    "irc.chat.twitch.tv".to_string()
}

fn default_irc_port() -> u16 {
    DEFAULT_PORT
}

fn default_capabilities() -> Vec<String> {
    vec![
        "twitch.tv/membership".to_string(),
        "twitch.tv/commands".to_string(),
    ]
}

// =============================================================================
// [discord]
// =============================================================================

/// Discord connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordSection {
    #[serde(default)]
    pub enabled: bool,

    /// Bot token, without the `Bot ` prefix.
    #[serde(default)]
    pub token: Option<String>,

    /// Username the bot posts as, if it differs from `bot.user_name`.
    #[serde(default)]
    pub user_name: Option<String>,

    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Gateway intents bitfield.
    #[serde(default = "default_intents")]
    pub intents: u64,

    /// REST request timeout, in seconds.
    #[serde(default = "default_discord_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DiscordSection {
    fn default() -> Self {
        Self {
            enabled: false,
            token: None,
            user_name: None,
            gateway_url: default_gateway_url(),
            api_base: default_api_base(),
            intents: default_intents(),
            timeout_secs: default_discord_timeout_secs(),
        }
    }
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_intents() -> u64 {
    DEFAULT_INTENTS
}

fn default_discord_timeout_secs() -> u64 {
    30
}

// =============================================================================
// [logging]
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file path when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `vsim_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}
