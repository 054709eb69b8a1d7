//! Configuration module for the vsim runtime.
//!
//! Layered TOML/environment loading and validation for the bot identity,
//! transport connections, logging and handler settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_FILE_NAMES, ConfigLoader, ENV_PREFIX, load_config, load_config_from_file};
pub use schema::{
    BotConfig, DiscordSection, IrcSection, LogFormat, LogLevel, LogOutput, LoggingConfig,
    SpanEventConfig, Theme, VsimConfig,
};
pub use validation::validate_config;
