//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Config file (`vsim.toml` or `config.toml`, first found in the search
//!    paths, or the file given with [`ConfigLoader::file`])
//! 3. Environment variables (`VSIM_*`)
//! 4. Programmatic overrides ([`ConfigLoader::merge`])
//!
//! # Environment Variable Mapping
//!
//! Environment variables use the `VSIM_` prefix with `__` as separator:
//!
//! - `VSIM_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `VSIM_IRC__PASSWORD=oauth:xyz` → `irc.password = "oauth:xyz"`
//! - `VSIM_DISCORD__TOKEN=xxx` → `discord.token = "xxx"`
//!
//! # Example
//!
//! ```rust,ignore
//! use vsim_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./vsim.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::VsimConfig;
use super::validation::validate_config;

/// Base names searched in each search path, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["vsim.toml", "config.toml"];

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "VSIM_";

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    overrides: Figment,
    /// Search paths for configuration files.
    search_paths: Vec<PathBuf>,
    /// Whether to load environment variables.
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds current directory to search paths.
    pub fn with_current_dir(self) -> Self {
        if let Ok(cwd) = std::env::current_dir() {
            self.search_path(cwd)
        } else {
            self
        }
    }

    /// Adds user config directory to search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.search_path(config_dir.join("vsim"))
        } else {
            self
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges a single override value, e.g. `("logging.level", "debug")`.
    ///
    /// Overrides win over every other source.
    pub fn set<T: serde::Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Merges a complete configuration as an override.
    pub fn merge(mut self, config: VsimConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// Loads, validates and returns the configuration.
    pub fn load(self) -> ConfigResult<VsimConfig> {
        let figment = self.build_figment()?;

        let config: VsimConfig = figment.extract().map_err(|e| {
            ConfigError::ParseError(format!("Failed to extract configuration: {e}"))
        })?;
        validate_config(&config)?;

        debug!(
            user_name = %config.bot.user_name,
            irc = config.irc.enabled,
            discord = config.discord.enabled,
            logging_level = %config.logging.level,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(VsimConfig::default()));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(&path));
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        let overrides = std::mem::take(&mut self.overrides);
        Ok(figment.merge(overrides))
    }

    /// Resolves the effective list of search paths.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            let mut paths = Vec::new();
            if let Ok(cwd) = std::env::current_dir() {
                paths.push(cwd);
            }
            if let Some(config_dir) = dirs::config_dir() {
                paths.push(config_dir.join("vsim"));
            }
            paths
        } else {
            self.search_paths.clone()
        }
    }

    /// Merges the first config file found in the search paths.
    fn load_config_files(&self, figment: Figment) -> Figment {
        for search_path in self.resolve_search_paths() {
            for name in CONFIG_FILE_NAMES {
                let path = search_path.join(name);
                if path.exists() {
                    info!(path = %path.display(), "Loading configuration file");
                    return figment.merge(Toml::file(path));
                }
            }
        }
        warn!("No configuration file found, using defaults");
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<VsimConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file (plus environment variables).
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<VsimConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, Theme};
    use figment::Jail;

    #[test]
    fn test_default_config() {
        Jail::expect_with(|jail| {
            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.logging.level.as_str(), "info");
            assert_eq!(config.bot.user_name, "vsimbot");
            assert!(config.irc.enabled);
            assert!(!config.discord.enabled);
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "vsim.toml",
                r##"
                [bot]
                user_name = "chessbot"
                theme = "plain"

                [irc]
                server = "irc.libera.chat"
                channels = ["#chess"]

                [handlers.engine]
                depth = 18
                "##,
            )?;

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap();

            assert_eq!(config.bot.user_name, "chessbot");
            assert_eq!(config.bot.theme, Theme::Plain);
            assert_eq!(config.bot.control_channel(), "#chessbot");
            assert_eq!(config.irc.server, "irc.libera.chat");
            assert_eq!(config.irc.port, 6667);
            assert_eq!(config.irc.channels, vec!["#chess".to_string()]);
            assert_eq!(config.handlers["engine"]["depth"], 18);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file_and_overrides_win() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                level = "warn"

                [irc]
                port = 6697
                "#,
            )?;
            jail.set_env("VSIM_LOGGING__LEVEL", "debug");
            jail.set_env("VSIM_IRC__PASSWORD", "oauth:secret");

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .load()
                .unwrap();
            assert_eq!(config.logging.level, LogLevel::Debug);
            assert_eq!(config.irc.port, 6697);
            assert_eq!(config.irc.password.as_deref(), Some("oauth:secret"));

            let config = ConfigLoader::new()
                .search_path(jail.directory())
                .set("logging.level", "trace")
                .load()
                .unwrap();
            assert_eq!(config.logging.level, LogLevel::Trace);
            Ok(())
        });
    }

    #[test]
    fn explicit_file_must_exist() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/nonexistent/vsim.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn invalid_values_fail_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("vsim.toml", "[irc]\nport = 0\n")?;
            let err = ConfigLoader::new()
                .search_path(jail.directory())
                .without_env()
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidPort(0)));
            Ok(())
        });
    }

    #[test]
    fn sample_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../vsim.example.toml");
        let config = ConfigLoader::new().without_env().file(path).load().unwrap();

        assert_eq!(config.bot.control_channel(), "#vsimbot");
        assert_eq!(config.irc.channels, vec!["#chess"]);
        assert_eq!(config.logging.filters.get("vsim_transport"), Some(&LogLevel::Debug));
        assert_eq!(config.handlers["engine"]["depth"], 15);
    }
}
