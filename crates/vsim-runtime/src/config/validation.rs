//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, DiscordSection, IrcSection, LogOutput, LoggingConfig, VsimConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &VsimConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_irc_config(&config.irc)?;
    validate_discord_config(&config.discord)?;
    validate_logging_config(&config.logging)?;

    if !config.irc.enabled && !config.discord.enabled {
        return Err(ConfigError::validation(
            "At least one transport (irc or discord) must be enabled",
        ));
    }

    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.user_name.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.user_name"));
    }
    if bot.user_name.contains(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "bot.user_name must not contain whitespace: '{}'",
            bot.user_name
        )));
    }

    validate_channel_name("bot.control_channel", &bot.control_channel())?;
    validate_channel_name("bot.whisper_channel", &bot.whisper_channel())?;

    if bot.task_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "bot.task_timeout_secs must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_irc_config(irc: &IrcSection) -> ConfigResult<()> {
    if !irc.enabled {
        return Ok(());
    }

    if irc.server.trim().is_empty() {
        return Err(ConfigError::missing_field("irc.server"));
    }
    if irc.port == 0 {
        return Err(ConfigError::InvalidPort(irc.port));
    }
    for channel in &irc.channels {
        validate_channel_name("irc.channels", channel)?;
    }

    Ok(())
}

fn validate_discord_config(discord: &DiscordSection) -> ConfigResult<()> {
    if !discord.enabled {
        return Ok(());
    }

    match &discord.token {
        Some(token) if !token.trim().is_empty() => {}
        _ => return Err(ConfigError::missing_field("discord.token")),
    }

    if !discord.gateway_url.starts_with("ws://") && !discord.gateway_url.starts_with("wss://") {
        return Err(ConfigError::invalid_url(
            &discord.gateway_url,
            "Gateway URL must start with ws:// or wss://",
        ));
    }
    if !discord.api_base.starts_with("http://") && !discord.api_base.starts_with("https://") {
        return Err(ConfigError::invalid_url(
            &discord.api_base,
            "API base must start with http:// or https://",
        ));
    }
    if discord.timeout_secs == 0 {
        return Err(ConfigError::validation(
            "discord.timeout_secs must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_channel_name(field: &str, channel: &str) -> ConfigResult<()> {
    if !channel.starts_with('#') || channel.len() < 2 || channel.contains([' ', ',']) {
        return Err(ConfigError::validation(format!(
            "{field}: '{channel}' is not a channel name"
        )));
    }
    Ok(())
}
