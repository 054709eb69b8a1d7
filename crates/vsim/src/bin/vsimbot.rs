//! `vsimbot`: runs the vsim chat bot.
//!
//! # Usage
//!
//! ```bash
//! vsimbot --config vsim.toml
//! vsimbot --handlers ./handlers --log-level debug
//! vsimbot --check            # load config and manifests, print them, exit
//! ```
//!
//! Send SIGHUP to reload the handler manifests without restarting.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;

use vsim::framework::Origin;
use vsim::runtime::config::LogLevel;
use vsim::runtime::{RuntimeBuilder, VsimRuntime};

/// Cross-transport chess chat bot for IRC and Discord.
#[derive(Debug, Parser)]
#[command(name = "vsimbot", version, about)]
struct Cli {
    /// Configuration file; by default `vsim.toml` or `config.toml` is searched
    /// in the working directory and the user config directory.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Handler manifest directory, overriding `bot.handlers_dir`.
    #[arg(long, value_name = "DIR")]
    handlers: Option<PathBuf>,

    /// Log level, overriding `logging.level`. `RUST_LOG` still wins.
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Load the configuration and handler manifests, print the registry and
    /// exit without connecting.
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn builder(&self) -> RuntimeBuilder {
        let mut builder = VsimRuntime::builder().catalog(vsim::builtin_catalog());
        if let Some(path) = &self.config {
            builder = builder.config_file(path);
        }
        if let Some(dir) = &self.handlers {
            builder = builder.handlers_dir(dir);
        }
        if let Some(level) = self.log_level {
            builder = builder.log_level(level);
        }
        builder
    }
}

fn print_registry(runtime: &VsimRuntime) -> Result<()> {
    let config = runtime.config();
    println!("control channel: {}", config.bot.control_channel());
    println!("handlers dir:    {}", config.bot.handlers_dir.display());
    println!("channels:        {}", runtime.store().path().display());
    println!();

    println!("actions:");
    for name in runtime.catalog().names() {
        println!("  {name}");
    }
    println!();

    println!("handlers (dispatch order):");
    let registry = runtime.registry().read();
    for descriptor in registry.iter() {
        let origin = match descriptor.origin() {
            Origin::Builtin => "builtin".to_string(),
            Origin::Manifest(path) => path.display().to_string(),
        };
        println!(
            "  {:<20} {:<10} {:<40} {}",
            descriptor.name(),
            descriptor.event().as_str(),
            descriptor.pattern_str(),
            origin
        );
    }

    let report = runtime.load_report();
    if !report.skipped.is_empty() {
        println!();
        println!("skipped:");
        for skipped in &report.skipped {
            println!("  {}: {}", skipped.source, skipped.error);
        }
        bail!("{} handler manifest(s) failed to load", report.skipped.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = cli.builder().build().context("failed to start vsimbot")?;

    if cli.check {
        return print_registry(&runtime);
    }

    info!(
        user = %runtime.config().bot.user_name,
        handlers = runtime.registry().read().len(),
        "Starting vsimbot"
    );
    runtime.run().await?;
    info!("vsimbot stopped");
    Ok(())
}
