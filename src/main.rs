//! keylight daemon
//!
//! Drives a keyboard's per-key LEDs from configured effects.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

use keylight::config::Config;

// CLI definitions
mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; the terminal device owns stdout
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    debug!(path = %config_path.display(), "loading config");
    let config = Config::load(&config_path)?;

    match cli.command.unwrap_or(Commands::Run {
        fps: None,
        device: None,
        seconds: None,
    }) {
        Commands::Run {
            fps,
            device,
            seconds,
        } => commands::run::run(config, fps, device, seconds),
        Commands::Effects => commands::effects::list(&config),
        Commands::Layout { file } => commands::layout::show(&file),
        Commands::Config => commands::show_config(&config),
    }
}
