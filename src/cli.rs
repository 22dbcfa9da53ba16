// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use keylight::config::DeviceKind;

#[derive(Parser)]
#[command(name = "keylightd")]
#[command(author, version, about = "Per-key RGB keyboard lighting daemon")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/keylight/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the render loop until Ctrl-C
    #[command(visible_alias = "r")]
    Run {
        /// Tick rate (overrides config)
        #[arg(long)]
        fps: Option<u32>,

        /// Device to drive (overrides config)
        #[arg(long, value_enum)]
        device: Option<DeviceKind>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<f64>,
    },

    /// List effects in the effect library
    #[command(visible_aliases = ["fx", "e"])]
    Effects,

    /// Parse a layout file and print its keys
    #[command(visible_alias = "l")]
    Layout {
        /// Layout file, or a name searched in the data directories
        file: String,
    },

    /// Print the effective configuration
    Config,
}
