//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// EventSub Overlay - animated stream alerts from Twitch EventSub
///
/// Listens on an EventSub WebSocket session, subscribes to follow and
/// subscribe events, and draws a fading alert with the user's name for
/// each notification.
#[derive(Parser, Debug)]
#[command(name = "eventsub-overlay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "OVERLAY_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to EventSub and show alerts until interrupted
    Run {
        /// Endpoint selector, overrides the config file (dev or prod)
        #[arg(long, value_parser = ["dev", "prod"])]
        env: Option<String>,
    },

    /// Draw a single alert and exit
    Alert {
        /// Name shown on the alert
        #[arg(short, long)]
        username: String,

        /// Image asset id
        #[arg(short, long, default_value = "twitch-new-follower-img")]
        image: String,

        /// Text color
        #[arg(long, default_value = "#6441a4")]
        color: String,

        /// Alert duration in milliseconds (defaults to the configured duration)
        #[arg(short, long)]
        duration_ms: Option<u64>,
    },

    /// Cycle through the built-in sample alerts
    Demo {
        /// Keep cycling until interrupted
        #[arg(short, long = "loop")]
        repeat: bool,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}
