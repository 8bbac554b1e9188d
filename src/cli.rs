use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;
use mediascope::error::Result;

/// Mediascope - observe media playback on a page and relay it to native hosts
#[derive(Parser)]
#[command(name = "mediascope")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a scripted page session through the observers and the relay
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,

        /// Print batches to stdout instead of sending them to native hosts
        #[arg(long)]
        stdout: bool,
    },

    /// Native messaging host commands
    Host {
        #[command(subcommand)]
        command: HostCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum HostCommands {
    /// Answer one framed batch on stdin with this host's session id
    Serve {
        /// Session id to reply with (overrides config and the session file)
        #[arg(long)]
        host_id: Option<String>,

        /// Start a new session before replying
        #[arg(long)]
        rotate: bool,
    },

    /// Register this binary as a native messaging host
    Install {
        /// Host name (e.g., "com.example.mediascope")
        name: String,

        /// Extension allowed to launch the host (default: from config)
        #[arg(long)]
        extension_id: Option<String>,
    },

    /// Remove a native messaging host manifest
    Uninstall {
        /// Host name
        name: String,
    },

    /// Show where a host manifest lives and what it launches
    Path {
        /// Host name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value (e.g., relay.flush_delay_ms 50)
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
    },

    /// Show configuration file path
    Path,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Replay { scenario, stdout } => {
                commands::replay::run(self, scenario, *stdout).await
            }
            Commands::Host { command } => commands::host::run(self, command).await,
            Commands::Config { command } => commands::config::run(self, command).await,
        }
    }
}
