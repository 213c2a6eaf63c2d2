//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for a fedround node.

use clap::{Parser, Subcommand};

/// fedround node - peer-to-peer federated learning
///
/// Trains locally, exchanges contributions with the configured peers each
/// round, waits for a quorum, and averages what arrived with FedAvg.
#[derive(Parser, Debug)]
#[command(name = "fedround-node")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the node
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the node (serve peers and drive training rounds)
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "FEDROUND_CONFIG")]
        config: Option<String>,

        /// Override the number of rounds to run
        #[arg(long)]
        rounds: Option<u64>,
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
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
