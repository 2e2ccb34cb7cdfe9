//! CLI argument definitions using clap
//!
//! Commands:
//! - indexgate serve --config <path> [--port <port>]
//! - indexgate explain --config <path>
//! - indexgate check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// indexgate - a document query gateway that refuses full collection scans
#[derive(Parser, Debug)]
#[command(name = "indexgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect the store and serve the HTTP gateway
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./indexgate.json")]
        config: PathBuf,

        /// Port to listen on, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },

    /// Read one query from stdin and print its verdict and plan
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./indexgate.json")]
        config: PathBuf,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./indexgate.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
