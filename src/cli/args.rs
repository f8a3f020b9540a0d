//! CLI argument parsing.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

/// Command-line arguments.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "mcsim")]
#[command(version = crate::VERSION)]
#[command(about = "Reproducible Monte Carlo simulation service", long_about = None)]
pub struct Args {
    /// Emit logs as newline-delimited JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP service
    Serve {
        /// Service configuration (YAML)
        #[arg(short, long, env = "MCSIM_CONFIG")]
        config: Option<PathBuf>,

        /// Interface to bind, overriding the configuration
        #[arg(long)]
        host: Option<String>,

        /// Port to bind, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,

        /// Worker threads per simulation, overriding the configuration
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run a request file offline and print the response JSON
    Simulate {
        /// Simulation request (JSON)
        request: PathBuf,

        /// Service configuration (YAML) supplying limits
        #[arg(short, long, env = "MCSIM_CONFIG")]
        config: Option<PathBuf>,

        /// Override the request seed
        #[arg(long)]
        seed: Option<u64>,

        /// Pretty-print the response
        #[arg(long)]
        pretty: bool,
    },

    /// Load and validate a configuration file
    CheckConfig {
        /// Service configuration (YAML)
        config: PathBuf,
    },
}

impl Command {
    /// Configuration file this command reads, if any.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        match self {
            Self::Serve { config, .. } | Self::Simulate { config, .. } => config.as_deref(),
            Self::CheckConfig { config } => Some(config.as_path()),
        }
    }
}
