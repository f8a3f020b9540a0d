//! mcsim CLI - Monte Carlo simulation service
//!
//! Serves the HTTP API or runs request files offline.

use std::process::ExitCode;

use clap::Parser;
use mcsim::cli::{run_cli, Args};

fn main() -> ExitCode {
    run_cli(Args::parse())
}
