//! CLI module for mcsim.
//!
//! All command logic lives here so that `main.rs` only parses arguments and
//! forwards them to [`run_cli`].

mod args;
mod commands;

pub use args::{Args, Command};
pub use commands::{apply_overrides, load_config, read_request, run_cli, simulate};

#[cfg(test)]
mod tests;
