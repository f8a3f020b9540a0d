//! CLI command handlers.

use std::path::Path;
use std::process::ExitCode;

use tracing::error;

use crate::config::ServiceConfig;
use crate::error::{SimError, SimResult};
use crate::logging;
use crate::server::ApiError;
use crate::simulation::{SimulationRequest, Simulator};

use super::{Args, Command};

/// Exit code for success.
pub const EXIT_OK: u8 = 0;

/// Exit code for a rejected request or configuration.
pub const EXIT_INVALID: u8 = 2;

/// Exit code for a run that could not produce a summary.
pub const EXIT_FAILED: u8 = 1;

/// Main CLI entry point.
///
/// Loads the configuration, initialises logging and dispatches the command.
#[must_use]
pub fn run_cli(args: Args) -> ExitCode {
    let config = match load_config(args.command.config_path()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_INVALID);
        }
    };
    logging::init_from_config(&config.logging, args.json, args.verbose);

    match args.command {
        Command::Serve {
            host,
            port,
            workers,
            ..
        } => serve(apply_overrides(config, host, port, workers)),
        Command::Simulate {
            request,
            seed,
            pretty,
            ..
        } => ExitCode::from(simulate(&request, config, seed, pretty)),
        Command::CheckConfig { config: path } => {
            println!("✓ {} is valid", path.display());
            println!("  listen          {}", config.bind_address());
            println!("  max trials      {}", config.limits.max_trials);
            println!(
                "  workers         {}",
                config
                    .runner
                    .workers
                    .map_or_else(|| "auto".to_string(), |w| w.to_string())
            );
            ExitCode::SUCCESS
        }
    }
}

/// Load `path`, or the defaults when no file is given.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> SimResult<ServiceConfig> {
    path.map_or_else(|| Ok(ServiceConfig::default()), ServiceConfig::load)
}

/// Apply command-line overrides to `config`.
#[must_use]
pub fn apply_overrides(
    mut config: ServiceConfig,
    host: Option<String>,
    port: Option<u16>,
    workers: Option<usize>,
) -> ServiceConfig {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(workers) = workers {
        config.runner.workers = Some(workers.max(1));
    }
    config
}

fn serve(config: ServiceConfig) -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start runtime");
            return ExitCode::from(EXIT_FAILED);
        }
    };

    match runtime.block_on(crate::server::serve(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server error");
            ExitCode::from(EXIT_FAILED)
        }
    }
}

/// Run the request at `path` and print the response (or error body) as JSON.
///
/// Returns the process exit status.
#[must_use]
pub fn simulate(path: &Path, config: ServiceConfig, seed: Option<u64>, pretty: bool) -> u8 {
    let result = read_request(path).and_then(|mut request| {
        if seed.is_some() {
            request.seed = seed;
        }
        Simulator::new(config).run(&request)
    });

    match result {
        Ok(response) => match to_json(&response, pretty) {
            Ok(json) => {
                println!("{json}");
                EXIT_OK
            }
            Err(e) => {
                eprintln!("Error: {e}");
                EXIT_FAILED
            }
        },
        Err(e) => {
            let code = if e.is_client_error() {
                EXIT_INVALID
            } else {
                EXIT_FAILED
            };
            let body = ApiError(e).body();
            match to_json(&body, pretty) {
                Ok(json) => eprintln!("{json}"),
                Err(e) => eprintln!("Error: {e}"),
            }
            code
        }
    }
}

/// Read and parse a request file.
///
/// # Errors
///
/// Returns [`SimError::Io`] or a `body` validation error for malformed JSON.
pub fn read_request(path: &Path) -> SimResult<SimulationRequest> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| SimError::validation("body", e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> SimResult<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.map_err(|e| SimError::serialization(format!("JSON serialization failed: {e}")))
}
