//! CLI module tests.

use super::args::{Args, Command};
use super::commands::{apply_overrides, load_config, read_request, simulate, EXIT_INVALID, EXIT_OK};
use crate::config::ServiceConfig;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("mcsim-cli-{}-{name}", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

// ============================================================================
// Args parsing tests
// ============================================================================

#[test]
fn test_parse_serve_defaults() {
    let args = Args::try_parse_from(["mcsim", "serve"]).unwrap();
    assert!(!args.json);
    assert!(!args.verbose);
    assert!(matches!(
        args.command,
        Command::Serve {
            host: None,
            port: None,
            workers: None,
            ..
        }
    ));
}

#[test]
fn test_parse_serve_overrides() {
    let args = Args::try_parse_from([
        "mcsim", "serve", "--config", "mcsim.yaml", "--host", "0.0.0.0", "-p", "9000", "-w", "4",
    ])
    .unwrap();
    assert_eq!(
        args.command,
        Command::Serve {
            config: Some(PathBuf::from("mcsim.yaml")),
            host: Some("0.0.0.0".to_string()),
            port: Some(9000),
            workers: Some(4),
        }
    );
    assert_eq!(args.command.config_path(), Some(Path::new("mcsim.yaml")));
}

#[test]
fn test_parse_global_flags_after_subcommand() {
    let args = Args::try_parse_from(["mcsim", "simulate", "req.json", "--json", "-v", "--seed", "7"])
        .unwrap();
    assert!(args.json);
    assert!(args.verbose);
    let Command::Simulate { request, seed, pretty, .. } = args.command else {
        panic!("expected simulate");
    };
    assert_eq!(request, PathBuf::from("req.json"));
    assert_eq!(seed, Some(7));
    assert!(!pretty);
}

#[test]
fn test_parse_check_config() {
    let args = Args::try_parse_from(["mcsim", "check-config", "svc.yaml"]).unwrap();
    assert_eq!(args.command.config_path(), Some(Path::new("svc.yaml")));
}

#[test]
fn test_parse_errors() {
    assert!(Args::try_parse_from(["mcsim"]).is_err());
    assert!(Args::try_parse_from(["mcsim", "simulate"]).is_err());
    assert!(Args::try_parse_from(["mcsim", "serve", "--port", "not-a-port"]).is_err());
    assert!(Args::try_parse_from(["mcsim", "launch"]).is_err());
}

// ============================================================================
// Command tests
// ============================================================================

#[test]
fn test_load_config_defaults_without_path() {
    let config = load_config(None).unwrap();
    assert_eq!(config.server.port, ServiceConfig::default().server.port);
}

#[test]
fn test_load_config_from_file() {
    let path = temp_file("config.yaml", "server:\n  port: 7070\n");
    let config = load_config(Some(path.as_path())).unwrap();
    assert_eq!(config.server.port, 7070);
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_load_config_invalid_file() {
    let path = temp_file("bad.yaml", "runner:\n  max_failure_ratio: 3\n");
    assert!(load_config(Some(path.as_path())).is_err());
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_apply_overrides() {
    let config = apply_overrides(ServiceConfig::default(), Some("::1".into()), Some(1), Some(0));
    assert_eq!(config.server.host, "::1");
    assert_eq!(config.server.port, 1);
    assert_eq!(config.runner.workers, Some(1));

    let untouched = apply_overrides(ServiceConfig::default(), None, None, None);
    assert_eq!(untouched.server.port, 8080);
    assert!(untouched.runner.workers.is_none());
}

#[test]
fn test_read_request() {
    let path = temp_file(
        "request.json",
        r#"{"trials": 10, "variables": [{"name": "x", "distribution": "constant", "params": {"value": 2}}], "model": "x"}"#,
    );
    let request = read_request(&path).unwrap();
    assert_eq!(request.trials, 10);
    let _ = std::fs::remove_file(path);

    let path = temp_file("broken.json", "{\"trials\": ");
    let err = read_request(&path).unwrap_err();
    assert_eq!(err.field().as_deref(), Some("body"));
    let _ = std::fs::remove_file(path);
}

#[test]
fn test_simulate_command_exit_codes() {
    let ok = temp_file(
        "ok.json",
        r#"{"trials": 50, "seed": 1, "variables": [{"name": "x", "distribution": "uniform", "params": {"low": 0, "high": 1}}], "model": "x"}"#,
    );
    assert_eq!(
        simulate(&ok, ServiceConfig::default(), Some(3), false),
        EXIT_OK
    );
    let _ = std::fs::remove_file(ok);

    let invalid = temp_file(
        "invalid.json",
        r#"{"trials": 0, "variables": [{"name": "x", "distribution": "uniform", "params": {"low": 0, "high": 1}}], "model": "x"}"#,
    );
    assert_eq!(
        simulate(&invalid, ServiceConfig::default(), None, true),
        EXIT_INVALID
    );
    let _ = std::fs::remove_file(invalid);
}
