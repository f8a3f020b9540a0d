//! Plain-text documentation served by the GET endpoints.

use std::fmt::Write;

use crate::config::ServiceConfig;
use crate::model::BuiltinModel;

/// `GET /docs`
pub const DOCS: &str = r#"mcsim - Monte Carlo simulation service

POST /simulate runs a Monte Carlo simulation and returns summary statistics.

REQUEST BODY (JSON)
    trials           integer, number of trials to run (required)
    seed             integer, master seed; omitted means a fresh seed is drawn
    variables        array of input variables, sampled in order (required)
        name             identifier used in formulas
        distribution     constant | uniform | normal | lognormal |
                         triangular | exponential | discrete
        params           distribution parameters (see below)
    model            formula string, built-in model name, or object (required)
                         "price * units - cost"
                         "sum"  or  {"name": "sum"}
                         {"outputs": {"revenue": "price * units",
                                      "profit": "price * units - cost"}}
    percentiles      array of numbers in [0, 100]   (default 5, 25, 50, 75, 95)
    histogram_bins   integer number of equal-width bins
    include_samples  boolean, return raw successful trials
    timeout_ms       integer wall-clock budget, capped by the server

DISTRIBUTION PARAMETERS
    constant      {"value": v}
    uniform       {"low": a, "high": b}            a < b  (aliases min, max)
    normal        {"mean": m, "stddev": s}         s >= 0
    lognormal     {"mu": m, "sigma": s}            s >= 0
    triangular    {"min": a, "mode": c, "max": b}  a <= c <= b, a < b
    exponential   {"rate": r}                      r > 0
    discrete      {"values": [{"value": v, "weight": w}, ...]}

FORMULAS
    Operators, loosest first: comparisons (< <= > >= == !=, yield 1 or 0),
    + -, * / %, unary -, ^ (right associative). Constants pi and e.
    Functions: sqrt ln log log10 exp abs floor ceil round sin cos tan
               min(a, b, ...) max(a, b, ...) pow(x, y) if(cond, then, else)

See also: /help, /help/interpret, /help/examples, /help/constraints
"#;

/// `GET /help`
pub const HELP: &str = "mcsim endpoints

    GET  /                    service version
    GET  /health              liveness probe
    GET  /docs                request format and formula reference
    GET  /help                this text
    GET  /help/interpret      how to read a simulation response
    GET  /help/examples       example requests
    GET  /help/constraints    limits enforced by this server
    POST /simulate            run a simulation
";

/// `GET /help/interpret`
pub const INTERPRET: &str = "Reading a simulation response

    trials_requested   trials asked for
    trials_succeeded   trials whose model evaluation produced finite outputs
    seed_used          master seed; send it back to reproduce the run exactly
    outputs            one summary per model output, in model order
        count                successful trials summarized
        mean                 arithmetic mean
        stddev, variance     sample statistics (n - 1); 0 for a single trial
        min, max             extremes
        confidence_interval  95% interval of the mean, mean +/- 1.96 * stddev / sqrt(n)
        percentiles          linear interpolation between closest ranks
        histogram            equal-width bins over [min, max]; the last bin is closed
    errors             one entry per trial that failed or never ran, with the
                       inputs that triggered the failure when it ran
    warnings           adjustments and partial results worth knowing about
    timed_out          true if the deadline stopped the run; statistics then
                       cover only the trials that completed
    samples            raw successful trials, when include_samples was set

Error responses have the shape
    {\"error\": {\"kind\": ..., \"stage\": ..., \"message\": ..., \"field\": ...}}
    400 validation_error, invalid_distribution_error
    422 no_valid_trials_error, excessive_failure_error,
        non_finite_statistic_error
    504 timeout_error
    500 internal_error
";

/// `GET /help/examples`
pub const EXAMPLES: &str = r#"Example requests

Uniform identity:
    {"trials": 1000, "seed": 42,
     "variables": [{"name": "x", "distribution": "uniform",
                    "params": {"low": 0, "high": 1}}],
     "model": "identity"}

Project cost with several outputs:
    {"trials": 20000, "seed": 7,
     "variables": [
        {"name": "labor", "distribution": "triangular",
         "params": {"min": 80, "mode": 100, "max": 150}},
        {"name": "materials", "distribution": "normal",
         "params": {"mean": 50, "stddev": 5}},
        {"name": "delay", "distribution": "discrete",
         "params": {"values": [{"value": 0, "weight": 0.7},
                               {"value": 20, "weight": 0.3}]}}],
     "model": {"outputs": {"total": "labor + materials + delay",
                           "over_budget": "labor + materials + delay > 180"}},
     "percentiles": [10, 50, 90]}

Waiting time:
    {"trials": 5000,
     "variables": [{"name": "rate", "distribution": "exponential",
                    "params": {"rate": 0.5}}],
     "model": "min(rate, 10)",
     "histogram_bins": 10}
"#;

/// `GET /help/constraints`, reporting the limits of `config`.
#[must_use]
pub fn constraints(config: &ServiceConfig) -> String {
    let limits = &config.limits;
    let runner = &config.runner;
    let builtins: Vec<&str> = BuiltinModel::ALL.iter().map(|b| b.name()).collect();

    let mut text = String::from("Constraints enforced by this server\n\n");
    let rows = [
        ("max trials", limits.max_trials.to_string()),
        ("max variables", limits.max_variables.to_string()),
        ("max percentiles", limits.max_percentiles.to_string()),
        ("max histogram bins", limits.max_histogram_bins.to_string()),
        ("default histogram bins", limits.default_histogram_bins.to_string()),
        ("max raw samples", limits.max_raw_samples.to_string()),
        ("max formula length", format!("{} bytes", limits.max_expression_len)),
        ("max formula nesting", crate::model::expr::MAX_DEPTH.to_string()),
        ("default timeout", format!("{} ms", runner.default_timeout_ms)),
        ("max timeout", format!("{} ms", limits.max_timeout_ms)),
        ("max failure ratio", runner.max_failure_ratio.to_string()),
        ("concurrent runs", runner.max_concurrent_runs.to_string()),
        ("built-in models", builtins.join(", ")),
    ];
    for (name, value) in rows {
        let _ = writeln!(text, "    {name:<24}{value}");
    }
    text.push_str(
        "\nA run fails with excessive_failure_error when failed / executed trials\n\
         exceeds the max failure ratio. A run cut short by its deadline is\n\
         summarized only if at least ceil((1 - max failure ratio) * trials)\n\
         trials succeeded.\n",
    );
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_docs_mentions_every_distribution() {
        for kind in [
            "constant",
            "uniform",
            "normal",
            "lognormal",
            "triangular",
            "exponential",
            "discrete",
        ] {
            assert!(DOCS.contains(kind), "missing {kind}");
        }
    }

    #[test]
    fn test_help_lists_routes() {
        for route in ["/docs", "/help/interpret", "/help/examples", "/help/constraints", "/simulate"] {
            assert!(HELP.contains(route));
        }
    }

    #[test]
    fn test_examples_are_valid_requests() {
        let config = ServiceConfig::default();
        let bodies: Vec<&str> = EXAMPLES
            .split("\n\n")
            .filter_map(|block| block.find('{').map(|start| &block[start..]))
            .collect();
        assert_eq!(bodies.len(), 3);
        for body in bodies {
            let req: crate::simulation::SimulationRequest = serde_json::from_str(body).unwrap();
            assert!(req.validate(&config).is_ok(), "invalid example: {body}");
        }
    }

    #[test]
    fn test_constraints_reflect_config() {
        let config = ServiceConfig::builder().max_trials(1234).max_concurrent_runs(7).build();
        let text = constraints(&config);
        assert!(text.contains("1234"));
        assert!(text.contains("concurrent runs"));
        assert!(text.contains("identity, sum, product, mean"));
    }
}
