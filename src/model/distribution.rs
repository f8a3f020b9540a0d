//! Probability distributions for input variables.
//!
//! [`DistributionSpec`] is the wire form (`{"distribution": kind, "params":
//! {...}}`). It is checked once, at request validation, and compiled into a
//! [`Distribution`] that samples without re-checking its parameters.

use serde::{Deserialize, Serialize};

use crate::engine::rng::SimRng;

/// Distribution kind plus its parameters, as sent by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", content = "params", rename_all = "snake_case")]
pub enum DistributionSpec {
    /// Always the same value.
    Constant(ConstantParams),
    /// Uniform on `[low, high)`.
    Uniform(UniformParams),
    /// Gaussian.
    Normal(NormalParams),
    /// `exp(N(mu, sigma))`.
    Lognormal(LognormalParams),
    /// Triangular on `[min, max]` peaking at `mode`.
    Triangular(TriangularParams),
    /// Exponential with the given rate.
    Exponential(ExponentialParams),
    /// Finite set of weighted values.
    Discrete(DiscreteParams),
}

/// Parameters of [`DistributionSpec::Constant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantParams {
    /// The value.
    pub value: f64,
}

/// Parameters of [`DistributionSpec::Uniform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniformParams {
    /// Inclusive lower bound.
    #[serde(alias = "min")]
    pub low: f64,
    /// Exclusive upper bound.
    #[serde(alias = "max")]
    pub high: f64,
}

/// Parameters of [`DistributionSpec::Normal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalParams {
    /// Mean.
    pub mean: f64,
    /// Standard deviation (≥ 0).
    #[serde(alias = "std", alias = "sd")]
    pub stddev: f64,
}

/// Parameters of [`DistributionSpec::Lognormal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LognormalParams {
    /// Mean of the underlying normal.
    pub mu: f64,
    /// Standard deviation of the underlying normal (≥ 0).
    pub sigma: f64,
}

/// Parameters of [`DistributionSpec::Triangular`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriangularParams {
    /// Lower bound.
    pub min: f64,
    /// Peak.
    pub mode: f64,
    /// Upper bound.
    pub max: f64,
}

/// Parameters of [`DistributionSpec::Exponential`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExponentialParams {
    /// Rate λ (> 0).
    pub rate: f64,
}

/// Parameters of [`DistributionSpec::Discrete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscreteParams {
    /// Outcomes and their relative weights.
    pub values: Vec<WeightedValue>,
}

/// One outcome of a discrete distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedValue {
    /// Outcome.
    pub value: f64,
    /// Relative weight (≥ 0).
    pub weight: f64,
}

fn finite(name: &str, v: f64) -> Result<f64, String> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("{name} must be finite, got {v}"))
    }
}

impl DistributionSpec {
    /// Kind name as it appears on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Constant(_) => "constant",
            Self::Uniform(_) => "uniform",
            Self::Normal(_) => "normal",
            Self::Lognormal(_) => "lognormal",
            Self::Triangular(_) => "triangular",
            Self::Exponential(_) => "exponential",
            Self::Discrete(_) => "discrete",
        }
    }

    /// Check parameter invariants and build a sampler.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated invariant.
    pub fn compile(&self) -> Result<Distribution, String> {
        match self {
            Self::Constant(p) => Ok(Distribution::Constant {
                value: finite("value", p.value)?,
            }),
            Self::Uniform(p) => {
                let low = finite("low", p.low)?;
                let high = finite("high", p.high)?;
                if low >= high {
                    return Err(format!("low ({low}) must be less than high ({high})"));
                }
                Ok(Distribution::Uniform { low, high })
            }
            Self::Normal(p) => {
                let mean = finite("mean", p.mean)?;
                let stddev = finite("stddev", p.stddev)?;
                if stddev < 0.0 {
                    return Err(format!("stddev must be non-negative, got {stddev}"));
                }
                Ok(Distribution::Normal { mean, stddev })
            }
            Self::Lognormal(p) => {
                let mu = finite("mu", p.mu)?;
                let sigma = finite("sigma", p.sigma)?;
                if sigma < 0.0 {
                    return Err(format!("sigma must be non-negative, got {sigma}"));
                }
                Ok(Distribution::Lognormal { mu, sigma })
            }
            Self::Triangular(p) => {
                let min = finite("min", p.min)?;
                let mode = finite("mode", p.mode)?;
                let max = finite("max", p.max)?;
                if min >= max {
                    return Err(format!("min ({min}) must be less than max ({max})"));
                }
                if mode < min || mode > max {
                    return Err(format!("mode ({mode}) must lie within [{min}, {max}]"));
                }
                Ok(Distribution::Triangular { min, mode, max })
            }
            Self::Exponential(p) => {
                let rate = finite("rate", p.rate)?;
                if rate <= 0.0 {
                    return Err(format!("rate must be positive, got {rate}"));
                }
                Ok(Distribution::Exponential { rate })
            }
            Self::Discrete(p) => {
                if p.values.is_empty() {
                    return Err("values must not be empty".to_string());
                }
                let mut values = Vec::with_capacity(p.values.len());
                let mut cumulative = Vec::with_capacity(p.values.len());
                let mut total = 0.0;
                let mut last_positive = 0;
                for (i, wv) in p.values.iter().enumerate() {
                    values.push(finite(&format!("values[{i}].value"), wv.value)?);
                    let weight = finite(&format!("values[{i}].weight"), wv.weight)?;
                    if weight < 0.0 {
                        return Err(format!("values[{i}].weight must be non-negative"));
                    }
                    if weight > 0.0 {
                        last_positive = i;
                    }
                    total += weight;
                    cumulative.push(total);
                }
                if total <= 0.0 || !total.is_finite() {
                    return Err(format!("weights must sum to a positive finite total, got {total}"));
                }
                Ok(Distribution::Discrete {
                    values,
                    cumulative,
                    total,
                    last_positive,
                })
            }
        }
    }
}

/// Validated distribution, ready to sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Always `value`; consumes no draws.
    Constant {
        /// The value.
        value: f64,
    },
    /// Uniform on `[low, high)`.
    Uniform {
        /// Lower bound.
        low: f64,
        /// Upper bound.
        high: f64,
    },
    /// Gaussian via Box-Muller.
    Normal {
        /// Mean.
        mean: f64,
        /// Standard deviation.
        stddev: f64,
    },
    /// Log-normal.
    Lognormal {
        /// Underlying mean.
        mu: f64,
        /// Underlying standard deviation.
        sigma: f64,
    },
    /// Triangular via inverse CDF.
    Triangular {
        /// Lower bound.
        min: f64,
        /// Peak.
        mode: f64,
        /// Upper bound.
        max: f64,
    },
    /// Exponential via inverse CDF.
    Exponential {
        /// Rate.
        rate: f64,
    },
    /// Weighted choice by binary search over cumulative weights.
    Discrete {
        /// Outcomes.
        values: Vec<f64>,
        /// Running weight totals, aligned with `values`.
        cumulative: Vec<f64>,
        /// Sum of all weights.
        total: f64,
        /// Index of the last outcome with a positive weight.
        last_positive: usize,
    },
}

impl Distribution {
    /// Draw one variate, advancing `rng`.
    pub fn sample(&self, rng: &mut SimRng) -> f64 {
        match self {
            Self::Constant { value } => *value,
            Self::Uniform { low, high } => rng.gen_range_f64(*low, *high),
            Self::Normal { mean, stddev } => rng.gen_normal(*mean, *stddev),
            Self::Lognormal { mu, sigma } => rng.gen_normal(*mu, *sigma).exp(),
            Self::Triangular { min, mode, max } => {
                let u = rng.gen_f64();
                let span = max - min;
                let split = (mode - min) / span;
                if u < split {
                    min + (u * span * (mode - min)).sqrt()
                } else {
                    max - ((1.0 - u) * span * (max - mode)).sqrt()
                }
            }
            Self::Exponential { rate } => -rng.gen_f64_open().ln() / rate,
            Self::Discrete {
                values,
                cumulative,
                total,
                last_positive,
            } => values[pick_weighted(cumulative, *last_positive, rng.gen_f64() * total)],
        }
    }

    /// Theoretical mean.
    #[must_use]
    pub fn mean(&self) -> f64 {
        match self {
            Self::Constant { value } => *value,
            Self::Uniform { low, high } => (low + high) / 2.0,
            Self::Normal { mean, .. } => *mean,
            Self::Lognormal { mu, sigma } => (mu + sigma * sigma / 2.0).exp(),
            Self::Triangular { min, mode, max } => (min + mode + max) / 3.0,
            Self::Exponential { rate } => 1.0 / rate,
            Self::Discrete {
                values,
                cumulative,
                total,
                ..
            } => {
                let mut prev = 0.0;
                let mut acc = 0.0;
                for (v, c) in values.iter().zip(cumulative) {
                    acc += v * (c - prev);
                    prev = *c;
                }
                acc / total
            }
        }
    }
}

/// Index of the first outcome whose cumulative weight exceeds `target`.
///
/// A target that rounded up to the total falls back to the last outcome that
/// can actually be drawn.
fn pick_weighted(cumulative: &[f64], last_positive: usize, target: f64) -> usize {
    cumulative
        .partition_point(|&c| c <= target)
        .min(last_positive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mean(dist: &Distribution, n: usize, seed: u64) -> f64 {
        let mut rng = SimRng::new(seed);
        (0..n).map(|_| dist.sample(&mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn test_deserialize_adjacent_tagging() {
        let json = r#"{"distribution": "uniform", "params": {"low": 0.0, "high": 2.0}}"#;
        let spec: DistributionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(
            spec,
            DistributionSpec::Uniform(UniformParams {
                low: 0.0,
                high: 2.0
            })
        );
        assert_eq!(spec.kind(), "uniform");
    }

    #[test]
    fn test_deserialize_aliases() {
        let json = r#"{"distribution": "uniform", "params": {"min": 1, "max": 3}}"#;
        let spec: DistributionSpec = serde_json::from_str(json).unwrap();
        assert!(matches!(spec, DistributionSpec::Uniform(UniformParams { low, high }) if low == 1.0 && high == 3.0));

        let json = r#"{"distribution": "normal", "params": {"mean": 1, "std": 2}}"#;
        let spec: DistributionSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.kind(), "normal");
    }

    #[test]
    fn test_deserialize_unknown_kind_and_field() {
        let unknown = r#"{"distribution": "cauchy", "params": {}}"#;
        assert!(serde_json::from_str::<DistributionSpec>(unknown).is_err());

        let extra = r#"{"distribution": "exponential", "params": {"rate": 1, "shift": 2}}"#;
        assert!(serde_json::from_str::<DistributionSpec>(extra).is_err());
    }

    #[test]
    fn test_uniform_invariants() {
        let bad = DistributionSpec::Uniform(UniformParams { low: 1.0, high: 1.0 });
        assert!(bad.compile().unwrap_err().contains("less than"));
        let inf = DistributionSpec::Uniform(UniformParams {
            low: 0.0,
            high: f64::INFINITY,
        });
        assert!(inf.compile().unwrap_err().contains("finite"));
    }

    #[test]
    fn test_normal_and_lognormal_invariants() {
        let bad = DistributionSpec::Normal(NormalParams {
            mean: 0.0,
            stddev: -1.0,
        });
        assert!(bad.compile().is_err());
        let ok = DistributionSpec::Normal(NormalParams {
            mean: 0.0,
            stddev: 0.0,
        });
        assert!(ok.compile().is_ok());
        let bad = DistributionSpec::Lognormal(LognormalParams {
            mu: 0.0,
            sigma: -0.5,
        });
        assert!(bad.compile().is_err());
    }

    #[test]
    fn test_triangular_invariants() {
        let mode_outside = DistributionSpec::Triangular(TriangularParams {
            min: 0.0,
            mode: 5.0,
            max: 4.0,
        });
        assert!(mode_outside.compile().unwrap_err().contains("mode"));
        let edge_mode = DistributionSpec::Triangular(TriangularParams {
            min: 0.0,
            mode: 0.0,
            max: 4.0,
        });
        assert!(edge_mode.compile().is_ok());
    }

    #[test]
    fn test_exponential_invariants() {
        let bad = DistributionSpec::Exponential(ExponentialParams { rate: 0.0 });
        assert!(bad.compile().unwrap_err().contains("positive"));
    }

    #[test]
    fn test_discrete_invariants() {
        let empty = DistributionSpec::Discrete(DiscreteParams { values: vec![] });
        assert!(empty.compile().is_err());

        let zero_total = DistributionSpec::Discrete(DiscreteParams {
            values: vec![WeightedValue {
                value: 1.0,
                weight: 0.0,
            }],
        });
        assert!(zero_total.compile().unwrap_err().contains("positive"));

        let negative = DistributionSpec::Discrete(DiscreteParams {
            values: vec![
                WeightedValue {
                    value: 1.0,
                    weight: 2.0,
                },
                WeightedValue {
                    value: 2.0,
                    weight: -1.0,
                },
            ],
        });
        assert!(negative.compile().unwrap_err().contains("values[1]"));
    }

    #[test]
    fn test_uniform_sampling() {
        let dist = Distribution::Uniform {
            low: 2.0,
            high: 4.0,
        };
        let mut rng = SimRng::new(42);
        for _ in 0..1000 {
            let v = dist.sample(&mut rng);
            assert!((2.0..4.0).contains(&v));
        }
        assert!((sample_mean(&dist, 20_000, 1) - 3.0).abs() < 0.05);
    }

    #[test]
    fn test_triangular_sampling() {
        let dist = Distribution::Triangular {
            min: 0.0,
            mode: 1.0,
            max: 5.0,
        };
        let mut rng = SimRng::new(42);
        for _ in 0..1000 {
            let v = dist.sample(&mut rng);
            assert!((0.0..=5.0).contains(&v));
        }
        assert!((sample_mean(&dist, 50_000, 2) - dist.mean()).abs() < 0.05);
    }

    #[test]
    fn test_exponential_sampling() {
        let dist = Distribution::Exponential { rate: 2.0 };
        let m = sample_mean(&dist, 50_000, 3);
        assert!((m - 0.5).abs() < 0.02, "mean {m}");
    }

    #[test]
    fn test_lognormal_sampling_positive() {
        let dist = Distribution::Lognormal { mu: 0.0, sigma: 0.5 };
        let mut rng = SimRng::new(9);
        for _ in 0..1000 {
            assert!(dist.sample(&mut rng) > 0.0);
        }
        assert!((sample_mean(&dist, 50_000, 4) - dist.mean()).abs() < 0.03);
    }

    #[test]
    fn test_discrete_sampling_frequencies() {
        let spec = DistributionSpec::Discrete(DiscreteParams {
            values: vec![
                WeightedValue {
                    value: 10.0,
                    weight: 1.0,
                },
                WeightedValue {
                    value: 20.0,
                    weight: 3.0,
                },
                WeightedValue {
                    value: 30.0,
                    weight: 0.0,
                },
            ],
        });
        let dist = spec.compile().unwrap();
        let mut rng = SimRng::new(5);
        let n = 40_000;
        let mut twenties = 0usize;
        for _ in 0..n {
            let v = dist.sample(&mut rng);
            assert!(v == 10.0 || v == 20.0, "zero-weight outcome drawn: {v}");
            if v == 20.0 {
                twenties += 1;
            }
        }
        let freq = twenties as f64 / n as f64;
        assert!((freq - 0.75).abs() < 0.02, "freq {freq}");
        assert!((dist.mean() - 17.5).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_pick_at_total_skips_trailing_zero_weight() {
        // weights 1, 3, 0, 0
        let cumulative = [1.0, 4.0, 4.0, 4.0];
        assert_eq!(pick_weighted(&cumulative, 1, 0.0), 0);
        assert_eq!(pick_weighted(&cumulative, 1, 1.0), 1);
        assert_eq!(pick_weighted(&cumulative, 1, 3.999), 1);
        assert_eq!(pick_weighted(&cumulative, 1, 4.0), 1);

        let spec = DistributionSpec::Discrete(DiscreteParams {
            values: vec![
                WeightedValue { value: 1.0, weight: 2.0 },
                WeightedValue { value: 2.0, weight: 0.0 },
            ],
        });
        let Distribution::Discrete { last_positive, .. } = spec.compile().unwrap() else {
            panic!("expected discrete");
        };
        assert_eq!(last_positive, 0);
    }

    #[test]
    fn test_constant_consumes_no_draws() {
        let dist = Distribution::Constant { value: 7.5 };
        let mut rng = SimRng::new(1);
        assert_eq!(dist.sample(&mut rng), 7.5);
        assert_eq!(rng.draws(), 0);
    }

    #[test]
    fn test_sampling_is_deterministic() {
        let dist = Distribution::Normal {
            mean: 3.0,
            stddev: 2.0,
        };
        let mut a = SimRng::for_stream(11, 4);
        let mut b = SimRng::for_stream(11, 4);
        for _ in 0..100 {
            assert_eq!(dist.sample(&mut a).to_bits(), dist.sample(&mut b).to_bits());
        }
    }
}
