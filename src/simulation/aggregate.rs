//! Statistical reduction of trial outputs.
//!
//! All sums run over trials in index order, so a fixed set of outcomes
//! always produces bit-identical statistics regardless of which worker
//! computed which trial.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

use super::runner::TrialOutcome;

/// z-score of the two-sided 95% normal interval.
pub const Z_95: f64 = 1.96;

/// Magnitude above which values are rescaled before summing.
const RESCALE_ABOVE: f64 = 1e150;

/// One histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Lower edge (inclusive).
    pub lower: f64,
    /// Upper edge (exclusive, except for the last bin).
    pub upper: f64,
    /// Values that fell in the bin.
    pub count: usize,
}

/// Summary statistics for one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    /// Successful trials summarized.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (n - 1); 0 for a single value.
    pub stddev: f64,
    /// Sample variance.
    pub variance: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
    /// 95% confidence interval of the mean.
    pub confidence_interval: [f64; 2],
    /// Percentile label (e.g. `"50"`, `"2.5"`) to value, ascending.
    pub percentiles: IndexMap<String, f64>,
    /// Equal-width bins over `[min, max]`.
    pub histogram: Vec<HistogramBin>,
}

/// Reduces outcomes to per-output summaries.
#[derive(Debug, Clone)]
pub struct Aggregator {
    percentiles: Vec<f64>,
    bins: usize,
}

impl Aggregator {
    /// Create with sorted percentiles and a bin count of at least one.
    #[must_use]
    pub fn new(percentiles: Vec<f64>, bins: usize) -> Self {
        Self {
            percentiles,
            bins: bins.max(1),
        }
    }

    /// Summarize every output over the successful outcomes.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NoValidTrials`] if no outcome succeeded.
    pub fn aggregate(
        &self,
        output_names: &[String],
        outcomes: &[TrialOutcome],
    ) -> SimResult<IndexMap<String, OutputSummary>> {
        let successes: Vec<&[f64]> = outcomes
            .iter()
            .filter_map(|o| o.as_ref().ok())
            .map(|r| r.outputs.as_slice())
            .collect();
        if successes.is_empty() {
            return Err(SimError::NoValidTrials {
                attempted: outcomes.len(),
            });
        }

        let mut summaries = IndexMap::with_capacity(output_names.len());
        for (slot, name) in output_names.iter().enumerate() {
            let values: Vec<f64> = successes
                .iter()
                .map(|outputs| {
                    outputs.get(slot).copied().ok_or_else(|| {
                        SimError::internal(format!("trial is missing output '{name}'"))
                    })
                })
                .collect::<SimResult<_>>()?;
            summaries.insert(name.clone(), self.summarize_output(name, &values)?);
        }
        Ok(summaries)
    }

    /// Summarize one series of values, given in trial order.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::NoValidTrials`] for an empty series and
    /// [`SimError::NonFiniteStatistic`] when a statistic overflows.
    pub fn summarize(&self, values: &[f64]) -> SimResult<OutputSummary> {
        self.summarize_output("values", values)
    }

    fn summarize_output(&self, output: &str, values: &[f64]) -> SimResult<OutputSummary> {
        let count = values.len();
        if count == 0 {
            return Err(SimError::NoValidTrials { attempted: 0 });
        }
        let n = count as f64;

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let min = sorted[0];
        let max = sorted[count - 1];

        let (mean, stddev, variance) = moments(values, min, max);
        let half_width = Z_95 * stddev / n.sqrt();
        let confidence_interval = [mean - half_width, mean + half_width];

        let checks = [
            ("min", min),
            ("max", max),
            ("mean", mean),
            ("stddev", stddev),
            ("variance", variance),
            ("confidence_interval", confidence_interval[0]),
            ("confidence_interval", confidence_interval[1]),
        ];
        if let Some((statistic, _)) = checks.iter().copied().find(|(_, v)| !v.is_finite()) {
            return Err(SimError::NonFiniteStatistic {
                output: output.to_string(),
                statistic,
            });
        }

        let percentiles = self
            .percentiles
            .iter()
            .map(|&p| (percentile_label(p), percentile(&sorted, p)))
            .collect();

        Ok(OutputSummary {
            count,
            mean,
            stddev,
            variance,
            min,
            max,
            confidence_interval,
            percentiles,
            histogram: histogram(&sorted, min, max, self.bins),
        })
    }
}

/// Mean, sample standard deviation and sample variance, summed in trial order.
///
/// Series whose magnitude could overflow an `f64` sum are divided by a power
/// of two first, which is exact, and scaled back afterwards.
fn moments(values: &[f64], min: f64, max: f64) -> (f64, f64, f64) {
    if min == max {
        return (min, 0.0, 0.0);
    }
    let n = values.len() as f64;
    let magnitude = min.abs().max(max.abs());
    let scale = if magnitude > RESCALE_ABOVE {
        2f64.powi(magnitude.log2().floor() as i32)
    } else {
        1.0
    };

    let mean = values.iter().map(|v| v / scale).sum::<f64>() / n;
    let variance = if values.len() > 1 {
        values.iter().map(|v| (v / scale - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    (mean * scale, variance.sqrt() * scale, variance * scale * scale)
}

/// Percentile `p` (0 to 100) of ascending `sorted` by linear interpolation
/// between closest ranks.
#[must_use]
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let h = (n - 1) as f64 * p / 100.0;
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let value = sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]);
            // rounding must not push the result past the next rank
            value.max(sorted[lo]).min(sorted[hi])
        }
    }
}

/// Map key for a percentile: `50.0` is `"50"`, `2.5` is `"2.5"`.
#[must_use]
pub fn percentile_label(p: f64) -> String {
    format!("{p}")
}

/// Count `values` into `bins` equal-width bins over `[min, max]`.
///
/// The last bin is closed on the right. When `min == max` every value lands
/// in a single bin.
#[must_use]
pub fn histogram(values: &[f64], min: f64, max: f64, bins: usize) -> Vec<HistogramBin> {
    let span = max - min;
    if bins <= 1 || span <= 0.0 || !span.is_finite() {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let width = span / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = ((v - min) / width).floor();
        let idx = if idx.is_sign_negative() { 0 } else { (idx as usize).min(bins - 1) };
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + i as f64 * width,
            upper: if i + 1 == bins {
                max
            } else {
                min + (i + 1) as f64 * width
            },
            count,
        })
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Percentiles are non-decreasing in rank.
        #[test]
        fn prop_percentiles_monotonic(
            values in prop::collection::vec(-1e6f64..1e6, 1..200),
            mut ps in prop::collection::vec(0.0f64..=100.0, 1..10),
        ) {
            ps.sort_by(f64::total_cmp);
            let s = Aggregator::new(ps, 5).summarize(&values).unwrap();
            let got: Vec<f64> = s.percentiles.values().copied().collect();
            for pair in got.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
            prop_assert!(got[0] >= s.min);
            prop_assert!(got[got.len() - 1] <= s.max);
        }

        /// Histogram counts add up to the number of values.
        #[test]
        fn prop_histogram_counts_total(
            values in prop::collection::vec(-1e3f64..1e3, 1..300),
            bins in 1usize..50,
        ) {
            let s = Aggregator::new(vec![], bins).summarize(&values).unwrap();
            let total: usize = s.histogram.iter().map(|b| b.count).sum();
            prop_assert_eq!(total, values.len());
            prop_assert!(s.histogram.len() <= bins);
        }

        /// Mean lies within [min, max].
        #[test]
        fn prop_mean_bounded(values in prop::collection::vec(-1e6f64..1e6, 1..200)) {
            let s = Aggregator::new(vec![], 1).summarize(&values).unwrap();
            prop_assert!(s.mean >= s.min - 1e-6 && s.mean <= s.max + 1e-6);
            prop_assert!(s.variance >= 0.0);
        }
    }
}
