//! Distribution summaries for the end-of-run report.

use serde::{Deserialize, Serialize};

/// Shape of one quantity over a run, e.g. how long survivors lived.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub p99: f64,
}

/// Samples kept in ascending order as they arrive.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    sorted: Vec<f64>,
    total: f64,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// NaN samples are ignored.
    pub fn push(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        let at = self.sorted.partition_point(|v| *v <= value);
        self.sorted.insert(at, value);
        self.total += value;
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Linear interpolation between the closest ranks; `q` in `[0, 1]`.
    pub fn quantile(&self, q: f64) -> f64 {
        let n = self.sorted.len();
        if n == 0 {
            return 0.0;
        }
        let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = pos - lo as f64;
        self.sorted[lo] + (self.sorted[hi] - self.sorted[lo]) * frac
    }

    pub fn summary(&self) -> MetricSummary {
        let (Some(&min), Some(&max)) = (self.sorted.first(), self.sorted.last()) else {
            return MetricSummary::default();
        };
        MetricSummary {
            count: self.sorted.len(),
            min,
            max,
            mean: self.total / self.sorted.len() as f64,
            median: self.quantile(0.5),
            p90: self.quantile(0.9),
            p99: self.quantile(0.99),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifespans_summarise_with_interpolated_quantiles() {
        let mut ages = SampleSet::new();
        for age in [40.0, 10.0, 30.0, 20.0, 50.0] {
            ages.push(age);
        }
        let s = ages.summary();
        assert_eq!(s.count, 5);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 50.0);
        assert!((s.mean - 30.0).abs() < 1e-9);
        assert_eq!(s.median, 30.0);
        assert!((s.p90 - 46.0).abs() < 1e-9);
    }

    #[test]
    fn single_sample_is_every_quantile() {
        let mut ages = SampleSet::new();
        ages.push(12.5);
        let s = ages.summary();
        assert_eq!((s.min, s.median, s.p99, s.max), (12.5, 12.5, 12.5, 12.5));
    }

    #[test]
    fn empty_and_nan() {
        let mut ages = SampleSet::new();
        ages.push(f64::NAN);
        assert!(ages.is_empty());
        assert_eq!(ages.summary(), MetricSummary::default());
    }
}
