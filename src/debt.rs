use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Violation};

/// Discretized historical distribution of applicants' outstanding debt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtModel {
    /// Lower edge of each debt bucket (currency units).
    pub buckets: Vec<u32>,
    /// Probability mass per bucket; need not be normalized.
    pub weights: Vec<f64>,
}

impl DebtModel {
    /// 28 buckets of 100 from 0 to 2700. The first four carry 10% each,
    /// the next four 5%, the remaining twenty 2%.
    pub fn historical() -> Self {
        let buckets = (0..28u32).map(|i| i * 100).collect();
        let weights = (0..28)
            .map(|i| match i {
                0..=3 => 0.1,
                4..=7 => 0.05,
                _ => 0.02,
            })
            .collect();
        DebtModel { buckets, weights }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();
        if self.buckets.is_empty() {
            violations.push(Violation::new("debt.buckets", 0.0, "need at least one bucket"));
        }
        if self.buckets.len() != self.weights.len() {
            violations.push(Violation::new(
                "debt.weights",
                self.weights.len() as f64,
                "need exactly one weight per bucket",
            ));
        }
        for (i, &w) in self.weights.iter().enumerate() {
            if !(w.is_finite() && w >= 0.0) {
                violations.push(Violation::new(format!("debt.weights[{i}]"), w, "must be finite and >= 0"));
            }
        }
        let total: f64 = self.weights.iter().sum();
        if !self.weights.is_empty() && !(total > 0.0) {
            violations.push(Violation::new("debt.weights", total, "weights must have a positive sum"));
        }
        ConfigurationError::check(violations)
    }

    /// Build the categorical sampler for this histogram.
    pub fn sampler(&self) -> Result<DebtSampler, ConfigurationError> {
        self.validate()?;
        let index = WeightedIndex::new(&self.weights).map_err(|_| ConfigurationError {
            violations: vec![Violation::new("debt.weights", 0.0, "not a valid distribution")],
        })?;
        Ok(DebtSampler { buckets: self.buckets.clone(), index })
    }
}

impl Default for DebtModel {
    fn default() -> Self {
        Self::historical()
    }
}

/// Pre-built categorical sampler over debt buckets.
#[derive(Debug, Clone)]
pub struct DebtSampler {
    buckets: Vec<u32>,
    index: WeightedIndex<f64>,
}

impl DebtSampler {
    pub fn sample(&self, rng: &mut impl Rng) -> u32 {
        self.buckets[self.index.sample(rng)]
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn historical_has_28_buckets_summing_to_one() {
        let m = DebtModel::historical();
        assert_eq!(m.buckets.len(), 28);
        assert_eq!(m.buckets.first(), Some(&0));
        assert_eq!(m.buckets.last(), Some(&2700));
        let total: f64 = m.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "total mass {total}");
    }

    #[test]
    fn samples_land_on_bucket_edges() {
        let sampler = DebtModel::historical().sampler().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        for _ in 0..1_000 {
            let d = sampler.sample(&mut rng);
            assert_eq!(d % 100, 0);
            assert!(d <= 2700);
        }
    }

    /// 40% of the mass sits in the first four buckets (debt < 400).
    /// 20k draws must land within ±2 percentage points of that.
    #[test]
    fn low_debt_share_matches_histogram() {
        let sampler = DebtModel::historical().sampler().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let n = 20_000;
        let low = (0..n).filter(|_| sampler.sample(&mut rng) < 400).count();
        let share = low as f64 / n as f64;
        assert!((share - 0.4).abs() < 0.02, "low-debt share {share:.3}");
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let m = DebtModel { buckets: vec![0, 100], weights: vec![1.0] };
        let err = m.sampler().unwrap_err();
        assert!(err.mentions("debt.weights"));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let m = DebtModel { buckets: vec![0, 100], weights: vec![1.0, -0.5] };
        let err = m.validate().unwrap_err();
        assert!(err.mentions("debt.weights[1]"));
    }
}
