use serde::{Deserialize, Serialize};

use crate::config::DistortionParameters;
use crate::error::{ConfigurationError, Violation};
use crate::types::PopulationClass;

/// Normal score distribution for one outcome group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub mean: f64,
    pub std_dev: f64,
}

/// Credit-score model performance for a segment, split by eventual outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreProfile {
    /// Applicants who go on to default.
    pub will_default: ScoreDistribution,
    /// Applicants who repay on time.
    pub will_repay: ScoreDistribution,
}

impl ScoreProfile {
    /// Distance between the two outcome means (repay mean − default mean).
    pub fn mean_gap(&self) -> f64 {
        self.will_repay.mean - self.will_default.mean
    }

    pub fn for_outcome(&self, defaulted: bool) -> ScoreDistribution {
        if defaulted { self.will_default } else { self.will_repay }
    }
}

/// One population stratum with its own statistical profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: u32,
    pub class: PopulationClass,
    /// Relative application frequency within the class (normalized before sampling).
    pub frequency_weight: f64,
    /// Share of total loan volume among all applications.
    pub volume_weight: f64,
    /// Probability of the loan going severely overdue.
    pub default_probability: f64,
    pub score: ScoreProfile,
    pub average_sum: f64,
    pub average_duration_days: f64,
    pub average_loan_count: f64,
    /// Probability of repaying after having defaulted.
    pub late_payment_probability: f64,
    pub expected_profit: f64,
}

/// Minimum loan duration that still matures at least one week after origin.
pub const MIN_DURATION_DAYS: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCatalog {
    pub new: Vec<Segment>,
    pub repeat: Vec<Segment>,
}

impl SegmentCatalog {
    /// Baseline segment estimates before any distortion.
    /// New clients: 6 segments. Repeat clients: 42 segments (18 frequent, 24 rare).
    pub fn baseline() -> Self {
        // ── New clients ─────────────────────────────────────────────────────
        let new_score = ScoreProfile {
            will_default: ScoreDistribution { mean: 60.0, std_dev: 10.0 },
            will_repay: ScoreDistribution { mean: 40.0, std_dev: 10.0 },
        };
        let new_weights = [0.2, 0.2, 0.2, 0.2, 0.1, 0.1];
        let new = new_weights
            .iter()
            .enumerate()
            .map(|(i, &w)| Segment {
                id: i as u32 + 1,
                class: PopulationClass::New,
                frequency_weight: w,
                volume_weight: w,
                default_probability: 0.1,
                score: new_score,
                average_sum: 1000.0,
                average_duration_days: 30.0,
                average_loan_count: 1.0,
                late_payment_probability: 0.5,
                expected_profit: 100.0,
            })
            .collect::<Vec<_>>();

        // ── Repeat clients ──────────────────────────────────────────────────
        let repeat_score = ScoreProfile {
            will_default: ScoreDistribution { mean: 65.0, std_dev: 10.0 },
            will_repay: ScoreDistribution { mean: 45.0, std_dev: 10.0 },
        };
        let first_repeat_id = new.len() as u32 + 1;
        let repeat = (0..42u32)
            .map(|i| {
                let w = if i < 18 { 0.05 } else { 0.02 };
                Segment {
                    id: first_repeat_id + i,
                    class: PopulationClass::Repeat,
                    frequency_weight: w,
                    volume_weight: w,
                    default_probability: 0.05,
                    score: repeat_score,
                    average_sum: 1500.0,
                    average_duration_days: 45.0,
                    average_loan_count: 2.0,
                    late_payment_probability: 0.6,
                    expected_profit: 150.0,
                }
            })
            .collect();

        SegmentCatalog { new, repeat }
    }

    pub fn segments(&self, class: PopulationClass) -> &[Segment] {
        match class {
            PopulationClass::New => &self.new,
            PopulationClass::Repeat => &self.repeat,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.new.iter().chain(self.repeat.iter())
    }

    /// Apply distortions to every segment and return the distorted table.
    ///
    /// Score means move by `bias × gap`, where the gap is measured on the
    /// undistorted segment. Probabilities are scaled by `1 + bias` and then
    /// clamped to [0, 1]; the clamp is silent, out-of-range biases are
    /// rejected earlier by [`DistortionParameters::validate`].
    pub fn distorted(&self, d: &DistortionParameters) -> Self {
        let distort = |segments: &[Segment], positives: f64, negatives: f64, default_bias: f64| {
            segments
                .iter()
                .map(|s| {
                    let gap = s.score.mean_gap();
                    let mut out = s.clone();
                    out.score.will_default.mean += positives * gap;
                    out.score.will_repay.mean -= negatives * gap;
                    out.default_probability = scale_probability(s.default_probability, default_bias);
                    out.late_payment_probability =
                        scale_probability(s.late_payment_probability, d.late_payment_rate_bias);
                    out
                })
                .collect::<Vec<_>>()
        };

        SegmentCatalog {
            new: distort(
                &self.new,
                d.new_positives_score_bias,
                d.new_negatives_score_bias,
                d.new_default_rate_bias,
            ),
            repeat: distort(
                &self.repeat,
                d.repeat_positives_score_bias,
                d.repeat_negatives_score_bias,
                d.repeat_default_rate_bias,
            ),
        }
    }

    /// Normalized frequency weights for a class. Empty if the weights sum to zero.
    pub fn normalized_weights(&self, class: PopulationClass) -> Vec<f64> {
        let segments = self.segments(class);
        let total: f64 = segments.iter().map(|s| s.frequency_weight).sum();
        if total <= 0.0 {
            return Vec::new();
        }
        segments.iter().map(|s| s.frequency_weight / total).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();
        for class in PopulationClass::ALL {
            let segments = self.segments(class);
            let prefix = format!("segments.{class}");
            if segments.is_empty() {
                violations.push(Violation::new(prefix.clone(), 0.0, "class needs at least one segment"));
                continue;
            }
            let total: f64 = segments.iter().map(|s| s.frequency_weight).sum();
            if !(total > 0.0) {
                violations.push(Violation::new(
                    format!("{prefix}.frequency_weight"),
                    total,
                    "weights must have a positive sum",
                ));
            }
            for (i, s) in segments.iter().enumerate() {
                validate_segment(s, &format!("{prefix}[{i}]"), &mut violations);
            }
        }
        ConfigurationError::check(violations)
    }
}

impl Default for SegmentCatalog {
    fn default() -> Self {
        Self::baseline()
    }
}

fn scale_probability(p: f64, bias: f64) -> f64 {
    (p * (1.0 + bias)).clamp(0.0, 1.0)
}

fn validate_segment(s: &Segment, path: &str, out: &mut Vec<Violation>) {
    let mut require = |field: &str, value: f64, ok: bool, reason: &'static str| {
        if !ok {
            out.push(Violation::new(format!("{path}.{field}"), value, reason));
        }
    };

    let nonneg = |v: f64| v.is_finite() && v >= 0.0;
    let probability = |v: f64| (0.0..=1.0).contains(&v);

    require("frequency_weight", s.frequency_weight, nonneg(s.frequency_weight), "must be finite and >= 0");
    require("volume_weight", s.volume_weight, nonneg(s.volume_weight), "must be finite and >= 0");
    require(
        "default_probability",
        s.default_probability,
        probability(s.default_probability),
        "must lie in [0, 1]",
    );
    require(
        "late_payment_probability",
        s.late_payment_probability,
        probability(s.late_payment_probability),
        "must lie in [0, 1]",
    );
    for (name, dist) in [("will_default", s.score.will_default), ("will_repay", s.score.will_repay)] {
        require(&format!("score.{name}.mean"), dist.mean, dist.mean.is_finite(), "must be finite");
        require(
            &format!("score.{name}.std_dev"),
            dist.std_dev,
            nonneg(dist.std_dev),
            "must be finite and >= 0",
        );
    }
    require("average_sum", s.average_sum, nonneg(s.average_sum), "must be finite and >= 0");
    require(
        "average_duration_days",
        s.average_duration_days,
        s.average_duration_days.is_finite() && s.average_duration_days >= MIN_DURATION_DAYS,
        "must be >= 4 days so the loan matures after origin",
    );
    require(
        "average_loan_count",
        s.average_loan_count,
        nonneg(s.average_loan_count),
        "must be finite and >= 0",
    );
    require("expected_profit", s.expected_profit, s.expected_profit.is_finite(), "must be finite");
}
