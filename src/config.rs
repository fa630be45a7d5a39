use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::debt::DebtModel;
use crate::error::{ConfigurationError, SimResult, Violation};
use crate::segments::SegmentCatalog;

/// Parametrized perturbation of the baseline environment.
///
/// Every field defaults to the neutral value: unit noise, no bias, no
/// acceptance-rate feedback. Immutable for the life of a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistortionParameters {
    /// Noise coefficient applied to the weekly volume noise.
    pub e: f64,
    /// Shift of the will-default score mean for new clients, in units of the score gap.
    pub new_positives_score_bias: f64,
    pub repeat_positives_score_bias: f64,
    /// Shift of the will-repay score mean for new clients, in units of the score gap.
    pub new_negatives_score_bias: f64,
    pub repeat_negatives_score_bias: f64,
    /// Relative change in segment default probability.
    pub new_default_rate_bias: f64,
    pub repeat_default_rate_bias: f64,
    /// Relative change in late-payment probability (both classes).
    pub late_payment_rate_bias: f64,
    /// Strength of the acceptance-rate feedback on application volume.
    pub ar_effect: f64,
}

impl Default for DistortionParameters {
    fn default() -> Self {
        DistortionParameters {
            e: 1.0,
            new_positives_score_bias: 0.0,
            repeat_positives_score_bias: 0.0,
            new_negatives_score_bias: 0.0,
            repeat_negatives_score_bias: 0.0,
            new_default_rate_bias: 0.0,
            repeat_default_rate_bias: 0.0,
            late_payment_rate_bias: 0.0,
            ar_effect: 0.0,
        }
    }
}

impl DistortionParameters {
    /// Neutral parameters with the volume noise switched off.
    pub fn noiseless() -> Self {
        DistortionParameters { e: 0.0, ..Default::default() }
    }

    fn fields(&self) -> [(&'static str, f64); 9] {
        [
            ("e", self.e),
            ("new_positives_score_bias", self.new_positives_score_bias),
            ("repeat_positives_score_bias", self.repeat_positives_score_bias),
            ("new_negatives_score_bias", self.new_negatives_score_bias),
            ("repeat_negatives_score_bias", self.repeat_negatives_score_bias),
            ("new_default_rate_bias", self.new_default_rate_bias),
            ("repeat_default_rate_bias", self.repeat_default_rate_bias),
            ("late_payment_rate_bias", self.late_payment_rate_bias),
            ("ar_effect", self.ar_effect),
        ]
    }

    /// Reject values that cannot describe a valid environment.
    ///
    /// Rate biases below −1 would scale a probability below zero. Biases that
    /// push a probability above one are accepted and clamped at distortion time.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();
        for (name, value) in self.fields() {
            if !value.is_finite() {
                violations.push(Violation::new(format!("distortions.{name}"), value, "must be finite"));
            }
        }
        if self.e < 0.0 {
            violations.push(Violation::new("distortions.e", self.e, "must be >= 0"));
        } else if self.e > MAX_NOISE_SCALE {
            violations.push(Violation::new("distortions.e", self.e, "must be <= 100"));
        }
        for (name, value) in [
            ("new_default_rate_bias", self.new_default_rate_bias),
            ("repeat_default_rate_bias", self.repeat_default_rate_bias),
            ("late_payment_rate_bias", self.late_payment_rate_bias),
        ] {
            if value < -1.0 {
                violations.push(Violation::new(
                    format!("distortions.{name}"),
                    value,
                    "must be >= -1 or the scaled probability turns negative",
                ));
            }
        }
        ConfigurationError::check(violations)
    }
}

/// Largest accepted noise coefficient `e`.
pub const MAX_NOISE_SCALE: f64 = 100.0;

/// Complete description of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Episode length in weeks.
    pub weeks: u32,
    /// Minimum credit score for acceptance.
    pub threshold: f64,
    pub distortions: DistortionParameters,
    /// Replaces the baseline segment table when set. Distortions still apply.
    pub segments: Option<SegmentCatalog>,
    /// Replaces the historical debt histogram when set.
    pub debt: Option<DebtModel>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::canonical()
    }
}

impl SimulationConfig {
    pub fn canonical() -> Self {
        SimulationConfig {
            seed: 42,
            weeks: 100,
            threshold: 50.0,
            distortions: DistortionParameters::default(),
            segments: None,
            debt: None,
        }
    }

    /// Load a config from JSON. Missing fields take their canonical values.
    pub fn from_json_file(path: impl AsRef<Path>) -> SimResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: SimulationConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn catalog(&self) -> SegmentCatalog {
        self.segments.clone().unwrap_or_else(SegmentCatalog::baseline)
    }

    pub fn debt_model(&self) -> DebtModel {
        self.debt.clone().unwrap_or_else(DebtModel::historical)
    }

    /// Validate run-level fields plus everything nested; all violations are reported together.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut violations = Vec::new();
        if self.weeks == 0 {
            violations.push(Violation::new("weeks", 0.0, "must be >= 1"));
        }
        if !self.threshold.is_finite() {
            violations.push(Violation::new("threshold", self.threshold, "must be finite"));
        }
        let nested = [
            self.distortions.validate(),
            self.segments.as_ref().map_or(Ok(()), SegmentCatalog::validate),
            self.debt.as_ref().map_or(Ok(()), DebtModel::validate),
        ];
        for result in nested {
            if let Err(e) = result {
                violations.extend(e.violations);
            }
        }
        ConfigurationError::check(violations)
    }
}
