//! Weekly cohort generation.
//!
//! Volume follows a deterministic trend per population class plus Gaussian
//! noise; after the trend break the observed acceptance rate feeds back into
//! the trend. Each applicant is drawn from a segment of its class, then its
//! outcome (default, late payment) is drawn first and the credit score is
//! sampled conditional on that outcome.

use std::io::Write;

use log::{trace, warn};
use rand::Rng;
use rand::distr::weighted::WeightedIndex;
use rand::distr::{Bernoulli, Distribution};
use rand_distr::{Normal, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::book::Feedback;
use crate::config::DistortionParameters;
use crate::debt::{DebtModel, DebtSampler};
use crate::error::{ConfigurationError, SimResult, Violation};
use crate::segments::{Segment, SegmentCatalog};
use crate::types::{ApplicationId, PopulationClass, Week};

/// Week at which the volume trend changes shape and feedback switches on.
pub const TREND_BREAK_WEEK: u32 = 50;
/// Acceptance rate the volume trend was calibrated against.
pub const HISTORICAL_ACCEPTANCE_RATE: f64 = 0.5;
pub const NEW_FEEDBACK_COEFFICIENT: f64 = 0.1;
pub const REPEAT_FEEDBACK_COEFFICIENT: f64 = 0.1;
/// Standard deviation of weekly volume noise before scaling by `e`.
pub const VOLUME_NOISE_STD: f64 = 10.0;
/// New volume used when the noisy forecast is not positive.
pub const MIN_NEW_VOLUME: f64 = 10.0;
/// Per-class ceiling on weekly applications. Larger draws are clamped.
pub const MAX_CLASS_VOLUME: u32 = 100_000;
/// Weeks from maturation to the default (collections) event.
pub const DEFAULT_LAG_WEEKS: u32 = 10;
/// Late payment lands 1..=30 weeks after maturation.
pub const LATE_PAYMENT_MAX_LAG_WEEKS: u32 = 30;
/// Default probability used when a segment's value cannot parameterize a Bernoulli trial.
pub const FALLBACK_DEFAULT_PROBABILITY: f64 = 0.1;

/// One generated loan request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub segment_id: u32,
    /// Week the application was received.
    pub origin: Week,
    pub maturation_at: Week,
    pub class: PopulationClass,
    pub sum: u64,
    /// Loan duration in days.
    pub duration: u32,
    /// Outstanding debt at application time.
    pub debt: u32,
    pub score: f64,
    pub defaulted: bool,
    pub default_at: Option<Week>,
    pub late_payment: bool,
    pub late_payment_at: Option<Week>,
    pub profit: f64,
    pub expected_loan_count: f64,
    /// Set by the acceptance policy; `None` until labeled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
}

impl Application {
    pub fn is_repeat(&self) -> bool {
        self.class.is_repeat()
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted == Some(true)
    }
}

/// All applications generated for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cohort {
    pub week: Week,
    pub applications: Vec<Application>,
}

impl Cohort {
    pub fn empty(week: Week) -> Self {
        Cohort { week, applications: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Application> {
        self.applications.iter()
    }

    pub fn count(&self, class: PopulationClass) -> usize {
        self.applications.iter().filter(|a| a.class == class).count()
    }

    pub fn accepted(&self) -> impl Iterator<Item = &Application> {
        self.applications.iter().filter(|a| a.is_accepted())
    }

    /// Write the cohort as CSV, one row per application. Null event times are empty cells.
    pub fn write_csv<W: Write>(&self, w: W) -> SimResult<()> {
        let mut wtr = csv::Writer::from_writer(w);
        for a in &self.applications {
            wtr.serialize(ApplicationRow::from(a))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Flat CSV view of an [`Application`].
#[derive(Debug, Serialize)]
struct ApplicationRow<'a> {
    id: &'a ApplicationId,
    iteration: Week,
    maturation_at: Week,
    is_repeat: bool,
    sum: u64,
    duration: u32,
    debt: u32,
    score: f64,
    defaulted: bool,
    default_at: Option<Week>,
    late_payment: bool,
    late_payment_at: Option<Week>,
    profit: f64,
    accepted: Option<bool>,
}

impl<'a> From<&'a Application> for ApplicationRow<'a> {
    fn from(a: &'a Application) -> Self {
        ApplicationRow {
            id: &a.id,
            iteration: a.origin,
            maturation_at: a.maturation_at,
            is_repeat: a.is_repeat(),
            sum: a.sum,
            duration: a.duration,
            debt: a.debt,
            score: a.score,
            defaulted: a.defaulted,
            default_at: a.default_at,
            late_payment: a.late_payment,
            late_payment_at: a.late_payment_at,
            profit: a.profit,
            accepted: a.accepted,
        }
    }
}

/// Expected weekly application volume and its noisy realisation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeModel {
    /// Noise coefficient `e`.
    pub noise: f64,
    pub ar_effect: f64,
}

/// Realised application counts for one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Volumes {
    pub new: u32,
    pub repeat: u32,
}

impl VolumeModel {
    pub fn from_distortions(d: &DistortionParameters) -> Self {
        VolumeModel { noise: d.e, ar_effect: d.ar_effect }
    }

    fn feedback_term(&self, t: f64, feedback: Feedback, coefficient: f64) -> f64 {
        (feedback.acceptance_rate - HISTORICAL_ACCEPTANCE_RATE)
            * coefficient
            * (t - TREND_BREAK_WEEK as f64)
            * self.ar_effect
    }

    /// Noise-free new-client volume.
    pub fn expected_new(&self, week: Week, feedback: Feedback) -> f64 {
        let t = week.as_f64();
        if week.0 <= TREND_BREAK_WEEK {
            10.0 * t - 0.1 * t.powi(2)
        } else {
            100.0 + 2.0 * t - 0.05 * t.powi(2) + self.feedback_term(t, feedback, NEW_FEEDBACK_COEFFICIENT)
        }
    }

    /// Noise-free repeat-client volume given the realised new volume.
    pub fn expected_repeat(&self, week: Week, new_volume: f64, feedback: Feedback) -> f64 {
        let t = week.as_f64();
        if week.0 <= TREND_BREAK_WEEK {
            5.0 * t - 0.05 * t.powi(2) - 0.001 * t.powi(3) + 0.5 * new_volume
        } else {
            50.0 + t - 0.02 * t.powi(2) + 0.0005 * t.powi(3)
                + 0.5 * new_volume
                + self.feedback_term(t, feedback, REPEAT_FEEDBACK_COEFFICIENT)
        }
    }

    fn noise(&self, rng: &mut impl Rng) -> f64 {
        let z: f64 = rng.sample(StandardNormal);
        z * VOLUME_NOISE_STD * self.noise
    }

    /// Draw this week's application counts. Both noise terms are always drawn
    /// so the random stream does not depend on `e`.
    pub fn draw(&self, week: Week, feedback: Feedback, rng: &mut impl Rng) -> Volumes {
        let mut new = self.expected_new(week, feedback) + self.noise(rng);
        if new <= 0.0 {
            new = MIN_NEW_VOLUME;
        }
        let repeat = (self.expected_repeat(week, new, feedback) + self.noise(rng)).max(0.0);
        trace!("week {week}: volume new={new:.2} repeat={repeat:.2}");
        let cap = f64::from(MAX_CLASS_VOLUME);
        if new > cap || repeat > cap {
            warn!("week {week}: volume new={new:.0} repeat={repeat:.0} clamped to {MAX_CLASS_VOLUME} per class");
        }
        Volumes { new: new.min(cap) as u32, repeat: repeat.min(cap) as u32 }
    }
}

/// Pre-built samplers for one segment.
#[derive(Debug, Clone)]
struct SegmentSampler {
    segment: Segment,
    default: Bernoulli,
    late: Bernoulli,
    will_default: Normal<f64>,
    will_repay: Normal<f64>,
    maturity_weeks: u32,
}

impl SegmentSampler {
    fn new(segment: &Segment, path: &str, violations: &mut Vec<Violation>) -> Option<Self> {
        let default = match Bernoulli::new(segment.default_probability) {
            Ok(b) => b,
            Err(_) => {
                warn!(
                    "{path}: default probability {} is not a probability, falling back to {FALLBACK_DEFAULT_PROBABILITY}",
                    segment.default_probability
                );
                Bernoulli::new(FALLBACK_DEFAULT_PROBABILITY).ok()?
            }
        };
        let late = Bernoulli::new(segment.late_payment_probability)
            .map_err(|_| {
                violations.push(Violation::new(
                    format!("{path}.late_payment_probability"),
                    segment.late_payment_probability,
                    "must lie in [0, 1]",
                ))
            })
            .ok();
        let normal = |name: &str, mean: f64, std_dev: f64, violations: &mut Vec<Violation>| {
            Normal::new(mean, std_dev)
                .map_err(|_| {
                    violations.push(Violation::new(
                        format!("{path}.score.{name}.std_dev"),
                        std_dev,
                        "must be finite and >= 0",
                    ))
                })
                .ok()
        };
        let s = segment.score;
        let will_default = normal("will_default", s.will_default.mean, s.will_default.std_dev, violations);
        let will_repay = normal("will_repay", s.will_repay.mean, s.will_repay.std_dev, violations);

        let maturity_weeks = (segment.average_duration_days / Week::DAYS_PER_WEEK).round();
        if !(maturity_weeks >= 1.0) {
            violations.push(Violation::new(
                format!("{path}.average_duration_days"),
                segment.average_duration_days,
                "must be >= 4 days so the loan matures after origin",
            ));
            return None;
        }

        Some(SegmentSampler {
            segment: segment.clone(),
            default,
            late: late?,
            will_default: will_default?,
            will_repay: will_repay?,
            maturity_weeks: maturity_weeks as u32,
        })
    }
}

#[derive(Debug, Clone)]
struct ClassSampler {
    class: PopulationClass,
    segments: Vec<SegmentSampler>,
    index: WeightedIndex<f64>,
}

/// Produces the weekly cohort of new and repeat applications.
#[derive(Debug, Clone)]
pub struct CohortGenerator {
    volume: VolumeModel,
    debt: DebtSampler,
    new: ClassSampler,
    repeat: ClassSampler,
}

impl CohortGenerator {
    /// Build samplers for an already-distorted catalog.
    pub fn new(
        catalog: &SegmentCatalog,
        debt: &DebtModel,
        volume: VolumeModel,
    ) -> Result<Self, ConfigurationError> {
        let mut violations = Vec::new();
        let debt = match debt.sampler() {
            Ok(s) => Some(s),
            Err(e) => {
                violations.extend(e.violations);
                None
            }
        };
        let new = class_sampler(catalog, PopulationClass::New, &mut violations);
        let repeat = class_sampler(catalog, PopulationClass::Repeat, &mut violations);
        match (debt, new, repeat) {
            (Some(debt), Some(new), Some(repeat)) if violations.is_empty() => {
                Ok(CohortGenerator { volume, debt, new, repeat })
            }
            _ => Err(ConfigurationError { violations }),
        }
    }

    /// Generate all applications for `week`. `feedback` carries the acceptance
    /// rate observed at the previous simulate step.
    pub fn generate(&self, week: Week, feedback: Feedback, rng: &mut impl Rng) -> Cohort {
        let volumes = self.volume.draw(week, feedback, rng);
        let mut applications = Vec::with_capacity(volumes.new as usize + volumes.repeat as usize);
        self.generate_class(&self.new, week, volumes.new, rng, &mut applications);
        self.generate_class(&self.repeat, week, volumes.repeat, rng, &mut applications);
        Cohort { week, applications }
    }

    fn generate_class(
        &self,
        sampler: &ClassSampler,
        week: Week,
        count: u32,
        rng: &mut impl Rng,
        out: &mut Vec<Application>,
    ) {
        for seq in 1..=count {
            let seg = &sampler.segments[sampler.index.sample(rng)];
            let debt = self.debt.sample(rng);
            let defaulted = seg.default.sample(rng);
            let late_payment = defaulted && seg.late.sample(rng);
            let score = if defaulted { seg.will_default.sample(rng) } else { seg.will_repay.sample(rng) };

            let maturation_at = week.offset(seg.maturity_weeks);
            let default_at = defaulted.then(|| maturation_at.offset(DEFAULT_LAG_WEEKS));
            let late_payment_at = late_payment
                .then(|| maturation_at.offset(rng.random_range(1..=LATE_PAYMENT_MAX_LAG_WEEKS)));

            out.push(Application {
                id: ApplicationId::new(sampler.class, week, seq),
                segment_id: seg.segment.id,
                origin: week,
                maturation_at,
                class: sampler.class,
                sum: seg.segment.average_sum.round() as u64,
                duration: seg.segment.average_duration_days.round() as u32,
                debt,
                score,
                defaulted,
                default_at,
                late_payment,
                late_payment_at,
                profit: seg.segment.expected_profit,
                expected_loan_count: seg.segment.average_loan_count,
                accepted: None,
            });
        }
    }
}

fn class_sampler(
    catalog: &SegmentCatalog,
    class: PopulationClass,
    violations: &mut Vec<Violation>,
) -> Option<ClassSampler> {
    let segments = catalog.segments(class);
    let weights = catalog.normalized_weights(class);
    let index = match WeightedIndex::new(&weights) {
        Ok(index) => Some(index),
        Err(_) => {
            violations.push(Violation::new(
                format!("segments.{class}.frequency_weight"),
                segments.iter().map(|s| s.frequency_weight).sum(),
                "weights must be finite, >= 0 and have a positive sum",
            ));
            None
        }
    };
    let samplers: Vec<SegmentSampler> = segments
        .iter()
        .enumerate()
        .filter_map(|(i, s)| SegmentSampler::new(s, &format!("segments.{class}[{i}]"), violations))
        .collect();
    if samplers.len() != segments.len() {
        return None;
    }
    Some(ClassSampler { class, segments: samplers, index: index? })
}
