use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::analysis::WeekStats;
use crate::book::{LoanBook, StepOutcomes};
use crate::cohort::{Cohort, CohortGenerator, VolumeModel};
use crate::config::{DistortionParameters, SimulationConfig};
use crate::debt::DebtModel;
use crate::error::ConfigurationError;
use crate::policy::ScoreThreshold;
use crate::resolver;
use crate::segments::SegmentCatalog;
use crate::types::Week;

/// Everything one simulate step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub week: Week,
    pub threshold: f64,
    /// The cohort with every application labeled.
    pub cohort: Cohort,
    pub acceptance_rate: f64,
    /// Applications newly added to the book this step.
    pub accepted: usize,
    /// Book size after this step's acceptances.
    pub book_size: usize,
    pub outcomes: StepOutcomes,
}

/// The micro-loan business environment: one instance per episode.
///
/// Owns its random stream, so two instances built with the same seed and
/// driven with the same calls produce identical output, and cloning an
/// instance forks an independent copy of the stream.
#[derive(Debug, Clone)]
pub struct Simulation {
    seed: u64,
    distortions: DistortionParameters,
    /// Segment table after distortion.
    catalog: SegmentCatalog,
    generator: CohortGenerator,
    book: LoanBook,
    rng: ChaCha20Rng,
}

impl Simulation {
    /// Baseline segments and debt histogram, distorted by `distortions`.
    pub fn new(distortions: DistortionParameters, seed: u64) -> Result<Self, ConfigurationError> {
        Self::with_tables(distortions, SegmentCatalog::baseline(), DebtModel::historical(), seed)
    }

    /// Construct from a run config (custom tables included).
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Self::with_tables(config.distortions, config.catalog(), config.debt_model(), config.seed)
    }

    /// Validate every input up front; all violations are reported together.
    pub fn with_tables(
        distortions: DistortionParameters,
        base: SegmentCatalog,
        debt: DebtModel,
        seed: u64,
    ) -> Result<Self, ConfigurationError> {
        let mut violations = Vec::new();
        for result in [distortions.validate(), base.validate(), debt.validate()] {
            if let Err(e) = result {
                violations.extend(e.violations);
            }
        }
        ConfigurationError::check(violations)?;

        let catalog = base.distorted(&distortions);
        let generator =
            CohortGenerator::new(&catalog, &debt, VolumeModel::from_distortions(&distortions))?;

        info!(
            "simulation seed={seed}: {} new / {} repeat segments, e={}, ar_effect={}",
            catalog.new.len(),
            catalog.repeat.len(),
            distortions.e,
            distortions.ar_effect,
        );

        Ok(Simulation {
            seed,
            distortions,
            catalog,
            generator,
            book: LoanBook::new(),
            rng: ChaCha20Rng::seed_from_u64(seed),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn distortions(&self) -> &DistortionParameters {
        &self.distortions
    }

    pub fn catalog(&self) -> &SegmentCatalog {
        &self.catalog
    }

    pub fn book(&self) -> &LoanBook {
        &self.book
    }

    /// Generate this week's applications using the acceptance rate recorded
    /// by the previous [`simulate`](Self::simulate) call.
    pub fn generate_cohort(&mut self, week: Week) -> Cohort {
        self.generator.generate(week, self.book.feedback(), &mut self.rng)
    }

    /// Label `cohort` at `threshold`, book the accepted applications, record
    /// the acceptance rate as feedback and resolve the outcomes due in `week`.
    pub fn simulate(&mut self, week: Week, mut cohort: Cohort, threshold: f64) -> StepReport {
        let acceptance_rate = ScoreThreshold::new(threshold).label(&mut cohort);
        self.book.set_acceptance_rate(acceptance_rate);
        let accepted = self.book.extend_accepted(&cohort);
        let outcomes = resolver::resolve(&self.book, week);

        debug!(
            "week {week}: {} applications, {accepted} accepted (rate {acceptance_rate:.3}), \
             matured={} defaulted={} repaid_after_default={} fully_paid={} book={}",
            cohort.len(),
            outcomes.matured.len(),
            outcomes.defaulted.len(),
            outcomes.repaid_after_default.len(),
            outcomes.fully_paid.len(),
            self.book.len(),
        );

        StepReport {
            week,
            threshold,
            cohort,
            acceptance_rate,
            accepted,
            book_size: self.book.len(),
            outcomes,
        }
    }

    /// Generate and simulate one week.
    pub fn step(&mut self, week: Week, threshold: f64) -> StepReport {
        let cohort = self.generate_cohort(week);
        self.simulate(week, cohort, threshold)
    }

    /// Run weeks 1..=`weeks` at a fixed threshold, handing every report to `on_step`.
    pub fn run_with<F>(&mut self, weeks: u32, threshold: f64, mut on_step: F) -> Vec<WeekStats>
    where
        F: FnMut(&StepReport),
    {
        (1..=weeks)
            .map(|w| {
                let report = self.step(Week(w), threshold);
                on_step(&report);
                WeekStats::from_report(&report)
            })
            .collect()
    }

    pub fn run(&mut self, weeks: u32, threshold: f64) -> Vec<WeekStats> {
        self.run_with(weeks, threshold, |_| {})
    }
}
