use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use loansim::book::{Feedback, LoanBook};
use loansim::cohort::{CohortGenerator, VolumeModel};
use loansim::config::DistortionParameters;
use loansim::debt::DebtModel;
use loansim::policy::ScoreThreshold;
use loansim::segments::SegmentCatalog;
use loansim::simulation::Simulation;
use loansim::types::Week;

pub struct Scenario {
    pub distortions: DistortionParameters,
    pub threshold: f64,
}

pub const NEUTRAL: Scenario = Scenario {
    distortions: DistortionParameters {
        e: 1.0,
        new_positives_score_bias: 0.0,
        repeat_positives_score_bias: 0.0,
        new_negatives_score_bias: 0.0,
        repeat_negatives_score_bias: 0.0,
        new_default_rate_bias: 0.0,
        repeat_default_rate_bias: 0.0,
        late_payment_rate_bias: 0.0,
        ar_effect: 0.0,
    },
    threshold: 50.0,
};

/// Loose threshold with strong acceptance-rate feedback: volume grows after the break.
pub const FEEDBACK: Scenario = Scenario {
    distortions: DistortionParameters { ar_effect: 20.0, ..NEUTRAL.distortions },
    threshold: 40.0,
};

/// Every score and rate distortion switched on.
pub const DISTORTED: Scenario = Scenario {
    distortions: DistortionParameters {
        e: 2.0,
        new_positives_score_bias: -0.3,
        repeat_positives_score_bias: -0.2,
        new_negatives_score_bias: 0.3,
        repeat_negatives_score_bias: 0.2,
        new_default_rate_bias: 0.5,
        repeat_default_rate_bias: 0.5,
        late_payment_rate_bias: -0.5,
        ar_effect: 5.0,
    },
    threshold: 55.0,
};

pub fn build_simulation(scenario: &Scenario, seed: u64) -> Simulation {
    Simulation::new(scenario.distortions, seed).expect("bench scenario must validate")
}

pub fn baseline_generator() -> CohortGenerator {
    let d = DistortionParameters::default();
    CohortGenerator::new(
        &SegmentCatalog::baseline(),
        &DebtModel::historical(),
        VolumeModel::from_distortions(&d),
    )
    .expect("baseline tables must validate")
}

/// A book holding every application accepted over `weeks` weeks at threshold 0.
pub fn filled_book(weeks: u32, seed: u64) -> LoanBook {
    let generator = baseline_generator();
    let policy = ScoreThreshold::new(0.0);
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut book = LoanBook::new();
    for w in 1..=weeks {
        let mut cohort = generator.generate(Week(w), Feedback { acceptance_rate: 1.0 }, &mut rng);
        policy.label(&mut cohort);
        book.extend_accepted(&cohort);
    }
    book
}
