use loansim::book::{Feedback, LoanBook};
use loansim::cohort::{MAX_CLASS_VOLUME, VolumeModel};
use loansim::config::{DistortionParameters, SimulationConfig};
use loansim::error::SimError;
use loansim::resolver;
use loansim::simulation::Simulation;
use loansim::types::{PopulationClass, Week};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Scenario A: noiseless week 5 ─────────────────────────────────────────────

#[test]
fn noiseless_week_five_has_47_new_applicants() {
    init_logging();
    let mut sim = Simulation::new(DistortionParameters::noiseless(), 42).unwrap();
    let cohort = sim.generate_cohort(Week(5));
    // 10·5 − 0.1·25 = 47.5, truncated
    assert_eq!(cohort.count(PopulationClass::New), 47);
}

#[test]
fn noiseless_volume_is_seed_independent() {
    let count = |seed| {
        let mut sim = Simulation::new(DistortionParameters::noiseless(), seed).unwrap();
        let c = sim.generate_cohort(Week(5));
        (c.count(PopulationClass::New), c.count(PopulationClass::Repeat))
    };
    assert_eq!(count(1), count(999));
}

// ── Scenario B: nothing accepted ─────────────────────────────────────────────

#[test]
fn unreachable_threshold_accepts_nothing_and_resolves_existing_book() {
    init_logging();
    let mut sim = Simulation::new(DistortionParameters::noiseless(), 42).unwrap();
    for w in 1..=4 {
        sim.step(Week(w), -1000.0);
    }
    let booked_before = sim.book().len();
    assert!(booked_before > 0);
    let expected = resolver::scan(sim.book(), Week(5));

    let cohort = sim.generate_cohort(Week(5));
    assert!(!cohort.is_empty());
    let report = sim.simulate(Week(5), cohort, 1000.0);

    assert_eq!(report.accepted, 0);
    assert_eq!(report.acceptance_rate, 0.0);
    assert!(report.cohort.iter().all(|a| a.accepted == Some(false)));
    assert_eq!(sim.book().len(), booked_before);
    assert_eq!(report.outcomes, expected);
    // the 9 new loans booked in week 1 (30 days) mature at week 5
    assert_eq!(report.outcomes.matured.len(), 9);
}

#[test]
fn zero_acceptance_feeds_back_into_next_volume() {
    let d = DistortionParameters { e: 0.0, ar_effect: 10.0, ..Default::default() };
    let mut starved = Simulation::new(d, 1).unwrap();
    let mut neutral = Simulation::new(DistortionParameters::noiseless(), 1).unwrap();
    starved.step(Week(59), 1000.0);
    neutral.step(Week(59), 1000.0);
    // (0 − 0.5) · 0.1 · 10 · 10 = −5 on the new-client trend at week 60
    let starved_feedback = Feedback { acceptance_rate: 0.0 };
    let expected = VolumeModel::from_distortions(&d).expected_new(Week(60), starved_feedback);
    assert!((expected - 35.0).abs() < 1e-9);
    let a = starved.generate_cohort(Week(60)).count(PopulationClass::New);
    let b = neutral.generate_cohort(Week(60)).count(PopulationClass::New);
    assert_eq!(b, 40);
    assert_eq!(a, expected as usize);
}

// ── Scenario C: clamped probability ──────────────────────────────────────────

#[test]
fn default_probability_above_one_is_clamped() {
    init_logging();
    // 0.1 · (1 + 12) = 1.3
    let d = DistortionParameters { new_default_rate_bias: 12.0, ..Default::default() };
    let mut sim = Simulation::new(d, 42).unwrap();
    for s in &sim.catalog().new {
        assert_eq!(s.default_probability, 1.0);
    }
    for w in 1..=5 {
        let cohort = sim.generate_cohort(Week(w));
        assert!(cohort.iter().filter(|a| !a.is_repeat()).all(|a| a.defaulted));
    }
}

#[test]
fn clamped_runs_are_reproducible() {
    let d = DistortionParameters { repeat_default_rate_bias: 25.0, ..Default::default() };
    let run = |seed| Simulation::new(d, seed).unwrap().run(20, 50.0);
    assert_eq!(run(8), run(8));
}

#[test]
fn extreme_noise_is_refused_and_extreme_feedback_is_clamped() {
    let err = Simulation::new(DistortionParameters { e: 1e12, ..Default::default() }, 0).unwrap_err();
    assert!(err.mentions("distortions.e"), "{err}");

    let d = DistortionParameters { e: 0.0, ar_effect: 1e15, ..Default::default() };
    let mut sim = Simulation::new(d, 0).unwrap();
    sim.step(Week(59), -1000.0);
    let cohort = sim.generate_cohort(Week(60));
    assert_eq!(cohort.count(PopulationClass::New), MAX_CLASS_VOLUME as usize);
    assert_eq!(cohort.count(PopulationClass::Repeat), MAX_CLASS_VOLUME as usize);
}

// ── Empty book ───────────────────────────────────────────────────────────────

#[test]
fn empty_book_resolves_to_empty_sets() {
    let mut sim = Simulation::new(DistortionParameters::default(), 42).unwrap();
    assert_eq!(sim.book().acceptance_rate(), 0.0);
    let report = sim.step(Week(1), 50.0);
    assert!(report.outcomes.is_empty());
    for w in 1..=20 {
        assert!(resolver::resolve(&LoanBook::new(), Week(w)).is_empty());
    }
}

// ── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn same_seed_and_history_give_identical_cohorts() {
    let mut a = Simulation::new(DistortionParameters::default(), 2024).unwrap();
    let mut b = Simulation::new(DistortionParameters::default(), 2024).unwrap();
    for w in 1..=60 {
        let threshold = 40.0 + (w % 5) as f64 * 5.0;
        assert_eq!(a.step(Week(w), threshold), b.step(Week(w), threshold), "week {w}");
    }
}

#[test]
fn cloned_simulation_replays_the_future() {
    let d = DistortionParameters { ar_effect: 3.0, ..Default::default() };
    let mut sim = Simulation::new(d, 5).unwrap();
    sim.run(55, 50.0);
    let mut fork = sim.clone();
    for w in 56..=70 {
        assert_eq!(sim.step(Week(w), 45.0), fork.step(Week(w), 45.0));
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

#[test]
fn config_file_drives_a_run() {
    let cfg = SimulationConfig::from_json_str(
        r#"{"seed": 3, "weeks": 12, "threshold": 55.0, "distortions": {"e": 0.5}}"#,
    )
    .unwrap();
    let mut sim = Simulation::from_config(&cfg).unwrap();
    assert_eq!(sim.seed(), 3);
    let stats = sim.run(cfg.weeks, cfg.threshold);
    assert_eq!(stats.len(), 12);
}

#[test]
fn invalid_config_reports_every_violation() {
    let err = SimulationConfig::from_json_str(
        r#"{"threshold": 50.0, "distortions": {"e": -2.0, "new_default_rate_bias": -3.0, "late_payment_rate_bias": -1.5}}"#,
    )
    .unwrap_err();
    match err {
        SimError::Configuration(e) => {
            assert_eq!(e.violations.len(), 3, "{e}");
            assert!(e.mentions("distortions.e"));
            assert!(e.mentions("distortions.new_default_rate_bias"));
            assert!(e.mentions("distortions.late_payment_rate_bias"));
        }
        other => panic!("expected a configuration error, got {other}"),
    }
}

#[test]
fn malformed_json_is_a_serialization_error() {
    let err = SimulationConfig::from_json_str(r#"{"seed": "not a number"}"#).unwrap_err();
    assert!(matches!(err, SimError::Serialization(_)), "{err}");
}

#[test]
fn step_reports_round_trip_through_json() {
    let mut sim = Simulation::new(DistortionParameters::default(), 77).unwrap();
    let reports: Vec<_> = (1..=8).map(|w| sim.step(Week(w), 50.0)).collect();
    let last = reports.last().unwrap();
    let json = serde_json::to_string(last).unwrap();
    let back: loansim::simulation::StepReport = serde_json::from_str(&json).unwrap();
    assert_eq!(&back, last);
    assert!(json.contains(r#""id":"new_8_1""#), "{json}");
}
