use serde::{Deserialize, Serialize};

use crate::cohort::{Application, Cohort};

/// True iff the application's score reaches the threshold.
pub fn accept(application: &Application, threshold: f64) -> bool {
    application.score >= threshold
}

/// Score-threshold acceptance decision. Pure: the only effect of labeling
/// is the `accepted` flag on each application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreThreshold {
    pub threshold: f64,
}

impl ScoreThreshold {
    pub fn new(threshold: f64) -> Self {
        ScoreThreshold { threshold }
    }

    pub fn accepts(&self, application: &Application) -> bool {
        accept(application, self.threshold)
    }

    /// Label every application and return the acceptance rate (0 for an empty cohort).
    pub fn label(&self, cohort: &mut Cohort) -> f64 {
        let mut accepted = 0usize;
        for app in &mut cohort.applications {
            let decision = self.accepts(app);
            app.accepted = Some(decision);
            accepted += decision as usize;
        }
        if cohort.is_empty() { 0.0 } else { accepted as f64 / cohort.len() as f64 }
    }

    /// Fraction of `cohort` this threshold would accept, without labeling.
    pub fn acceptance_rate(&self, cohort: &Cohort) -> f64 {
        if cohort.is_empty() {
            return 0.0;
        }
        cohort.iter().filter(|a| self.accepts(a)).count() as f64 / cohort.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApplicationId, PopulationClass, Week};

    fn app(seq: u32, score: f64) -> Application {
        Application {
            id: ApplicationId::new(PopulationClass::New, Week(1), seq),
            segment_id: 1,
            origin: Week(1),
            maturation_at: Week(5),
            class: PopulationClass::New,
            sum: 1000,
            duration: 30,
            debt: 0,
            score,
            defaulted: false,
            default_at: None,
            late_payment: false,
            late_payment_at: None,
            profit: 100.0,
            expected_loan_count: 1.0,
            accepted: None,
        }
    }

    fn cohort(scores: &[f64]) -> Cohort {
        Cohort {
            week: Week(1),
            applications: scores.iter().enumerate().map(|(i, &s)| app(i as u32 + 1, s)).collect(),
        }
    }

    #[test]
    fn score_equal_to_threshold_is_accepted() {
        assert!(accept(&app(1, 50.0), 50.0));
        assert!(!accept(&app(1, 49.999), 50.0));
    }

    #[test]
    fn label_sets_every_flag_and_returns_rate() {
        let mut c = cohort(&[10.0, 55.0, 70.0, 49.0]);
        let rate = ScoreThreshold::new(50.0).label(&mut c);
        assert_eq!(rate, 0.5);
        let flags: Vec<Option<bool>> = c.iter().map(|a| a.accepted).collect();
        assert_eq!(flags, vec![Some(false), Some(true), Some(true), Some(false)]);
    }

    #[test]
    fn label_leaves_other_fields_untouched() {
        let original = cohort(&[42.0, 63.0]);
        let mut labeled = original.clone();
        ScoreThreshold::new(50.0).label(&mut labeled);
        for (a, b) in original.iter().zip(labeled.iter()) {
            let mut b = b.clone();
            b.accepted = None;
            assert_eq!(a, &b);
        }
    }

    #[test]
    fn empty_cohort_has_zero_rate() {
        let mut c = Cohort::empty(Week(3));
        assert_eq!(ScoreThreshold::new(0.0).label(&mut c), 0.0);
        assert_eq!(ScoreThreshold::new(0.0).acceptance_rate(&c), 0.0);
    }

    #[test]
    fn unattainable_threshold_rejects_everyone() {
        let mut c = cohort(&[99.0, 150.0, -3.0]);
        assert_eq!(ScoreThreshold::new(1000.0).label(&mut c), 0.0);
        assert!(c.iter().all(|a| a.accepted == Some(false)));
    }

    #[test]
    fn acceptance_rate_matches_label() {
        let c = cohort(&[30.0, 40.0, 50.0, 60.0, 70.0]);
        let policy = ScoreThreshold::new(45.0);
        let mut labeled = c.clone();
        assert_eq!(policy.acceptance_rate(&c), policy.label(&mut labeled));
    }
}
