use std::collections::{BTreeMap, HashSet};

use crate::{
    book::LoanBook,
    cohort::{DEFAULT_LAG_WEEKS, LATE_PAYMENT_MAX_LAG_WEEKS},
    events::LoanEvent,
    policy,
    resolver,
    simulation::StepReport,
    types::{ApplicationId, PopulationClass, Week},
};

/// Per-week aggregate statistics derived from one step report.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekStats {
    pub week: u32,
    pub new_applications: usize,
    pub repeat_applications: usize,
    /// Applications newly booked this week.
    pub accepted: usize,
    pub acceptance_rate: f64,
    pub matured: usize,
    pub defaulted: usize,
    pub repaid_after_default: usize,
    pub fully_paid: usize,
    /// Book size after this week's acceptances.
    pub book_size: usize,
    /// Sum of expected profit over the applications accepted this week.
    pub accepted_profit: f64,
}

impl WeekStats {
    pub fn from_report(report: &StepReport) -> Self {
        let o = &report.outcomes;
        WeekStats {
            week: report.week.0,
            new_applications: report.cohort.count(PopulationClass::New),
            repeat_applications: report.cohort.count(PopulationClass::Repeat),
            accepted: report.accepted,
            acceptance_rate: report.acceptance_rate,
            matured: o.matured.len(),
            defaulted: o.defaulted.len(),
            repaid_after_default: o.repaid_after_default.len(),
            fully_paid: o.fully_paid.len(),
            book_size: report.book_size,
            accepted_profit: report.cohort.accepted().map(|a| a.profit).sum(),
        }
    }

    pub fn applications(&self) -> usize {
        self.new_applications + self.repeat_applications
    }

    /// Share of this week's matured loans that had defaulted. Zero if nothing matured.
    pub fn observed_default_rate(&self) -> f64 {
        if self.matured == 0 {
            0.0
        } else {
            (self.matured - self.fully_paid) as f64 / self.matured as f64
        }
    }
}

/// Spread of one continuous weekly metric over a batch of runs.
#[derive(Debug, Clone)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation; 0 for a single run.
    pub std_dev: f64,
}

/// Linear interpolation between closest ranks of an ascending slice.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (h - lo as f64)
}

impl DistStats {
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut sorted: Vec<f64> = values.into_iter().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let sum_sq: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum();
        let std_dev = if n > 1 { (sum_sq / (n - 1) as f64).sqrt() } else { 0.0 };
        Some(DistStats {
            n,
            min: sorted[0],
            p5: quantile(&sorted, 0.05),
            p25: quantile(&sorted, 0.25),
            p50: quantile(&sorted, 0.50),
            p75: quantile(&sorted, 0.75),
            p95: quantile(&sorted, 0.95),
            max: sorted[n - 1],
            mean,
            std_dev,
        })
    }
}

/// Median and maximum of a weekly event count over a batch of runs.
#[derive(Debug, Clone)]
pub struct CountDist {
    pub n: usize,
    pub p50: usize,
    pub max: usize,
    pub mean: f64,
}

impl CountDist {
    pub fn from_counts(counts: impl IntoIterator<Item = usize>) -> Option<Self> {
        let as_f64: Vec<f64> = counts.into_iter().map(|c| c as f64).collect();
        let spread = DistStats::from_values(as_f64)?;
        Some(CountDist {
            n: spread.n,
            p50: spread.p50.round() as usize,
            max: spread.max as usize,
            mean: spread.mean,
        })
    }
}

/// Cross-run spread of the headline weekly metrics for one week.
#[derive(Debug, Clone)]
pub struct WeekDist {
    pub week: u32,
    pub acceptance_rate: DistStats,
    pub applications: DistStats,
    pub book_size: DistStats,
    pub observed_default_rate: DistStats,
    pub defaulted: CountDist,
}

impl WeekDist {
    fn from_runs(week: u32, rows: &[&WeekStats]) -> Option<Self> {
        let metric = |f: fn(&WeekStats) -> f64| DistStats::from_values(rows.iter().map(|s| f(s)));
        Some(WeekDist {
            week,
            acceptance_rate: metric(|s| s.acceptance_rate)?,
            applications: metric(|s| s.applications() as f64)?,
            book_size: metric(|s| s.book_size as f64)?,
            observed_default_rate: metric(WeekStats::observed_default_rate)?,
            defaulted: CountDist::from_counts(rows.iter().map(|s| s.defaulted))?,
        })
    }
}

/// Group every run's rows by week and summarise each week seen in at least two runs.
pub fn analyse_distributions(all_runs: &[Vec<WeekStats>]) -> Vec<WeekDist> {
    let mut by_week: BTreeMap<u32, Vec<&WeekStats>> = BTreeMap::new();
    for row in all_runs.iter().flatten() {
        by_week.entry(row.week).or_default().push(row);
    }
    by_week
        .into_iter()
        .filter(|(_, rows)| rows.len() >= 2)
        .filter_map(|(week, rows)| WeekDist::from_runs(week, &rows))
        .collect()
}

/// An invariant violation detected in a recorded stream of step reports.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    /// Maturation must land strictly after the origin week.
    MaturationNotAfterOrigin { id: ApplicationId, origin: Week, maturation_at: Week },
    /// `default_at` must be set exactly when defaulted, ten weeks after maturation.
    DefaultSchedule { id: ApplicationId, detail: String },
    /// A late payment needs a default and a lag of 1..=30 weeks.
    LatePayment { id: ApplicationId, detail: String },
    /// The label disagrees with `score >= threshold`, or is missing.
    LabelMismatch { id: ApplicationId, score: f64, threshold: f64, accepted: Option<bool> },
    /// Reported acceptance rate differs from the cohort's labels.
    AcceptanceRate { week: Week, reported: f64, recomputed: f64 },
    /// A fully-paid id is missing from the same week's matured ids.
    FullyPaidNotMatured { week: Week, id: ApplicationId },
    /// A resolved id was never booked.
    UnbookedOutcome { week: Week, id: ApplicationId },
    /// The reported ids for one event differ from a full scan of the book.
    OutcomeMismatch { week: Week, event: LoanEvent, missing: usize, unexpected: usize },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaturationNotAfterOrigin { id, origin, maturation_at } => {
                write!(f, "MaturationNotAfterOrigin {id}: origin={origin} maturation_at={maturation_at}")
            }
            Self::DefaultSchedule { id, detail } => write!(f, "DefaultSchedule {id}: {detail}"),
            Self::LatePayment { id, detail } => write!(f, "LatePayment {id}: {detail}"),
            Self::LabelMismatch { id, score, threshold, accepted } => {
                write!(f, "LabelMismatch {id}: score={score:.3} threshold={threshold} accepted={accepted:?}")
            }
            Self::AcceptanceRate { week, reported, recomputed } => {
                write!(f, "AcceptanceRate week={week}: reported={reported} recomputed={recomputed}")
            }
            Self::FullyPaidNotMatured { week, id } => write!(f, "FullyPaidNotMatured week={week}: {id}"),
            Self::UnbookedOutcome { week, id } => write!(f, "UnbookedOutcome week={week}: {id}"),
            Self::OutcomeMismatch { week, event, missing, unexpected } => {
                write!(f, "OutcomeMismatch week={week} {event:?}: missing={missing} unexpected={unexpected}")
            }
        }
    }
}

fn check_schedule(report: &StepReport, out: &mut Vec<InvariantViolation>) {
    for a in report.cohort.iter() {
        if a.maturation_at <= a.origin {
            out.push(InvariantViolation::MaturationNotAfterOrigin {
                id: a.id,
                origin: a.origin,
                maturation_at: a.maturation_at,
            });
        }
        let expected_default = a.defaulted.then(|| a.maturation_at.offset(DEFAULT_LAG_WEEKS));
        if a.default_at != expected_default {
            out.push(InvariantViolation::DefaultSchedule {
                id: a.id,
                detail: format!(
                    "defaulted={} default_at={:?} expected={expected_default:?}",
                    a.defaulted, a.default_at
                ),
            });
        }
        match (a.late_payment, a.late_payment_at) {
            (false, None) => {}
            (true, Some(at)) => {
                let lag = at.0.checked_sub(a.maturation_at.0);
                if !a.defaulted {
                    out.push(InvariantViolation::LatePayment {
                        id: a.id,
                        detail: "late payment without default".into(),
                    });
                }
                if !lag.is_some_and(|l| (1..=LATE_PAYMENT_MAX_LAG_WEEKS).contains(&l)) {
                    out.push(InvariantViolation::LatePayment {
                        id: a.id,
                        detail: format!("lag {lag:?} outside 1..={LATE_PAYMENT_MAX_LAG_WEEKS}"),
                    });
                }
            }
            (flag, at) => out.push(InvariantViolation::LatePayment {
                id: a.id,
                detail: format!("late_payment={flag} but late_payment_at={at:?}"),
            }),
        }
    }
}

fn check_labels(report: &StepReport, out: &mut Vec<InvariantViolation>) {
    for a in report.cohort.iter() {
        if a.accepted != Some(policy::accept(a, report.threshold)) {
            out.push(InvariantViolation::LabelMismatch {
                id: a.id,
                score: a.score,
                threshold: report.threshold,
                accepted: a.accepted,
            });
        }
    }
    let recomputed = if report.cohort.is_empty() {
        0.0
    } else {
        report.cohort.accepted().count() as f64 / report.cohort.len() as f64
    };
    if (recomputed - report.acceptance_rate).abs() > 1e-12 {
        out.push(InvariantViolation::AcceptanceRate {
            week: report.week,
            reported: report.acceptance_rate,
            recomputed,
        });
    }
}

fn check_outcomes(report: &StepReport, book: &LoanBook, out: &mut Vec<InvariantViolation>) {
    let o = &report.outcomes;
    let matured: HashSet<&ApplicationId> = o.matured.iter().collect();
    for id in &o.fully_paid {
        if !matured.contains(id) {
            out.push(InvariantViolation::FullyPaidNotMatured { week: report.week, id: *id });
        }
    }

    let mut unbooked = HashSet::new();
    for id in o.matured.iter().chain(&o.defaulted).chain(&o.repaid_after_default).chain(&o.fully_paid) {
        if !book.contains(id) && unbooked.insert(*id) {
            out.push(InvariantViolation::UnbookedOutcome { week: report.week, id: *id });
        }
    }

    let expected = resolver::scan(book, report.week);
    for event in [LoanEvent::Matured, LoanEvent::PaidInFull, LoanEvent::Defaulted, LoanEvent::RepaidAfterDefault] {
        let want: HashSet<&ApplicationId> = expected.ids(event).iter().collect();
        let got: HashSet<&ApplicationId> = o.ids(event).iter().collect();
        let missing = want.difference(&got).count();
        let unexpected = got.difference(&want).count();
        if missing > 0 || unexpected > 0 {
            out.push(InvariantViolation::OutcomeMismatch { week: report.week, event, missing, unexpected });
        }
    }
}

/// Re-check application, labeling and resolution invariants over a report stream.
///
/// The stream must start at the episode's first step: the book is replayed
/// from the accepted applications of each report.
pub fn verify_invariants(reports: &[StepReport]) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut book = LoanBook::new();
    for report in reports {
        check_schedule(report, &mut violations);
        check_labels(report, &mut violations);
        book.extend_accepted(&report.cohort);
        check_outcomes(report, &book, &mut violations);
    }
    violations
}
