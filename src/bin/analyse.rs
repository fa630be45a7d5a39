//! Typed step-report analyser for loansim output.
//!
//! Reads `reports.ndjson` (or the first positional argument), deserializes it
//! using the same `StepReport` type the simulation writes, then prints:
//!   Tier 1: invariant status (PASS/FAIL per invariant)
//!   Tier 2: weekly character table
//!   Tier 3: mean score of defaulters vs repayers per class

use std::{
    fs::File,
    io::{BufRead, BufReader},
};

use loansim::{
    analysis::{InvariantViolation, WeekStats, verify_invariants},
    simulation::StepReport,
    types::PopulationClass,
};

fn main() {
    env_logger::init();

    // ── Resolve reports file path: first positional arg, else default ─────────
    let reports_path = std::env::args().nth(1).unwrap_or_else(|| "reports.ndjson".to_string());

    // ── Load reports ──────────────────────────────────────────────────────────
    let file = File::open(&reports_path).unwrap_or_else(|e| {
        eprintln!("error: cannot open {reports_path}: {e}");
        eprintln!("Run `cargo run --release` first to generate the report stream.");
        std::process::exit(1);
    });

    let mut reports: Vec<StepReport> = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.unwrap_or_else(|e| {
            eprintln!("error reading line {}: {}", line_no + 1, e);
            std::process::exit(1);
        });
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StepReport>(&line) {
            Ok(r) => reports.push(r),
            Err(e) => {
                eprintln!("error: failed to deserialize line {}: {}", line_no + 1, e);
                std::process::exit(1);
            }
        }
    }

    // ── Tier 1: invariants ────────────────────────────────────────────────────
    let violations = verify_invariants(&reports);

    println!("=== Tier 1: Invariants ===");

    let has = |f: fn(&InvariantViolation) -> bool| violations.iter().any(f);

    fn status(fail: bool) -> &'static str {
        if fail { "FAIL" } else { "PASS" }
    }

    println!(
        "  [{}] Inv 1: Maturation strictly after origin",
        status(has(|v| matches!(v, InvariantViolation::MaturationNotAfterOrigin { .. })))
    );
    println!(
        "  [{}] Inv 2: default_at = maturation_at + 10 iff defaulted",
        status(has(|v| matches!(v, InvariantViolation::DefaultSchedule { .. })))
    );
    println!(
        "  [{}] Inv 3: Late payment implies default, lag in 1..=30",
        status(has(|v| matches!(v, InvariantViolation::LatePayment { .. })))
    );
    println!(
        "  [{}] Inv 4: accepted = (score >= threshold)",
        status(has(|v| matches!(v, InvariantViolation::LabelMismatch { .. })))
    );
    println!(
        "  [{}] Inv 5: Reported acceptance rate matches labels",
        status(has(|v| matches!(v, InvariantViolation::AcceptanceRate { .. })))
    );
    println!(
        "  [{}] Inv 6: Fully paid ⊆ matured",
        status(has(|v| matches!(v, InvariantViolation::FullyPaidNotMatured { .. })))
    );
    println!(
        "  [{}] Inv 7: Every resolved id was booked",
        status(has(|v| matches!(v, InvariantViolation::UnbookedOutcome { .. })))
    );
    println!(
        "  [{}] Inv 8: Resolved ids match a full book scan",
        status(has(|v| matches!(v, InvariantViolation::OutcomeMismatch { .. })))
    );

    if violations.is_empty() {
        println!("  All invariants PASS ({} reports checked)", reports.len());
    } else {
        println!("\n  {} violation(s) detected:", violations.len());
        for v in &violations {
            println!("    {v}");
        }
    }

    println!();

    // ── Tier 2: weekly character table ────────────────────────────────────────
    if reports.is_empty() {
        println!("=== Tier 2: Weekly Character Table ===");
        println!("  (no reports in stream)");
        return;
    }

    println!("=== Tier 2: Weekly Character Table ===");
    println!(
        "{:>4} | {:>9} | {:>5} | {:>5} | {:>6} | {:>7} | {:>6} | {:>6} | {:>7} | {:>8} | {:>10}",
        "Week", "Threshold", "Apps", "Acc#", "AccR%", "Matured", "Dflt", "Repaid", "DfltR%", "Book", "AccProfit"
    );
    println!("{}", "-".repeat(100));

    for r in &reports {
        let s = WeekStats::from_report(r);
        println!(
            "{:>4} | {:>9.1} | {:>5} | {:>5} | {:>5.1}% | {:>7} | {:>6} | {:>6} | {:>6.1}% | {:>8} | {:>10.0}",
            s.week,
            r.threshold,
            s.applications(),
            s.accepted,
            s.acceptance_rate * 100.0,
            s.matured,
            s.defaulted,
            s.repaid_after_default,
            s.observed_default_rate() * 100.0,
            s.book_size,
            s.accepted_profit,
        );
    }
    println!();

    // ── Tier 3: score separation ──────────────────────────────────────────────
    // Mean score of eventual defaulters vs repayers, per class. A gap near zero
    // means no threshold can separate the two populations.
    println!("=== Tier 3: Score Separation (mean score by outcome) ===");
    println!(
        "{:>6} | {:>8} | {:>10} | {:>8} | {:>10} | {:>6}",
        "Class", "n repay", "mean repay", "n dflt", "mean dflt", "gap"
    );
    println!("{}", "-".repeat(62));
    for class in PopulationClass::ALL {
        let (mut n_good, mut sum_good, mut n_bad, mut sum_bad) = (0usize, 0.0, 0usize, 0.0);
        for a in reports.iter().flat_map(|r| r.cohort.iter()).filter(|a| a.class == class) {
            if a.defaulted {
                n_bad += 1;
                sum_bad += a.score;
            } else {
                n_good += 1;
                sum_good += a.score;
            }
        }
        if n_good == 0 || n_bad == 0 {
            println!("{:>6} | (insufficient data)", class.as_str());
            continue;
        }
        let mean_good = sum_good / n_good as f64;
        let mean_bad = sum_bad / n_bad as f64;
        println!(
            "{:>6} | {:>8} | {:>10.2} | {:>8} | {:>10.2} | {:>6.2}",
            class.as_str(),
            n_good,
            mean_good,
            n_bad,
            mean_bad,
            mean_bad - mean_good,
        );
    }
    println!();
}
