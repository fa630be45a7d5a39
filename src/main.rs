use std::fs::File;
use std::io::{BufWriter, Write};
use std::str::FromStr;

use log::info;
use serde::Serialize;
use loansim::analysis::{self, InvariantViolation, WeekDist, WeekStats};
use loansim::config::SimulationConfig;
use loansim::error::{SimError, SimResult};
use loansim::simulation::{Simulation, StepReport};

struct Args {
    config_path: Option<String>,
    seed: Option<u64>,
    weeks: Option<u32>,
    threshold: Option<f64>,
    output_path: String,
    runs: Option<u64>,
    csv_path: Option<String>,
    quiet: bool,
}

fn value<T: FromStr>(args: &[String], i: usize, name: &'static str, what: &str) -> SimResult<T> {
    args.get(i).and_then(|s| s.parse().ok()).ok_or_else(|| SimError::InvalidArgument {
        name: name.to_string(),
        reason: format!("requires {what}"),
    })
}

fn parse_args(args: &[String]) -> SimResult<Args> {
    let mut parsed = Args {
        config_path: None,
        seed: None,
        weeks: None,
        threshold: None,
        output_path: "reports.ndjson".to_string(),
        runs: None,
        csv_path: None,
        quiet: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                parsed.config_path = Some(value(args, i, "--config", "a path")?);
            }
            "--seed" => {
                i += 1;
                parsed.seed = Some(value(args, i, "--seed", "a u64")?);
            }
            "--weeks" => {
                i += 1;
                parsed.weeks = Some(value(args, i, "--weeks", "a u32")?);
            }
            "--threshold" => {
                i += 1;
                parsed.threshold = Some(value(args, i, "--threshold", "a number")?);
            }
            "--output" => {
                i += 1;
                parsed.output_path = value(args, i, "--output", "a path")?;
            }
            "--runs" => {
                i += 1;
                let n: u64 = value(args, i, "--runs", "a positive integer")?;
                if n == 0 {
                    return Err(SimError::InvalidArgument {
                        name: "--runs".to_string(),
                        reason: "must be at least 1".to_string(),
                    });
                }
                parsed.runs = Some(n);
            }
            "--csv" => {
                i += 1;
                parsed.csv_path = Some(value(args, i, "--csv", "a path")?);
            }
            "--quiet" => parsed.quiet = true,
            other => {
                return Err(SimError::InvalidArgument {
                    name: other.to_string(),
                    reason: "unknown flag".to_string(),
                });
            }
        }
        i += 1;
    }
    Ok(parsed)
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = parse_args(&args).and_then(run) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> SimResult<()> {
    let mut base_config = match &args.config_path {
        Some(path) => SimulationConfig::from_json_file(path)?,
        None => SimulationConfig::canonical(),
    };
    if let Some(s) = args.seed {
        base_config.seed = s;
    }
    if let Some(w) = args.weeks {
        base_config.weeks = w;
    }
    if let Some(t) = args.threshold {
        base_config.threshold = t;
    }
    base_config.validate()?;

    match args.runs {
        Some(n) => run_many(&base_config, n, &args),
        None => run_single(base_config, &args),
    }
}

fn run_single(config: SimulationConfig, args: &Args) -> SimResult<()> {
    let mut sim = Simulation::from_config(&config)?;
    let mut reports: Vec<StepReport> = Vec::with_capacity(config.weeks as usize);
    let stats = sim.run_with(config.weeks, config.threshold, |r| reports.push(r.clone()));

    let mut writer = BufWriter::new(File::create(&args.output_path)?);
    for r in &reports {
        serde_json::to_writer(&mut writer, r)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    info!("wrote {} step reports to {}", reports.len(), args.output_path);

    if let Some(ref csv_path) = args.csv_path {
        write_runs_csv(&[stats.clone()], config.seed, csv_path)?;
    }

    if !args.quiet {
        println!(
            "Weeks simulated: {} (seed {}, threshold {}), book size {}",
            stats.len(),
            config.seed,
            config.threshold,
            sim.book().len()
        );
        print_invariants(&analysis::verify_invariants(&reports));
        print_week_table(&stats);
    }
    Ok(())
}

/// Seed of the `i`-th run in a `--runs` batch. Wraps past `u64::MAX`.
fn run_seed(start_seed: u64, i: u64) -> u64 {
    start_seed.wrapping_add(i)
}

fn run_many(base_config: &SimulationConfig, n: u64, args: &Args) -> SimResult<()> {
    use rayon::prelude::*;

    let start_seed = base_config.seed;
    let all_stats: Vec<Vec<WeekStats>> = (0u64..n)
        .into_par_iter()
        .map(|i| -> SimResult<Vec<WeekStats>> {
            let mut config = base_config.clone();
            config.seed = run_seed(start_seed, i);
            let mut sim = Simulation::from_config(&config)?;
            Ok(sim.run(config.weeks, config.threshold))
        })
        .collect::<SimResult<_>>()?;

    if let Some(ref csv_path) = args.csv_path {
        write_runs_csv(&all_stats, start_seed, csv_path)?;
    }

    if !args.quiet {
        print_run_summaries(&all_stats, start_seed);
        if n < 2 {
            eprintln!("Warning: Distribution requires >= 2 runs");
        } else {
            print_distributions(&analysis::analyse_distributions(&all_stats), n);
        }
    }
    Ok(())
}

fn print_invariants(violations: &[InvariantViolation]) {
    let inv = |variant: fn(&InvariantViolation) -> bool| {
        if violations.iter().any(variant) { "FAIL" } else { "PASS" }
    };

    println!("\n=== Invariants ===");
    println!("  [1] Maturation after origin:        {}", inv(|v| matches!(v, InvariantViolation::MaturationNotAfterOrigin { .. })));
    println!("  [2] Default at maturation + 10:     {}", inv(|v| matches!(v, InvariantViolation::DefaultSchedule { .. })));
    println!("  [3] Late payment consistency:       {}", inv(|v| matches!(v, InvariantViolation::LatePayment { .. })));
    println!("  [4] Labels match threshold:         {}", inv(|v| matches!(v, InvariantViolation::LabelMismatch { .. })));
    println!("  [5] Acceptance rate matches labels: {}", inv(|v| matches!(v, InvariantViolation::AcceptanceRate { .. })));
    println!("  [6] Fully paid ⊆ matured:           {}", inv(|v| matches!(v, InvariantViolation::FullyPaidNotMatured { .. })));
    println!("  [7] Outcomes only for booked loans: {}", inv(|v| matches!(v, InvariantViolation::UnbookedOutcome { .. })));
    println!("  [8] Outcomes match a full scan:     {}", inv(|v| matches!(v, InvariantViolation::OutcomeMismatch { .. })));

    if violations.is_empty() {
        println!("  All invariants: PASS");
    } else {
        println!("\n  {} violation(s):", violations.len());
        for v in violations {
            println!("    {v}");
        }
    }
}

fn print_week_table(stats: &[WeekStats]) {
    if stats.is_empty() {
        return;
    }
    println!("\n=== Weekly table ===");
    println!(
        "{:>4} | {:>5} | {:>6} | {:>5} | {:>6} | {:>7} | {:>6} | {:>6} | {:>7} | {:>6} | {:>8}",
        "Week", "New", "Repeat", "Acc#", "AccR%", "Matured", "Paid", "Dflt", "Repaid", "DfltR%", "Book"
    );
    println!("{}", "-".repeat(95));
    for s in stats {
        println!(
            "{:>4} | {:>5} | {:>6} | {:>5} | {:>5.1}% | {:>7} | {:>6} | {:>6} | {:>7} | {:>5.1}% | {:>8}",
            s.week,
            s.new_applications,
            s.repeat_applications,
            s.accepted,
            s.acceptance_rate * 100.0,
            s.matured,
            s.fully_paid,
            s.defaulted,
            s.repaid_after_default,
            s.observed_default_rate() * 100.0,
            s.book_size,
        );
    }
}

/// One row of the multi-run CSV export.
#[derive(Serialize)]
struct RunRow {
    seed: u64,
    week: u32,
    new_applications: usize,
    repeat_applications: usize,
    accepted: usize,
    acceptance_rate: f64,
    matured: usize,
    fully_paid: usize,
    defaulted: usize,
    repaid_after_default: usize,
    book_size: usize,
    accepted_profit: f64,
}

impl RunRow {
    fn new(seed: u64, s: &WeekStats) -> Self {
        RunRow {
            seed,
            week: s.week,
            new_applications: s.new_applications,
            repeat_applications: s.repeat_applications,
            accepted: s.accepted,
            acceptance_rate: s.acceptance_rate,
            matured: s.matured,
            fully_paid: s.fully_paid,
            defaulted: s.defaulted,
            repaid_after_default: s.repaid_after_default,
            book_size: s.book_size,
            accepted_profit: s.accepted_profit,
        }
    }
}

fn write_runs_csv(all_stats: &[Vec<WeekStats>], start_seed: u64, path: &str) -> SimResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for (i, run) in all_stats.iter().enumerate() {
        let seed = run_seed(start_seed, i as u64);
        for s in run {
            wtr.serialize(RunRow::new(seed, s))?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn print_run_summaries(all_stats: &[Vec<WeekStats>], start_seed: u64) {
    println!("\n=== Per-Run Summary ===");
    println!(
        "{:>6} | {:>5} | {:>8} | {:>8} | {:>7} | {:>8} | {:>12}",
        "Seed", "Weeks", "Apps", "Accepted", "AccR%", "Book", "Profit"
    );
    println!("{}", "-".repeat(70));

    for (i, run) in all_stats.iter().enumerate() {
        let seed = run_seed(start_seed, i as u64);
        let apps: usize = run.iter().map(WeekStats::applications).sum();
        let accepted: usize = run.iter().map(|s| s.accepted).sum();
        let rate = if apps == 0 { 0.0 } else { accepted as f64 / apps as f64 };
        let profit: f64 = run.iter().map(|s| s.accepted_profit).sum();
        println!(
            "{:>6} | {:>5} | {:>8} | {:>8} | {:>6.1}% | {:>8} | {:>12.0}",
            seed,
            run.len(),
            apps,
            accepted,
            rate * 100.0,
            run.last().map_or(0, |s| s.book_size),
            profit,
        );
    }
}

fn print_dist_section<F>(title: &str, dists: &[WeekDist], scale: f64, extract: F)
where
    F: Fn(&WeekDist) -> &analysis::DistStats,
{
    println!("\n--- {title} ---");
    println!(
        "{:>4} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7} | {:>7}",
        "Week", "min", "p5", "p25", "p50", "p75", "p95", "max", "mean", "stddev"
    );
    for wd in dists {
        let ds = extract(wd);
        println!(
            "{:>4} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1} | {:>7.1}",
            wd.week,
            ds.min * scale,
            ds.p5 * scale,
            ds.p25 * scale,
            ds.p50 * scale,
            ds.p75 * scale,
            ds.p95 * scale,
            ds.max * scale,
            ds.mean * scale,
            ds.std_dev * scale,
        );
    }
}

fn print_distributions(dists: &[WeekDist], n_runs: u64) {
    println!("\n=== Multi-Run Distribution (N={n_runs} runs) ===");

    print_dist_section("AccR%", dists, 100.0, |wd| &wd.acceptance_rate);
    print_dist_section("Applications", dists, 1.0, |wd| &wd.applications);
    print_dist_section("Book size", dists, 1.0, |wd| &wd.book_size);
    print_dist_section("Observed DfltR%", dists, 100.0, |wd| &wd.observed_default_rate);

    println!("\n--- Defaults (p50 | max) ---");
    println!("{:>4} | {:>8} | {:>8}", "Week", "Dflt p50", "Dflt max");
    for wd in dists {
        println!("{:>4} | {:>8} | {:>8}", wd.week, wd.defaulted.p50, wd.defaulted.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loansim::config::DistortionParameters;

    #[test]
    fn run_seeds_wrap_at_u64_max() {
        assert_eq!(run_seed(7, 3), 10);
        assert_eq!(run_seed(u64::MAX, 0), u64::MAX);
        assert_eq!(run_seed(u64::MAX, 1), 0);
        assert_eq!(run_seed(u64::MAX - 1, 4), 2);
    }

    #[test]
    fn runs_csv_has_one_row_per_week_per_seed() {
        let runs: Vec<Vec<WeekStats>> = (0..2)
            .map(|i| Simulation::new(DistortionParameters::default(), run_seed(u64::MAX, i)).unwrap().run(5, 50.0))
            .collect();
        let path = std::env::temp_dir().join(format!("loansim-runs-{}.csv", std::process::id()));
        write_runs_csv(&runs, u64::MAX, path.to_str().unwrap()).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        assert_eq!(&rdr.headers().unwrap()[0], "seed");
        let seeds: Vec<u64> = rdr.records().map(|r| r.unwrap()[0].parse().unwrap()).collect();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(seeds.len(), 10);
        assert_eq!(seeds[0], u64::MAX);
        assert_eq!(seeds[9], 0);
    }
}
