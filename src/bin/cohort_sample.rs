use std::collections::BTreeMap;
use std::env;
use std::io;

use loansim::config::SimulationConfig;
use loansim::simulation::Simulation;
use loansim::types::{PopulationClass, Week};

fn main() {
    env_logger::init();
    let config = SimulationConfig::canonical();

    let args: Vec<String> = env::args().skip(1).collect();
    let csv = args.iter().any(|a| a == "--csv");
    let week: u32 = args
        .iter()
        .find(|a| !a.starts_with("--"))
        .and_then(|s| s.parse().ok())
        .filter(|&w| w >= 1)
        .unwrap_or(1);

    let mut sim = Simulation::from_config(&config).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(1);
    });
    let cohort = sim.generate_cohort(Week(week));

    if csv {
        if let Err(e) = cohort.write_csv(io::stdout().lock()) {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    } else {
        // Write NDJSON to stdout.
        for app in cohort.iter() {
            println!("{}", serde_json::to_string(app).expect("serialisation failed"));
        }
    }

    eprintln!(
        "cohort_sample: week {week}, seed {}, {} applications",
        config.seed,
        cohort.len()
    );

    // Per-class summary to stderr.
    for class in PopulationClass::ALL {
        let apps: Vec<_> = cohort.iter().filter(|a| a.class == class).collect();
        if apps.is_empty() {
            eprintln!("  class={class:<6}  applications=0");
            continue;
        }
        let n = apps.len() as f64;
        let defaults = apps.iter().filter(|a| a.defaulted).count();
        let lates = apps.iter().filter(|a| a.late_payment).count();
        let mean_score = apps.iter().map(|a| a.score).sum::<f64>() / n;
        let mean_debt = apps.iter().map(|a| a.debt as f64).sum::<f64>() / n;
        eprintln!(
            "  class={class:<6}  applications={:>4}  default_rate={:.3}  late={lates:>3}  mean_score={mean_score:.2}  mean_debt={mean_debt:.0}",
            apps.len(),
            defaults as f64 / n,
        );
    }

    // Segment breakdown.
    let mut by_segment: BTreeMap<u32, usize> = BTreeMap::new();
    for a in cohort.iter() {
        *by_segment.entry(a.segment_id).or_insert(0) += 1;
    }
    for (segment, n) in by_segment {
        eprintln!("  segment={segment:<3}  applications={n:>4}");
    }
}
