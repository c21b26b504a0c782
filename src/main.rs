use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use survivors::{SimConfig, Simulation, TerminationReport};

/// Headless survivors runner
#[derive(Parser, Debug)]
#[command(name = "survivors")]
#[command(about = "Run the survivors simulation until one is left")]
struct Args {
    /// JSON configuration file; missing fields fall back to defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed, overrides the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Initial population, overrides the config file
    #[arg(long)]
    population: Option<usize>,

    /// Stop after this many ticks even without a winner
    #[arg(long, default_value_t = 200_000)]
    max_ticks: u64,

    /// Log a census line every N ticks (0 disables)
    #[arg(long, default_value_t = 300)]
    report_every: u64,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(population) = args.population {
        config.population = population;
    }

    if args.dump_config {
        println!("{}", config.to_json_pretty()?);
        return Ok(());
    }

    let dt = config.fixed_dt;
    let mut sim = Simulation::new(config).context("invalid configuration")?;

    while !sim.is_terminated() && sim.tick() < args.max_ticks {
        let report = sim.advance_tick(dt);
        if args.report_every > 0 && report.tick % args.report_every == 0 {
            let census = &report.snapshot.census;
            info!(
                tick = report.tick,
                seconds = report.elapsed,
                living = census.living,
                stalled = census.stalled,
                dead = census.dead_total,
                mean_energy = census.mean_energy,
                fleeing = census.fleeing,
                eating = census.eating,
                climate = %report.snapshot.climate.kind,
                temperature = report.snapshot.climate.temperature,
                rage = report.snapshot.danger.rage,
                "census"
            );
        }
    }

    match sim.termination() {
        Some(report) if args.json => println!("{}", serde_json::to_string_pretty(report)?),
        Some(report) => print_report(report),
        None => {
            info!(tick = sim.tick(), "tick limit reached without a winner");
            if args.json {
                println!("{}", serde_json::to_string_pretty(&sim.snapshot())?);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn print_report(report: &TerminationReport) {
    match &report.winner {
        Some(w) => {
            println!("Winner: {} (#{})", w.name, w.id.0);
            println!(
                "  energy {:.1}  audacity {:.2}  resilience {:.2}  age {:.1}s",
                w.energy, w.audacity, w.resilience, w.age
            );
            println!(
                "  hits taken {}  foods eaten {}  energy lost {:.1}  recovered {:.1}",
                w.hits_taken, w.foods_consumed, w.energy_lost, w.energy_recovered
            );
        }
        None => println!("No survivor left."),
    }
    println!(
        "Ran {} ticks ({:.1}s) from {} survivors",
        report.ticks, report.seconds, report.initial_population
    );
    println!(
        "Deaths: {} exhausted, {} by attack, {} while eating",
        report.deaths_by_exhaustion, report.deaths_by_attack, report.deaths_while_eating
    );
    println!(
        "Danger: {} hits on {} survivors; {} food respawns; {} climate cycles",
        report.total_hits, report.survivors_hit, report.food_respawns, report.climate_cycles_completed
    );
    let l = &report.lifespan;
    println!(
        "Lifespan (s): min {:.1}  median {:.1}  p90 {:.1}  max {:.1}  mean {:.1}",
        l.min, l.median, l.p90, l.max, l.mean
    );
}
