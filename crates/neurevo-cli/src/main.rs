use anyhow::{bail, Context, Result};
use clap::Parser;
use neurevo_core::{SimConfig, World, WorldStats};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "neurevo")]
#[command(about = "Run a neuro-evolution ecosystem headless and report population statistics")]
struct Cli {
    /// Path to config file (JSON); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to simulate
    #[arg(long, default_value_t = 1000)]
    ticks: u64,

    /// Seconds per tick (default: 1 / tick_rate)
    #[arg(long)]
    dt: Option<f64>,

    /// Override the config seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log and record statistics every N ticks
    #[arg(long, default_value_t = 100)]
    report_every: u64,

    /// Write final statistics and the report history as JSON
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Serialize)]
struct Summary {
    #[serde(rename = "final")]
    final_stats: WorldStats,
    history: Vec<WorldStats>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<SimConfig> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            SimConfig::from_json_str(&json)
                .with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(SimConfig::default()),
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    let dt = cli.dt.unwrap_or_else(|| config.default_dt());
    if !(dt.is_finite() && dt > 0.0) {
        bail!("--dt must be positive and finite, got {dt}");
    }
    let report_every = cli.report_every.max(1);

    let mut world = World::new(config).context("failed to build world")?;
    let mut history = Vec::new();

    for _ in 0..cli.ticks {
        let report = world.step(dt);
        if report.tick % report_every == 0 {
            let stats = world.stats();
            info!(
                tick = stats.tick,
                agents = stats.alive_agents,
                food = stats.alive_food,
                species = stats.species_counts.len(),
                births = stats.total_births,
                deaths = stats.total_deaths,
                max_generation = stats.max_generation,
                "report"
            );
            history.push(stats);
        }
        if report.alive_agents == 0 && world.config().min_population == 0 {
            info!(tick = report.tick, "population extinct");
            break;
        }
    }

    let final_stats = world.stats();
    info!(
        tick = final_stats.tick,
        agents = final_stats.alive_agents,
        mean_energy = final_stats.mean_energy,
        "run complete"
    );

    if let Some(path) = cli.summary {
        let summary = Summary {
            final_stats,
            history,
        };
        let json = serde_json::to_string_pretty(&summary).context("failed to encode summary")?;
        fs::write(&path, json)
            .with_context(|| format!("failed to write summary {}", path.display()))?;
    }
    Ok(())
}
