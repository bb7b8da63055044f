//! `beetrack` CLI: batch tracking of detector CSVs, scenario runs, replays.

mod batch;

use anyhow::{Context, Result};
use batch::Outcome;
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use sim::replay::{load_replay, save_replay, Evaluation};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracker_core::traffic::MinTrackFilter;
use tracker_core::PipelineConfig;

#[derive(Parser)]
#[command(name = "beetrack", about = "Bee tracker CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Tracker settings shared by every subcommand.
#[derive(clap::Args)]
struct TrackerArgs {
    /// JSON pipeline configuration; missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the association gate (px, or σ with the Mahalanobis metric)
    #[arg(long)]
    max_distance: Option<f64>,
    /// Override the number of consecutive misses a track survives
    #[arg(long)]
    max_misses: Option<u32>,
    /// Override the hits needed to confirm a track
    #[arg(long)]
    confirm_hits: Option<u32>,
}

impl TrackerArgs {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };
        if let Some(d) = self.max_distance {
            config.max_match_distance = d;
        }
        if let Some(m) = self.max_misses {
            config.lifecycle.max_misses = m;
        }
        if let Some(h) = self.confirm_hits {
            config.lifecycle.confirm_hits = h;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Track detector CSV files and count hive traffic.
    Track {
        /// A detector CSV file or a folder of them
        input: PathBuf,
        /// Folder for track tables and run statistics
        #[arg(long)]
        output: PathBuf,
        /// JSON map of recording date (YYYYMMDD) to entrance ellipse
        #[arg(long)]
        ellipses: Option<PathBuf>,
        /// Minimum matched positions (exclusive) for a track to count
        #[arg(long, default_value_t = MinTrackFilter::default().min_positions)]
        min_positions: usize,
        /// Minimum summed distance (exclusive, px) for a track to count
        #[arg(long, default_value_t = MinTrackFilter::default().min_distance)]
        min_distance: f64,
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    /// Run a named scenario in batch mode and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    /// Load and replay a previously recorded scenario log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        tracker: TrackerArgs,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track {
            input,
            output,
            ellipses,
            min_positions,
            min_distance,
            tracker,
        } => {
            let significance = MinTrackFilter {
                min_positions,
                min_distance,
            };
            run_track(
                &input,
                &output,
                ellipses.as_deref(),
                &significance,
                &tracker.pipeline_config()?,
            )?;
        }
        Commands::RunScenario {
            scenario,
            seed,
            output,
            save_replay: save_path,
            tracker,
        } => {
            run_scenario(
                scenario,
                seed,
                &tracker.pipeline_config()?,
                output.as_deref(),
                save_path.as_deref(),
            )?;
        }
        Commands::Replay {
            input,
            output,
            tracker,
        } => {
            run_replay(&input, &tracker.pipeline_config()?, output.as_deref())?;
        }
    }

    Ok(())
}

fn run_track(
    input: &Path,
    output: &Path,
    ellipses_path: Option<&Path>,
    significance: &MinTrackFilter,
    config: &PipelineConfig,
) -> Result<()> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("creating output folder {}", output.display()))?;
    let ellipses = ellipses_path.map(batch::load_ellipses).transpose()?;
    let done = batch::already_processed(output)?;

    let files = batch::discover_inputs(input)?;
    println!("Total CSV files found in {}: {}", input.display(), files.len());

    let todo: Vec<(PathBuf, Option<_>)> = files
        .into_iter()
        .filter_map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if done.contains(&name) {
                info!(file = %name, "already processed");
                return None;
            }
            let entrance = match &ellipses {
                None => None,
                Some(table) => {
                    let date = batch::date_from_filename(&name).unwrap_or_default();
                    match table.get(date) {
                        Some(e) => Some(e.clone()),
                        None => {
                            warn!(file = %name, date, "skipping file: no entrance ellipse for its date");
                            return None;
                        }
                    }
                }
            };
            Some((path, entrance))
        })
        .collect();

    let start = std::time::Instant::now();
    let outcomes: Vec<Result<Outcome>> = todo
        .par_iter()
        .map(|(path, entrance)| batch::track_file(path, config, significance, entrance.as_ref()))
        .collect();

    // Stats are appended sequentially in discovery order
    let total = outcomes.len();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let outcome = outcome?;
        match &outcome {
            Outcome::Tracked(report) => {
                let table = batch::write_history(output, report)?;
                println!(
                    "[{}/{}] {}: {} records, {} tracks (enter {}, exit {}) -> {}",
                    i + 1,
                    total,
                    report.name,
                    report.records,
                    report.tracks,
                    report.counts.enter,
                    report.counts.exit,
                    table.display()
                );
            }
            Outcome::NoData { name, reason } => {
                println!("[{}/{}] {}: no data ({})", i + 1, total, name, reason);
            }
        }
        batch::append_stats(output, &outcome, config)?;
    }

    println!(
        "Done: {} files, elapsed={:.2}s",
        total,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_evaluation(eval: &Evaluation) {
    let d = &eval.diagnostics;
    println!(
        "Tracks: {} created, {} confirmed, {} terminated; match rate {:.3}",
        d.births,
        d.confirmations,
        d.terminations,
        d.match_rate()
    );
    println!(
        "Identity: {} bees, {} switches, fragmentation {:.2}, {} impure tracks",
        eval.identity.targets(),
        eval.identity.id_switches,
        eval.identity.fragmentation(),
        eval.identity.impure_tracks()
    );
}

fn metrics_json(eval: &Evaluation, scenario: &str, seed: u64, elapsed: f64) -> serde_json::Value {
    serde_json::json!({
        "scenario": scenario,
        "seed": seed,
        "elapsed_s": elapsed,
        "diagnostics": eval.diagnostics,
        "id_switches": eval.identity.id_switches,
        "fragmentation": eval.identity.fragmentation(),
        "impure_tracks": eval.identity.impure_tracks(),
        "history_entries": eval.history.len(),
    })
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    config: &PipelineConfig,
    output_path: Option<&Path>,
    replay_path: Option<&Path>,
) -> Result<()> {
    let scenario = Scenario::build(kind, seed);
    println!(
        "Running scenario '{}' (seed={}, frames={})...",
        scenario.name, seed, scenario.frames
    );

    let start = std::time::Instant::now();
    let log = scenario.run();
    let eval = log.evaluate(config.clone())?;
    let elapsed = start.elapsed().as_secs_f64();

    println!(
        "Done: {} frames, {} detections, elapsed={:.2}s",
        log.frames,
        log.detections.len(),
        elapsed
    );
    print_evaluation(&eval);

    if let Some(rpath) = replay_path {
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    if let Some(opath) = output_path {
        let json = metrics_json(&eval, &scenario.name, seed, elapsed);
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
        println!("Metrics saved to {}", opath.display());
    }

    Ok(())
}

fn run_replay(input: &Path, config: &PipelineConfig, output_path: Option<&Path>) -> Result<()> {
    let log = load_replay(input)?;
    println!(
        "Replaying '{}' ({} frames, {} detections)...",
        log.scenario_name,
        log.frames,
        log.detections.len()
    );

    let start = std::time::Instant::now();
    let eval = log.evaluate(config.clone())?;
    let elapsed = start.elapsed().as_secs_f64();
    println!("Replay done: elapsed={:.2}s", elapsed);
    print_evaluation(&eval);

    if let Some(opath) = output_path {
        let json = metrics_json(&eval, &log.scenario_name, log.seed, elapsed);
        std::fs::write(opath, serde_json::to_string_pretty(&json)?)?;
    }

    Ok(())
}
