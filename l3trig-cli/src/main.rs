//! l3trig: Level-3 trigger command-line interface.
//!
//! Runs JSON event files through the track and cluster finders and writes
//! one JSON record per event.
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::cast_precision_loss
)]

mod config;
mod engine;

use clap::{Parser, Subcommand};
use engine::Trigger;
use l3trig_core::EventRecord;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] l3trig_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Level-3 trigger: drift-chamber tracks and calorimeter clusters.
#[derive(Parser)]
#[command(name = "l3trig")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a JSON file of events
    Process {
        /// Input JSON array of events
        input: PathBuf,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON configuration; the standard detector when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Worker threads; all cores when omitted
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Summarise the detector geometry
    Geometry {
        /// JSON configuration; the standard detector when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration as JSON
    DefaultConfig {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize)]
struct SuperLayerSummary {
    id: usize,
    layers: usize,
    wires_per_layer: u16,
    axial: bool,
}

#[derive(Debug, Serialize)]
struct GeometrySummary {
    superlayers: Vec<SuperLayerSummary>,
    layers: usize,
    wires: usize,
    rings: usize,
    crystals: usize,
}

fn process(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    config: Option<&std::path::Path>,
    threads: Option<usize>,
) -> Result<()> {
    let config = config::load_config(config)?;
    let events = config::read_events(input)?;
    log::info!("read {} events from {}", events.len(), input.display());

    let prototype = Trigger::new(&config)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.unwrap_or(0))
        .build()?;

    let start = Instant::now();
    let records: Vec<EventRecord> = pool.install(|| {
        events
            .par_iter()
            .map_init(|| prototype.clone(), |trigger, event| trigger.process(event))
            .collect()
    });
    let elapsed = start.elapsed();

    let tracks: usize = records.iter().map(|record| record.tracks.len()).sum();
    let clusters: usize = records.iter().map(|record| record.clusters.len()).sum();
    log::info!(
        "processed {} events in {:.3}s: {tracks} tracks, {clusters} clusters",
        records.len(),
        elapsed.as_secs_f64()
    );
    if !records.is_empty() {
        log::info!(
            "mean {:.1} us per event on {} threads",
            elapsed.as_secs_f64() * 1e6 / records.len() as f64,
            pool.current_num_threads()
        );
    }

    config::write_json(&records, output)
}

fn geometry(config: Option<&std::path::Path>, json: bool) -> Result<()> {
    let config = config::load_config(config)?;
    let trigger = Trigger::new(&config)?;
    let chamber = trigger.tracks().chamber();
    let lattice = trigger.clusters().lattice();

    let summary = GeometrySummary {
        superlayers: chamber
            .superlayers()
            .iter()
            .map(|superlayer| SuperLayerSummary {
                id: superlayer.id(),
                layers: superlayer.n_layers(),
                wires_per_layer: superlayer.n_wires(),
                axial: superlayer.is_axial(),
            })
            .collect(),
        layers: chamber.layers().len(),
        wires: chamber.n_wires(),
        rings: lattice.rings().len(),
        crystals: lattice.n_crystals(),
    };

    if json {
        return config::write_json(&summary, None);
    }
    println!(
        "Drift chamber: {} superlayers, {} layers, {} wires",
        summary.superlayers.len(),
        summary.layers,
        summary.wires
    );
    for superlayer in &summary.superlayers {
        println!(
            "  SL{}: {} layers x {} wires ({})",
            superlayer.id,
            superlayer.layers,
            superlayer.wires_per_layer,
            if superlayer.axial { "axial" } else { "stereo" }
        );
    }
    println!(
        "Calorimeter: {} rings, {} crystals",
        summary.rings, summary.crystals
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Commands::Process {
            input,
            output,
            config,
            threads,
        } => process(&input, output.as_deref(), config.as_deref(), threads),
        Commands::Geometry { config, json } => geometry(config.as_deref(), json),
        Commands::DefaultConfig { output } => {
            config::write_json(&l3trig_core::TriggerConfig::default(), output.as_deref())
        }
    }
}
