//! DINONEAT - CLI Entry Point
//!
//! Trains, resumes and replays NEAT agents on the obstacle course.

use clap::{Parser, Subcommand};
use dinoneat::checkpoint::Checkpoint;
use dinoneat::generation::replay_genome;
use dinoneat::persistence::{load_all_time_best, load_summary, write_json_atomic, SUMMARY_FILE};
use dinoneat::render::{Canvas, RecordingCanvas};
use dinoneat::{Config, SaveStore, StopSignal, Trainer};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "dinoneat")]
#[command(version)]
#[command(about = "Side-scrolling obstacle course evolved with NEAT-style reflex agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a fresh training run (clears previous saves)
    Train {
        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Number of generations to evaluate
        #[arg(short, long, default_value = "100")]
        generations: u32,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory for saves and checkpoints
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resume training from a checkpoint
    Resume {
        /// Checkpoint file to resume from
        #[arg(short, long)]
        checkpoint: PathBuf,

        /// Number of additional generations
        #[arg(short, long, default_value = "100")]
        generations: u32,
    },

    /// Replay the all-time best genome
    Replay {
        /// Saves directory of a training run
        #[arg(short, long, default_value = "dino_saves")]
        saves: PathBuf,

        /// Configuration file (YAML)
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Tick limit for the replay
        #[arg(long, default_value = "100000")]
        max_ticks: u64,

        /// World seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Write every drawn frame as JSON to this path
        #[arg(short, long)]
        record: Option<PathBuf>,
    },

    /// Print the all-time best genome of a run
    Best {
        /// Saves directory of a training run
        #[arg(short, long, default_value = "dino_saves")]
        saves: PathBuf,
    },

    /// Generate default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Train {
            config,
            generations,
            seed,
            output,
        } => train(config, generations, seed, output),

        Commands::Resume {
            checkpoint,
            generations,
        } => resume(checkpoint, generations),

        Commands::Replay {
            saves,
            config,
            max_ticks,
            seed,
            record,
        } => replay(saves, config, max_ticks, seed, record),

        Commands::Best { saves } => print_best(saves),

        Commands::Init { output } => generate_config(output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    // RUST_LOG still wins over the configured level
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}

/// Load and validate `path`, or fall back to the defaults when it is missing
fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Config::from_file(path)
    } else {
        Ok(Config::default())
    }
}

fn train(config_path: PathBuf, generations: u32, seed: Option<u64>, output: Option<PathBuf>) -> CliResult {
    let mut config = load_config(&config_path)?;
    init_logging(&config.logging.log_level);

    if config_path.exists() {
        log::info!("Loaded config from {}", config_path.display());
    } else {
        log::info!("{} not found, using default configuration", config_path.display());
    }

    if let Some(output) = output {
        config.persistence.save_dir = output.join("dino_saves");
        config.persistence.checkpoint_dir = output.join("checkpoints");
    }

    let seed = seed.unwrap_or_else(rand::random);
    log::info!("Using seed: {}", seed);
    log::info!(
        "Training {} genomes for up to {} generations",
        config.neat.population_size,
        generations
    );

    let store = SaveStore::fresh(&config.persistence)?;
    let mut trainer = Trainer::new(config, store, seed);
    run_trainer(&mut trainer, generations)
}

fn resume(checkpoint_path: PathBuf, generations: u32) -> CliResult {
    let checkpoint = Checkpoint::load(&checkpoint_path)?;
    init_logging(&checkpoint.config.logging.log_level);

    log::info!(
        "Resuming from {} at generation {}",
        checkpoint_path.display(),
        checkpoint.generation()
    );

    let store = SaveStore::open(&checkpoint.config.persistence)?;
    let mut trainer = Trainer::from_checkpoint(checkpoint, store);
    run_trainer(&mut trainer, generations)
}

/// Raise `stop` on the first Ctrl-C so the generation in progress is saved
/// before the process exits
fn watch_ctrl_c(stop: StopSignal) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        log::warn!("Ctrl+C received, finishing the current generation");
                        stop.raise();
                    }
                    Err(e) => log::warn!("Cannot listen for Ctrl+C: {}", e),
                }
            })
        })?;
    Ok(())
}

fn run_trainer(trainer: &mut Trainer, generations: u32) -> CliResult {
    if let Err(e) = watch_ctrl_c(trainer.stop_signal()) {
        log::warn!("Ctrl+C handler not installed: {}", e);
    }

    let start = Instant::now();
    let summary = trainer.run(generations, None)?;
    let elapsed = start.elapsed();

    println!();
    println!("=== Training Complete ===");
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!("Generations: {}", summary.generations_run);
    if summary.generations_run > 0 {
        println!("Last generation: {}", summary.last_generation);
    }
    if summary.stopped {
        println!("Stopped early");
    }
    match summary.best {
        Some((generation, id, fitness)) => {
            println!("Best genome: {} (generation {}, fitness {:.2})", id, generation, fitness)
        }
        None => println!("Best genome: none"),
    }
    if let Some(path) = summary.checkpoint {
        println!("Final checkpoint: {}", path.display());
    }

    let stats_path = trainer.store().root().join("stats_history.json");
    trainer.history.save(&stats_path)?;
    println!("Stats history: {}", stats_path.display());

    Ok(())
}

fn replay(saves: PathBuf, config_path: PathBuf, max_ticks: u64, seed: u64, record: Option<PathBuf>) -> CliResult {
    let mut config = load_config(&config_path)?;
    init_logging(&config.logging.log_level);
    config.world.max_ticks = Some(config.world.max_ticks.map_or(max_ticks, |m| m.min(max_ticks)));

    let (generation, record_genome) = load_all_time_best(&saves)?;
    let genome = record_genome.to_genome();
    log::info!(
        "Replaying genome {} from generation {} (fitness {:.2})",
        genome.key,
        generation,
        record_genome.fitness
    );

    let mut recording = record.as_ref().map(|_| RecordingCanvas::new());
    let canvas = recording.as_mut().map(|c| c as &mut dyn Canvas);
    let outcome = replay_genome(&genome, &config, &config.neat, canvas, seed)?;

    println!("=== Replay ===");
    println!("Genome: {}", outcome.genome_id);
    println!("Ticks: {}", outcome.ticks);
    println!("Fitness: {:.2}", outcome.fitness);
    println!("Ended: {:?}", outcome.reason);

    if let (Some(path), Some(recording)) = (record, recording) {
        write_json_atomic(&path, &recording)?;
        println!("Recorded {} frames to {}", recording.frame_count(), path.display());
    }

    Ok(())
}

fn print_best(saves: PathBuf) -> CliResult {
    init_logging("warn");

    let summary = load_summary(saves.join(SUMMARY_FILE))?;
    let (generation, record) = load_all_time_best(&saves)?;

    println!("=== All-Time Best ===");
    println!("Generations saved: {}", summary.len());
    println!("Generation: {}", generation);
    println!("Genome: {}", record.genome_id);
    println!("Fitness: {:.2}", record.fitness);
    println!("Nodes: {}", record.nodes.len());
    println!(
        "Connections: {} ({} enabled)",
        record.connections.len(),
        record.connections.iter().filter(|c| c.enabled).count()
    );

    Ok(())
}

fn generate_config(output: PathBuf) -> CliResult {
    init_logging("info");
    let config = Config::default();
    config.save(&output)?;
    println!("Configuration saved to: {}", output.display());
    Ok(())
}
