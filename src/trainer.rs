//! Training loop: evaluate, persist, checkpoint, breed, repeat.

use crate::agent::ControllerFactory;
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointManager};
use crate::config::Config;
use crate::evolution::{EvolutionEngine, Population};
use crate::generation::{generation_seed, EndReason, GenerationError, GenerationRunner, StopSignal};
use crate::neural::GenomeId;
use crate::persistence::SaveStore;
use crate::render::Canvas;
use crate::stats::{Stats, StatsHistory};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Instant;

/// Salt separating the breeding stream from the world stream
const BREEDING_SALT: u64 = 0x5851_F42D_4C95_7F2D;

/// What a call to [`Trainer::run`] accomplished
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    pub generations_run: u32,
    /// Index of the last generation evaluated
    pub last_generation: u32,
    /// (generation, genome id, fitness) of the all-time best
    pub best: Option<(u32, GenomeId, f64)>,
    pub stopped: bool,
    /// Final checkpoint, if one was written
    pub checkpoint: Option<PathBuf>,
}

/// Drives generations of a population
pub struct Trainer {
    pub config: Config,
    pub population: Population,
    pub history: StatsHistory,
    engine: EvolutionEngine,
    store: SaveStore,
    checkpoints: CheckpointManager,
    /// Controller factory; `None` builds networks from `config.neat`
    factory: Option<Box<dyn ControllerFactory>>,
    stop: StopSignal,
    seed: u64,
}

impl Trainer {
    /// Start a fresh run
    pub fn new(config: Config, store: SaveStore, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let population = Population::new(&config.neat, &mut rng);
        Self::assemble(config, population, store, seed)
    }

    /// Continue a run from a checkpoint
    pub fn from_checkpoint(checkpoint: Checkpoint, mut store: SaveStore) -> Self {
        store.set_summary(checkpoint.summary);
        Self::assemble(checkpoint.config, checkpoint.population, store, checkpoint.random_seed)
    }

    fn assemble(config: Config, population: Population, store: SaveStore, seed: u64) -> Self {
        let persistence = &config.persistence;
        let checkpoints = CheckpointManager::new(
            persistence.checkpoint_dir.clone(),
            persistence.checkpoint_interval,
            persistence.max_checkpoints,
        );

        Self {
            engine: EvolutionEngine::from_config(&config.neat),
            history: StatsHistory::new(config.logging.stats_interval),
            checkpoints,
            factory: None,
            population,
            store,
            stop: StopSignal::new(),
            seed,
            config,
        }
    }

    /// Evaluate genomes with controllers from `factory` instead of the
    /// configured networks
    pub fn with_factory(mut self, factory: Box<dyn ControllerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Handle that stops the run after the current tick
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }

    /// Snapshot of the run before evaluating the current population
    pub fn create_checkpoint(&self) -> Checkpoint {
        let mut population = self.population.clone();
        for genome in &mut population.genomes {
            genome.fitness = None;
        }
        Checkpoint::new(
            self.config.clone(),
            population,
            self.store.summary().clone(),
            self.seed,
        )
    }

    /// Save a checkpoint of the current population
    pub fn save_checkpoint(&mut self) -> Result<PathBuf, CheckpointError> {
        let checkpoint = self.create_checkpoint();
        let path = self.checkpoints.save(&checkpoint)?;
        log::info!("Checkpoint saved for generation {} at {}", checkpoint.generation(), path.display());
        Ok(path)
    }

    /// Evaluate and breed up to `generations` generations.
    ///
    /// A stop request or a failing generation still persists the generation
    /// in progress; a failure is then returned as an error.
    pub fn run(
        &mut self,
        generations: u32,
        mut canvas: Option<&mut dyn Canvas>,
    ) -> Result<TrainingSummary, GenerationError> {
        let mut summary = TrainingSummary::default();

        for _ in 0..generations {
            let generation = self.population.generation;
            if self.stop.is_raised() {
                summary.stopped = true;
                break;
            }

            if self.checkpoints.should_save(generation) {
                if let Err(e) = self.save_checkpoint() {
                    log::warn!("Checkpoint for generation {} failed: {}", generation, e);
                }
            }

            log::info!(
                "Generation {} starting with {} genomes in {} species",
                generation,
                self.population.len(),
                self.population.species.len()
            );
            let started = Instant::now();

            let result = {
                let factory: &dyn ControllerFactory = match &self.factory {
                    Some(factory) => factory.as_ref(),
                    None => &self.config.neat,
                };
                let mut runner = GenerationRunner::new(&self.config, factory)
                    .with_stop(self.stop.clone());
                if let Some(c) = canvas.as_deref_mut() {
                    runner = runner.with_canvas(c);
                }
                runner.run_generation(
                    generation,
                    &mut self.population.genomes,
                    generation_seed(self.seed, generation),
                )
            };

            // Persist whatever the generation produced before anything else
            if let Err(e) = self.store.save_generation(generation, &self.population.genomes) {
                log::warn!("Saving generation {} failed: {}", generation, e);
            }

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("{}", e);
                    return Err(e);
                }
            };

            let mut stats = Stats::from_outcome(&outcome, &self.population.genomes, &self.config.neat);
            stats.generations_per_second = 1.0 / started.elapsed().as_secs_f32().max(1e-6);
            self.history.record(stats);

            summary.generations_run += 1;
            summary.last_generation = generation;

            if outcome.reason == EndReason::Stopped {
                log::info!("Stop requested; generation {} saved", generation);
                summary.stopped = true;
                break;
            }

            let mut rng = ChaCha8Rng::seed_from_u64(generation_seed(self.seed, generation) ^ BREEDING_SALT);
            self.population.advance(&self.engine, &mut rng);
        }

        summary.best = self
            .store
            .all_time_best()
            .map(|(generation, record)| (generation, record.genome_id, record.fitness));

        if self.config.persistence.checkpoint_interval > 0 {
            match self.save_checkpoint() {
                Ok(path) => summary.checkpoint = Some(path),
                Err(e) => log::warn!("Final checkpoint failed: {}", e),
            }
        }

        Ok(summary)
    }
}
