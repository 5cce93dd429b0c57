//! Generation controller: one full evaluation of a population.
//!
//! Every genome gets one agent in a shared world; the world is stepped until
//! nobody is left, and each genome's fitness is left behind on the genome.

use crate::agent::{Agent, ControllerFactory};
use crate::config::Config;
use crate::neural::{Genome, GenomeId};
use crate::render::{draw_frame, Canvas, FramePacer, Overlay};
use crate::world::World;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop request, raised from outside the tick loop
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Every agent was removed by a collision
    Extinct,
    /// The configured tick limit was reached
    TickLimit,
    /// A stop was requested
    Stopped,
}

/// Result of one generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub generation: u32,
    pub ticks: u64,
    pub final_speed: f32,
    pub collisions: usize,
    pub reason: EndReason,
    /// Final fitness per genome, in population order
    pub fitness: Vec<(GenomeId, f64)>,
}

impl GenerationOutcome {
    pub fn best(&self) -> Option<(GenomeId, f64)> {
        self.fitness
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Generation failures
#[derive(Debug)]
pub enum GenerationError {
    /// The tick loop panicked; fitness written so far is still on the genomes
    Panicked { generation: u32, message: String },
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Panicked {
                generation,
                message,
            } => write!(f, "generation {} aborted: {}", generation, message),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Derive a generation's world seed from the run seed
pub fn generation_seed(run_seed: u64, generation: u32) -> u64 {
    run_seed ^ (generation as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Runs generations against a controller factory
pub struct GenerationRunner<'a> {
    config: &'a Config,
    factory: &'a dyn ControllerFactory,
    canvas: Option<&'a mut dyn Canvas>,
    stop: Option<StopSignal>,
}

impl<'a> GenerationRunner<'a> {
    pub fn new(config: &'a Config, factory: &'a dyn ControllerFactory) -> Self {
        Self {
            config,
            factory,
            canvas: None,
            stop: None,
        }
    }

    /// Draw every tick onto `canvas`
    pub fn with_canvas(mut self, canvas: &'a mut dyn Canvas) -> Self {
        self.canvas = Some(canvas);
        self
    }

    /// Check `stop` between ticks
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    /// Evaluate `genomes` in one shared world seeded with `seed`.
    ///
    /// Every genome's fitness is set, even when the tick loop panics; the
    /// panic is then reported as an error so the caller can still persist
    /// the generation.
    pub fn run_generation(
        &mut self,
        generation: u32,
        genomes: &mut [Genome],
        seed: u64,
    ) -> Result<GenerationOutcome, GenerationError> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.simulate(generation, genomes, seed)
        }));

        match result {
            Ok((ticks, final_speed, collisions, reason)) => {
                let fitness = genomes
                    .iter()
                    .map(|g| {
                        let f = g.fitness.unwrap_or_else(|| {
                            panic!("genome {} finished generation {} without fitness", g.key, generation)
                        });
                        (g.key, f)
                    })
                    .collect();

                Ok(GenerationOutcome {
                    generation,
                    ticks,
                    final_speed,
                    collisions,
                    reason,
                    fitness,
                })
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                for genome in genomes.iter_mut() {
                    genome.fitness.get_or_insert(0.0);
                }
                Err(GenerationError::Panicked {
                    generation,
                    message,
                })
            }
        }
    }

    fn simulate(
        &mut self,
        generation: u32,
        genomes: &mut [Genome],
        seed: u64,
    ) -> (u64, f32, usize, EndReason) {
        let config = self.config;

        let agents: Vec<Agent<'_>> = genomes
            .iter_mut()
            .map(|genome| {
                let controller = self.factory.build(genome);
                Agent::new(genome, controller, &config.agent, &config.world)
            })
            .collect();

        log::debug!("generation {}: {} agents, seed {}", generation, agents.len(), seed);

        let mut world = World::new_with_seed(config, agents, seed);
        let mut pacer = (config.world.frame_pacing && self.canvas.is_some())
            .then(|| FramePacer::new(config.world.fps));
        let mut collisions = 0;
        let mut draw_failed = false;

        let reason = loop {
            if world.is_over() {
                break EndReason::Extinct;
            }
            if self.stop.as_ref().is_some_and(StopSignal::is_raised) {
                world.finish();
                break EndReason::Stopped;
            }
            if config.world.max_ticks.is_some_and(|m| world.state.tick >= m) {
                world.finish();
                break EndReason::TickLimit;
            }

            let report = world.step();
            collisions += report.collisions;

            if let Some(canvas) = self.canvas.as_deref_mut() {
                let overlay = Overlay {
                    generation,
                    alive: report.alive,
                };
                if let Err(e) = draw_frame(canvas, &world, &overlay) {
                    if !draw_failed {
                        log::warn!("drawing failed, continuing headless: {}", e);
                        draw_failed = true;
                    }
                }
            }
            if let Some(pacer) = pacer.as_mut() {
                pacer.wait();
            }
        };

        (world.state.tick, world.state.speed, collisions, reason)
    }
}

/// Result of replaying a single genome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub genome_id: GenomeId,
    pub ticks: u64,
    pub fitness: f64,
    pub reason: EndReason,
}

/// Run one genome alone through a fresh world
pub fn replay_genome(
    genome: &Genome,
    config: &Config,
    factory: &dyn ControllerFactory,
    canvas: Option<&mut dyn Canvas>,
    seed: u64,
) -> Result<ReplayOutcome, GenerationError> {
    let mut genomes = [genome.clone()];
    let mut runner = GenerationRunner::new(config, factory);
    if let Some(canvas) = canvas {
        runner = runner.with_canvas(canvas);
    }

    let outcome = runner.run_generation(0, &mut genomes, seed)?;
    Ok(ReplayOutcome {
        genome_id: genome.key,
        ticks: outcome.ticks,
        fitness: genomes[0].fitness.unwrap_or(0.0),
        reason: outcome.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Controller, NullController};
    use crate::render::RecordingCanvas;

    fn null_factory(_: &Genome) -> Box<dyn Controller> {
        Box::new(NullController)
    }

    #[test]
    fn test_population_of_one_terminates() {
        let config = Config::default();
        let mut genomes = vec![Genome::empty(1)];
        let mut runner = GenerationRunner::new(&config, &null_factory);

        let outcome = runner.run_generation(1, &mut genomes, 5).unwrap();

        assert_eq!(outcome.reason, EndReason::Extinct);
        assert!(outcome.ticks > 0);
        assert!(outcome.collisions >= 1);
        assert_eq!(outcome.fitness.len(), 1);
        assert_eq!(Some(outcome.fitness[0].1), genomes[0].fitness);
    }

    #[test]
    fn test_every_genome_gets_fitness() {
        let config = Config::default();
        let mut genomes: Vec<Genome> = (0..8).map(Genome::empty).collect();
        let mut runner = GenerationRunner::new(&config, &null_factory);

        runner.run_generation(1, &mut genomes, 11).unwrap();

        assert!(genomes.iter().all(|g| g.fitness.is_some()));
    }

    #[test]
    fn test_stop_signal_ends_untaxed() {
        let config = Config::default();
        let stop = StopSignal::new();
        stop.raise();
        let mut genomes = vec![Genome::empty(1), Genome::empty(2)];
        let mut runner = GenerationRunner::new(&config, &null_factory).with_stop(stop);

        let outcome = runner.run_generation(1, &mut genomes, 0).unwrap();

        assert_eq!(outcome.reason, EndReason::Stopped);
        assert_eq!(outcome.ticks, 0);
        assert!(genomes.iter().all(|g| g.fitness == Some(0.0)));
    }

    #[test]
    fn test_tick_limit() {
        let mut config = Config::default();
        config.world.max_ticks = Some(20);
        config.obstacles.live_cap = (0, 0);
        let mut genomes = vec![Genome::empty(1)];
        let mut runner = GenerationRunner::new(&config, &null_factory);

        let outcome = runner.run_generation(1, &mut genomes, 0).unwrap();

        assert_eq!(outcome.reason, EndReason::TickLimit);
        assert_eq!(outcome.ticks, 20);
        assert!((genomes[0].fitness.unwrap() - 20.0 * 0.24).abs() < 1e-9);
    }

    #[test]
    fn test_panicking_controller_is_reported() {
        let config = Config::default();
        let factory = |_: &Genome| -> Box<dyn Controller> {
            Box::new(|_: &[f64]| -> Vec<f64> { panic!("controller exploded") })
        };
        let mut genomes = vec![Genome::empty(1)];
        let mut runner = GenerationRunner::new(&config, &factory);

        let err = runner.run_generation(4, &mut genomes, 3).unwrap_err();

        assert!(err.to_string().contains("controller exploded"));
        assert!(genomes[0].fitness.is_some());
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let config = Config::default();
        let run = || {
            let mut genomes: Vec<Genome> = (0..4).map(Genome::empty).collect();
            let mut runner = GenerationRunner::new(&config, &null_factory);
            runner.run_generation(2, &mut genomes, generation_seed(99, 2)).unwrap()
        };

        let a = run();
        let b = run();
        assert_eq!(a.ticks, b.ticks);
        assert_eq!(a.fitness, b.fitness);
    }

    #[test]
    fn test_replay_draws_frames() {
        let mut config = Config::default();
        config.world.max_ticks = Some(5);
        let mut canvas = RecordingCanvas::new();

        let outcome =
            replay_genome(&Genome::empty(9), &config, &null_factory, Some(&mut canvas), 1).unwrap();

        assert_eq!(outcome.genome_id, 9);
        assert_eq!(outcome.ticks, 5);
        assert_eq!(canvas.frame_count(), 5);
    }
}
