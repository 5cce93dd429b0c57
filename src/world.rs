//! World simulation engine - the per-tick environment step.
//!
//! [`SimulationState`] holds everything shared by all agents of a generation
//! (tick counter, scroll speed, obstacle stream). Only [`World::step`] writes
//! to it, once per tick.

use crate::agent::Agent;
use crate::config::Config;
use crate::neural::GenomeId;
use crate::obstacle::ObstacleStream;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// Shared per-generation state
#[derive(Debug, Clone)]
pub struct SimulationState {
    /// Ticks simulated so far
    pub tick: u64,
    /// Displayed score; one point per tick
    pub score: u64,
    /// Shared scroll speed
    pub speed: f32,
    pub obstacles: ObstacleStream,
    /// Scroll offset of the background track, in `(-field_width, 0]`
    pub background_x: f32,
}

impl SimulationState {
    pub fn new(config: &Config) -> Self {
        Self {
            tick: 0,
            score: 0,
            speed: config.fitness.initial_speed,
            obstacles: ObstacleStream::new(),
            background_x: 0.0,
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub spawned: usize,
    pub despawned: usize,
    pub collisions: usize,
    /// Genomes whose agents were removed this tick, in removal order
    pub removed: Vec<GenomeId>,
    pub alive: usize,
}

/// The simulation world for one generation
pub struct World<'g> {
    pub state: SimulationState,
    pub agents: Vec<Agent<'g>>,

    config: Config,

    // Random number generator (seeded for reproducibility)
    rng: ChaCha8Rng,
    seed: u64,
}

impl<'g> World<'g> {
    /// Create a world around an already built set of agents
    pub fn new_with_seed(config: &Config, agents: Vec<Agent<'g>>, seed: u64) -> Self {
        Self {
            state: SimulationState::new(config),
            agents,
            config: config.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Main simulation step
    pub fn step(&mut self) -> TickReport {
        let mut report = TickReport::default();

        // Phase 1: Obstacles spawn, scroll and despawn
        report.spawned = self.state.obstacles.maybe_spawn(
            self.state.tick,
            self.config.world.fps,
            self.config.world.field_width,
            &self.config.obstacles,
            &mut self.rng,
        );
        report.despawned = self.state.obstacles.advance(self.state.speed);
        self.scroll_background();

        // Phase 2: Agents advance (grace countdown, then locomotion)
        for agent in &mut self.agents {
            agent.update();
        }

        // Phase 3: Collisions
        let removed = self.resolve_collisions(&mut report);

        // Phase 4: Controllers decide against the nearest obstacle
        if let Some(nearest) = self.state.obstacles.nearest() {
            let speed = self.state.speed;
            for (idx, agent) in self.agents.iter_mut().enumerate() {
                if !removed.contains(&idx) {
                    agent.think(nearest, speed);
                }
            }
        }

        // Phase 5: Survival reward
        let reward =
            self.config.fitness.survival_reward + self.config.fitness.speed_reward * self.state.speed as f64;
        for (idx, agent) in self.agents.iter_mut().enumerate() {
            if !removed.contains(&idx) && !agent.is_invulnerable() {
                agent.reward(reward);
            }
        }

        // Phase 6: Score and difficulty ramp
        self.state.tick += 1;
        self.state.score += 1;
        if self.state.score % self.config.fitness.speed_step_ticks == 0 {
            self.state.speed += 1.0;
        }

        // Phase 7: Remove dead agents
        report.removed = self.remove_dead(&removed);
        report.alive = self.agents.len();

        report
    }

    /// Every (obstacle, agent) pair; returns indices of agents that died
    fn resolve_collisions(&mut self, report: &mut TickReport) -> BTreeSet<usize> {
        let penalty = self.config.fitness.collision_penalty;
        let grace = self.config.agent.grace_ticks;
        let mut dead = BTreeSet::new();

        for obstacle in self.state.obstacles.iter() {
            for (idx, agent) in self.agents.iter_mut().enumerate() {
                if agent.is_invulnerable() {
                    continue;
                }
                if agent.rect.overlaps(&obstacle.rect) {
                    report.collisions += 1;
                    if agent.hit(penalty, grace) {
                        dead.insert(idx);
                    }
                }
            }
        }

        dead
    }

    /// Remove agents in descending index order so pending indices stay valid.
    /// Each removal pays the death tax first.
    fn remove_dead(&mut self, dead: &BTreeSet<usize>) -> Vec<GenomeId> {
        let tax = self.config.fitness.death_tax;
        let mut removed = Vec::with_capacity(dead.len());

        for &idx in dead.iter().rev() {
            assert!(
                idx < self.agents.len(),
                "agent index {} out of range ({} alive) during pruning",
                idx,
                self.agents.len()
            );
            let mut agent = self.agents.remove(idx);
            agent.reward(-tax);
            log::debug!(
                "tick {}: genome {} removed with fitness {:.3}",
                self.state.tick,
                agent.genome_id,
                agent.fitness()
            );
            removed.push(agent.genome_id);
        }

        removed
    }

    fn scroll_background(&mut self) {
        let width = self.config.world.field_width;
        self.state.background_x -= self.state.speed;
        if self.state.background_x <= -width {
            self.state.background_x += width;
        }
    }

    /// End the generation without penalties; surviving agents keep their
    /// fitness as is. Returns their genome ids.
    pub fn finish(&mut self) -> Vec<GenomeId> {
        self.agents.drain(..).map(|a| a.genome_id).collect()
    }

    /// Run until no agent is alive or `max_ticks` is reached
    pub fn run(&mut self, max_ticks: Option<u64>) -> u64 {
        while !self.is_over() && max_ticks.map_or(true, |m| self.state.tick < m) {
            self.step();
        }
        self.state.tick
    }

    /// Get current population count
    pub fn population(&self) -> usize {
        self.agents.len()
    }

    pub fn is_over(&self) -> bool {
        self.agents.is_empty()
    }

    /// Get seed for reproducibility
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
