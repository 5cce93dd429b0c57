//! Statistics tracking across generations.

use crate::config::NeatConfig;
use crate::generation::{EndReason, GenerationOutcome};
use crate::neural::Genome;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Statistics snapshot for one finished generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Stats {
    pub generation: u32,
    pub population: usize,
    /// Ticks the generation lasted
    pub ticks: u64,
    /// Scroll speed when the generation ended
    pub final_speed: f32,
    pub collisions: usize,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    pub min_fitness: f64,
    /// Mean hidden node count
    pub hidden_mean: f32,
    /// Mean enabled connection count
    pub connections_mean: f32,
    pub reason: EndReason,
    /// Generations per second (performance)
    pub generations_per_second: f32,
}

impl Stats {
    /// Build stats from an outcome and the evaluated genomes
    pub fn from_outcome(outcome: &GenerationOutcome, genomes: &[Genome], config: &NeatConfig) -> Self {
        let n = outcome.fitness.len().max(1) as f64;
        let fitness = outcome.fitness.iter().map(|&(_, f)| f);

        let (hidden, connections) = genomes
            .iter()
            .map(|g| g.size(config))
            .fold((0usize, 0usize), |(h, c), (gh, gc)| (h + gh, c + gc));
        let genome_count = genomes.len().max(1) as f32;

        Self {
            generation: outcome.generation,
            population: outcome.fitness.len(),
            ticks: outcome.ticks,
            final_speed: outcome.final_speed,
            collisions: outcome.collisions,
            best_fitness: fitness.clone().fold(f64::NEG_INFINITY, f64::max),
            mean_fitness: fitness.clone().sum::<f64>() / n,
            min_fitness: fitness.fold(f64::INFINITY, f64::min),
            hidden_mean: hidden as f32 / genome_count,
            connections_mean: connections as f32 / genome_count,
            reason: outcome.reason,
            generations_per_second: 0.0,
        }
    }

    /// Format stats as a one-line summary
    pub fn summary(&self) -> String {
        format!(
            "Gen:{:5} | Pop:{:4} | Ticks:{:6} | Speed:{:4.0} | Best:{:9.2} | Mean:{:9.2} | Min:{:9.2} | Hidden:{:.1} | Conn:{:.1}",
            self.generation,
            self.population,
            self.ticks,
            self.final_speed,
            self.best_fitness,
            self.mean_fitness,
            self.min_fitness,
            self.hidden_mean,
            self.connections_mean,
        )
    }
}

/// Historical statistics tracker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsHistory {
    /// All recorded stats snapshots
    pub snapshots: Vec<Stats>,
    /// Generations between logged summaries
    pub interval: u32,
}

impl StatsHistory {
    /// Create new history with logging interval
    pub fn new(interval: u32) -> Self {
        Self {
            snapshots: Vec::new(),
            interval,
        }
    }

    /// Record a stats snapshot, logging a summary every `interval` generations
    pub fn record(&mut self, stats: Stats) {
        if self.interval > 0 && stats.generation % self.interval == 0 {
            log::info!("{}", stats.summary());
        }
        self.snapshots.push(stats);
    }

    pub fn latest(&self) -> Option<&Stats> {
        self.snapshots.last()
    }

    /// Best fitness over generations
    pub fn best_series(&self) -> Vec<(u32, f64)> {
        self.snapshots
            .iter()
            .map(|s| (s.generation, s.best_fitness))
            .collect()
    }

    /// Survival ticks over generations
    pub fn ticks_series(&self) -> Vec<(u32, u64)> {
        self.snapshots.iter().map(|s| (s.generation, s.ticks)).collect()
    }

    /// Save history to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Load history from file
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
