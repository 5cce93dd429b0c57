//! Evolution mechanics and selection.

use crate::config::NeatConfig;
use crate::neural::{CrossoverStrategy, Genome, GenomeId};
use crate::species::{allocate_offspring, index_genomes, SpeciesSet};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The genomes of the current generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    /// 1-based index of the generation these genomes belong to
    pub generation: u32,
    pub genomes: Vec<Genome>,
    pub next_genome_id: GenomeId,
    /// Species as of the last breeding step
    pub species: SpeciesSet,
}

impl Population {
    /// Fresh, fully connected population for generation 1
    pub fn new(config: &NeatConfig, rng: &mut impl Rng) -> Self {
        let genomes = (1..=config.population_size as GenomeId)
            .map(|id| Genome::new_initial(id, config, rng))
            .collect();

        Self {
            generation: 1,
            genomes,
            next_genome_id: config.population_size as GenomeId + 1,
            species: SpeciesSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    /// Highest-fitness genome of the evaluated generation
    pub fn best(&self) -> Option<&Genome> {
        self.genomes
            .iter()
            .filter(|g| g.fitness.is_some())
            .max_by(|a, b| a.fitness_or_min().total_cmp(&b.fitness_or_min()))
    }

    /// Replace the evaluated genomes with their offspring
    pub fn advance(&mut self, engine: &EvolutionEngine, rng: &mut impl Rng) {
        self.genomes = engine.reproduce(
            &mut self.species,
            &self.genomes,
            self.generation,
            &mut self.next_genome_id,
            rng,
        );
        self.generation += 1;
    }
}

/// Evolution engine for managing population genetics
pub struct EvolutionEngine {
    pub config: NeatConfig,
    pub crossover_strategy: CrossoverStrategy,
}

impl EvolutionEngine {
    /// Create evolution engine from config
    pub fn from_config(config: &NeatConfig) -> Self {
        Self {
            config: config.clone(),
            crossover_strategy: CrossoverStrategy::FitterParent,
        }
    }

    /// Breed the next generation from evaluated genomes.
    ///
    /// The genomes are speciated, stagnant species are dropped and the
    /// population is split across the survivors by adjusted fitness. Within
    /// a species the `elitism` best are copied unchanged and the rest are
    /// bred from its top `survival_threshold` fraction by tournament,
    /// crossover and mutation. Every child gets a fresh id and no fitness.
    pub fn reproduce(
        &self,
        species: &mut SpeciesSet,
        genomes: &[Genome],
        generation: u32,
        next_id: &mut GenomeId,
        rng: &mut impl Rng,
    ) -> Vec<Genome> {
        if genomes.is_empty() {
            return Vec::new();
        }

        let index = index_genomes(genomes);
        species.speciate(genomes, generation, &self.config);
        for key in species.remove_stagnant(&index, generation, &self.config) {
            log::info!("Species {} removed after {} stagnant generations", key, self.config.max_stagnation);
        }

        let adjusted = species.adjusted_fitness(&index);
        let shares: Vec<f64> = adjusted.iter().map(|&(_, a)| a).collect();
        let spawn = allocate_offspring(&shares, self.config.population_size, self.config.min_species_size);
        log::debug!(
            "Generation {}: {} species, offspring {:?}",
            generation,
            species.len(),
            spawn
        );

        let mut offspring = Vec::with_capacity(self.config.population_size);
        for (&(key, _), count) in adjusted.iter().zip(spawn) {
            let members = species
                .get(key)
                .map(|s| s.members.iter().filter_map(|id| index.get(id).copied()).collect::<Vec<_>>())
                .unwrap_or_default();
            offspring.extend(self.breed(members, count, next_id, rng));
        }

        offspring
    }

    /// `count` children of one species
    fn breed(&self, members: Vec<&Genome>, count: usize, next_id: &mut GenomeId, rng: &mut impl Rng) -> Vec<Genome> {
        let ranked = rank(members);
        if ranked.is_empty() {
            return Vec::new();
        }

        let mut fresh_id = || {
            let id = *next_id;
            *next_id += 1;
            id
        };

        let mut offspring = Vec::with_capacity(count);

        for elite in ranked.iter().take(self.config.elitism.min(count)) {
            let mut child = (*elite).clone();
            child.key = fresh_id();
            child.fitness = None;
            offspring.push(child);
        }

        let cutoff = ((ranked.len() as f64 * self.config.survival_threshold).ceil() as usize)
            .clamp(1, ranked.len());
        let pool = &ranked[..cutoff];

        while offspring.len() < count {
            let key = fresh_id();
            let parent1 = self.select_parent(pool, rng);

            let mut child = if pool.len() > 1 && rng.gen::<f64>() < self.config.crossover_rate {
                let parent2 = self.select_parent(pool, rng);
                parent1.crossover_with_strategy(parent2, key, &self.crossover_strategy, rng)
            } else {
                let mut clone = parent1.clone();
                clone.key = key;
                clone
            };

            child.fitness = None;
            child.mutate(&self.config, rng);
            offspring.push(child);
        }

        offspring
    }

    /// Tournament selection
    pub fn select_parent<'a>(&self, pool: &[&'a Genome], rng: &mut impl Rng) -> &'a Genome {
        let k = self.config.tournament_size.clamp(1, pool.len());
        pool.choose_multiple(rng, k)
            .copied()
            .max_by(|a, b| a.fitness_or_min().total_cmp(&b.fitness_or_min()))
            .unwrap_or(pool[0])
    }

    /// Get elite genomes (top performers)
    pub fn get_elites<'a>(&self, genomes: &'a [Genome], count: usize) -> Vec<&'a Genome> {
        rank(genomes).into_iter().take(count).collect()
    }
}

/// Genomes sorted by fitness, best first; unevaluated genomes last
fn rank<'a>(genomes: impl IntoIterator<Item = &'a Genome>) -> Vec<&'a Genome> {
    let mut ranked: Vec<&Genome> = genomes.into_iter().collect();
    ranked.sort_by(|a, b| b.fitness_or_min().total_cmp(&a.fitness_or_min()));
    ranked
}
