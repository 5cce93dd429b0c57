//! Speciation by compatibility distance.
//!
//! Genomes are grouped around a representative; a species that has not
//! improved its best fitness for `max_stagnation` generations is dropped,
//! and the survivors share the next generation in proportion to their
//! adjusted fitness.

use crate::config::NeatConfig;
use crate::neural::{Genome, GenomeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Species identifier, unique within a run
pub type SpeciesId = u32;

/// Lookup from genome id to the evaluated genome
pub type GenomeIndex<'a> = HashMap<GenomeId, &'a Genome>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Species {
    pub key: SpeciesId,
    /// Generation the species first appeared in
    pub created: u32,
    pub last_improved: u32,
    pub representative: Genome,
    pub members: Vec<GenomeId>,
    /// Best member fitness of the latest generation
    pub fitness: Option<f64>,
    /// Best member fitness ever seen
    pub best_fitness: Option<f64>,
}

impl Species {
    fn new(key: SpeciesId, generation: u32, representative: Genome) -> Self {
        Self {
            key,
            created: generation,
            last_improved: generation,
            representative,
            members: Vec::new(),
            fitness: None,
            best_fitness: None,
        }
    }

    fn member_fitness(&self, index: &GenomeIndex<'_>) -> Vec<f64> {
        self.members
            .iter()
            .filter_map(|id| index.get(id))
            .filter_map(|g| g.fitness)
            .collect()
    }
}

/// Every live species of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesSet {
    pub species: BTreeMap<SpeciesId, Species>,
    next_key: SpeciesId,
}

impl SpeciesSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn get(&self, key: SpeciesId) -> Option<&Species> {
        self.species.get(&key)
    }

    /// Species holding `genome`, if any
    pub fn species_of(&self, genome: GenomeId) -> Option<SpeciesId> {
        self.species
            .values()
            .find(|s| s.members.contains(&genome))
            .map(|s| s.key)
    }

    /// Partition `genomes` into species.
    ///
    /// Each existing species first takes the genome closest to its old
    /// representative; the rest join the nearest representative within
    /// `compatibility_threshold` or found a new species. Species left with
    /// no genome disappear.
    pub fn speciate(&mut self, genomes: &[Genome], generation: u32, config: &NeatConfig) {
        let mut unspeciated: Vec<usize> = (0..genomes.len()).collect();
        let mut representatives: Vec<(SpeciesId, usize)> = Vec::new();

        for (&key, species) in &self.species {
            let closest = unspeciated
                .iter()
                .enumerate()
                .map(|(slot, &i)| (slot, genomes[i].distance(&species.representative, config)))
                .min_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((slot, _)) = closest {
                representatives.push((key, unspeciated.remove(slot)));
            }
        }

        let mut members: BTreeMap<SpeciesId, Vec<GenomeId>> = representatives
            .iter()
            .map(|&(key, i)| (key, vec![genomes[i].key]))
            .collect();
        let mut founded = Vec::new();

        for i in unspeciated {
            let genome = &genomes[i];
            let nearest = representatives
                .iter()
                .map(|&(key, rep)| (key, genome.distance(&genomes[rep], config)))
                .filter(|&(_, d)| d < config.compatibility_threshold)
                .min_by(|a, b| a.1.total_cmp(&b.1));

            match nearest {
                Some((key, _)) => members.entry(key).or_default().push(genome.key),
                None => {
                    let key = self.next_key;
                    self.next_key += 1;
                    representatives.push((key, i));
                    members.insert(key, vec![genome.key]);
                    founded.push(key);
                }
            }
        }

        let mut previous = std::mem::take(&mut self.species);
        for (key, rep) in representatives {
            let mut species = previous
                .remove(&key)
                .unwrap_or_else(|| Species::new(key, generation, genomes[rep].clone()));
            species.representative = genomes[rep].clone();
            species.members = members.remove(&key).unwrap_or_default();
            self.species.insert(key, species);
        }

        if !founded.is_empty() {
            log::debug!("Generation {}: new species {:?}", generation, founded);
        }
    }

    /// Refresh each species' fitness and drop the stagnant ones.
    ///
    /// The `species_elitism` fittest species are always kept, as is the
    /// fittest one when every species has stagnated.
    pub fn remove_stagnant(
        &mut self,
        index: &GenomeIndex<'_>,
        generation: u32,
        config: &NeatConfig,
    ) -> Vec<SpeciesId> {
        for species in self.species.values_mut() {
            let fitness = species.member_fitness(index).into_iter().max_by(f64::total_cmp);
            species.fitness = fitness;
            if let Some(f) = fitness {
                if species.best_fitness.map_or(true, |best| f > best) {
                    species.best_fitness = Some(f);
                    species.last_improved = generation;
                }
            }
        }

        // Weakest first
        let mut ranked: Vec<&Species> = self.species.values().collect();
        ranked.sort_by(|a, b| {
            let fa = a.fitness.unwrap_or(f64::NEG_INFINITY);
            let fb = b.fitness.unwrap_or(f64::NEG_INFINITY);
            fa.total_cmp(&fb).then(b.key.cmp(&a.key))
        });

        let total = ranked.len();
        let mut non_stagnant = total;
        let mut stagnant = Vec::new();
        for (rank, species) in ranked.iter().enumerate() {
            let protected = total - rank <= config.species_elitism;
            let stale = generation.saturating_sub(species.last_improved) >= config.max_stagnation;
            if stale && !protected && non_stagnant > config.species_elitism {
                stagnant.push(species.key);
                non_stagnant -= 1;
            }
        }

        if stagnant.len() == total {
            stagnant.pop();
        }
        for key in &stagnant {
            self.species.remove(key);
        }
        stagnant
    }

    /// Mean member fitness of each species, rescaled by the population's
    /// fitness range so that every value lies in [0, 1]
    pub fn adjusted_fitness(&self, index: &GenomeIndex<'_>) -> Vec<(SpeciesId, f64)> {
        let all: Vec<f64> = self
            .species
            .values()
            .flat_map(|s| s.member_fitness(index))
            .collect();
        let min = all.iter().copied().fold(f64::INFINITY, f64::min);
        let max = all.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = (max - min).max(1.0);

        self.species
            .values()
            .map(|s| {
                let fitness = s.member_fitness(index);
                let adjusted = if fitness.is_empty() {
                    0.0
                } else {
                    let mean = fitness.iter().sum::<f64>() / fitness.len() as f64;
                    (mean - min) / range
                };
                (s.key, adjusted)
            })
            .collect()
    }
}

/// Split `total` offspring across species in proportion to `adjusted`.
///
/// Every species gets at least `min_size` (or an even share when that does
/// not fit), the remainder goes out by largest fractional part, and the
/// counts always sum to `total`.
pub fn allocate_offspring(adjusted: &[f64], total: usize, min_size: usize) -> Vec<usize> {
    let n = adjusted.len();
    if n == 0 {
        return Vec::new();
    }

    let floor = min_size.min(total / n);
    let remaining = total - floor * n;
    let sum: f64 = adjusted.iter().map(|a| a.max(0.0)).sum();
    let quotas: Vec<f64> = adjusted
        .iter()
        .map(|a| {
            let share = if sum > 0.0 { a.max(0.0) / sum } else { 1.0 / n as f64 };
            share * remaining as f64
        })
        .collect();

    let mut counts: Vec<usize> = quotas.iter().map(|q| floor + q.floor() as usize).collect();
    let assigned: usize = counts.iter().sum();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let fa = quotas[a] - quotas[a].floor();
        let fb = quotas[b] - quotas[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    for &i in order.iter().cycle().take(total.saturating_sub(assigned)) {
        counts[i] += 1;
    }

    counts
}

/// Index evaluated genomes by id
pub fn index_genomes(genomes: &[Genome]) -> GenomeIndex<'_> {
    genomes.iter().map(|g| (g.key, g)).collect()
}
