//! Genetic crossover between genomes.

use super::genome::{Genome, GenomeId};
use rand::Rng;

/// Strategy for crossover operations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CrossoverStrategy {
    /// Topology from the fitter parent; matching genes inherited from either
    #[default]
    FitterParent,
    /// Topology from the fitter parent; matching weights and biases averaged
    Average,
}

impl Genome {
    /// Crossover with another genome, producing a child with id `key`
    pub fn crossover(&self, other: &Self, key: GenomeId, rng: &mut impl Rng) -> Self {
        self.crossover_with_strategy(other, key, &CrossoverStrategy::default(), rng)
    }

    /// Crossover with specified strategy.
    ///
    /// Disjoint and excess genes always come from the fitter parent (ties go
    /// to `self`), so the child keeps a topology that was actually evaluated.
    pub fn crossover_with_strategy(
        &self,
        other: &Self,
        key: GenomeId,
        strategy: &CrossoverStrategy,
        rng: &mut impl Rng,
    ) -> Self {
        let (primary, secondary) = if self.fitness_or_min() >= other.fitness_or_min() {
            (self, other)
        } else {
            (other, self)
        };

        let mut child = Genome::empty(key);

        for (conn_key, gene) in &primary.connections {
            let mut inherited = gene.clone();
            if let Some(other_gene) = secondary.connections.get(conn_key) {
                match strategy {
                    CrossoverStrategy::FitterParent => {
                        if rng.gen_bool(0.5) {
                            inherited.weight = other_gene.weight;
                        }
                    }
                    CrossoverStrategy::Average => {
                        inherited.weight = (gene.weight + other_gene.weight) / 2.0;
                    }
                }
                // A link disabled in either parent stays disabled 75% of the time
                if !gene.enabled || !other_gene.enabled {
                    inherited.enabled = rng.gen::<f64>() >= 0.75;
                }
            }
            child.connections.insert(*conn_key, inherited);
        }

        for (node_key, gene) in &primary.nodes {
            let mut inherited = gene.clone();
            if let Some(other_gene) = secondary.nodes.get(node_key) {
                match strategy {
                    CrossoverStrategy::FitterParent => {
                        if rng.gen_bool(0.5) {
                            inherited.bias = other_gene.bias;
                            inherited.response = other_gene.response;
                            inherited.activation = other_gene.activation;
                            inherited.aggregation = other_gene.aggregation;
                        }
                    }
                    CrossoverStrategy::Average => {
                        inherited.bias = (gene.bias + other_gene.bias) / 2.0;
                        inherited.response = (gene.response + other_gene.response) / 2.0;
                    }
                }
            }
            child.nodes.insert(*node_key, inherited);
        }

        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NeatConfig;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_crossover_fitter_parent() {
        let config = NeatConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut parent1 = Genome::new_initial(1, &config, &mut rng);
        let mut parent2 = Genome::new_initial(2, &config, &mut rng);
        parent1.fitness = Some(100.0);
        parent2.fitness = Some(50.0);

        let child = parent1.crossover(&parent2, 10, &mut rng);

        assert_eq!(child.key, 10);
        assert!(child.fitness.is_none());
        assert_eq!(child.connections.len(), parent1.connections.len());
        for (key, gene) in &child.connections {
            let a = parent1.connections[key].weight;
            let b = parent2.connections[key].weight;
            assert!(gene.weight == a || gene.weight == b);
        }
        assert!(child.is_valid());
    }

    #[test]
    fn test_crossover_average() {
        let config = NeatConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let parent1 = Genome::new_initial(1, &config, &mut rng);
        let parent2 = Genome::new_initial(2, &config, &mut rng);

        let child =
            parent1.crossover_with_strategy(&parent2, 3, &CrossoverStrategy::Average, &mut rng);

        let key = (-1, 0);
        let expected = (parent1.connections[&key].weight + parent2.connections[&key].weight) / 2.0;
        assert!((child.connections[&key].weight - expected).abs() < 1e-12);
    }

    #[test]
    fn test_crossover_different_topologies() {
        let config = NeatConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut parent1 = Genome::new_initial(1, &config, &mut rng);
        let mut parent2 = Genome::new_initial(2, &config, &mut rng);
        parent2.mutate_add_node(&config, &mut rng);
        parent2.mutate_add_node(&config, &mut rng);
        parent1.fitness = Some(1.0);
        parent2.fitness = Some(9.0);

        // Fitter parent is the argument here; its topology wins
        let child = parent1.crossover(&parent2, 5, &mut rng);

        assert_eq!(
            child.nodes.keys().collect::<Vec<_>>(),
            parent2.nodes.keys().collect::<Vec<_>>()
        );
        assert_eq!(child.connections.len(), parent2.connections.len());
    }
}
