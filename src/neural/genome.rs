//! NEAT genome: node genes and connection genes.
//!
//! Key conventions: input nodes are `-1..=-num_inputs`, output nodes are
//! `0..num_outputs`, hidden nodes take the next free key above the largest one
//! in use. Inputs have no node gene; they are pure pass-through slots.

use super::activation::{Activation, Aggregation};
use crate::config::NeatConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generation-scoped genome identifier
pub type GenomeId = u64;

/// Node key (negative for inputs)
pub type NodeKey = i64;

/// Connection key: (source node, target node)
pub type ConnectionKey = (NodeKey, NodeKey);

/// Parameters of a single output or hidden node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeGene {
    pub key: NodeKey,
    pub bias: f64,
    pub response: f64,
    pub activation: Activation,
    pub aggregation: Aggregation,
}

impl NodeGene {
    pub fn new(key: NodeKey, config: &NeatConfig, rng: &mut impl Rng) -> Self {
        Self {
            key,
            bias: random_symmetric(rng, config.init_bias_range),
            response: 1.0,
            activation: config.activation_default,
            aggregation: config.aggregation_default,
        }
    }
}

/// Weighted link between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGene {
    pub key: ConnectionKey,
    pub weight: f64,
    pub enabled: bool,
}

impl ConnectionGene {
    pub fn new(key: ConnectionKey, weight: f64) -> Self {
        Self {
            key,
            weight,
            enabled: true,
        }
    }
}

/// An evolvable controller topology plus its fitness slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub key: GenomeId,
    pub nodes: BTreeMap<NodeKey, NodeGene>,
    pub connections: BTreeMap<ConnectionKey, ConnectionGene>,
    /// Written in place by the simulation; read back by reproduction
    pub fitness: Option<f64>,
}

impl Genome {
    /// Genome with no genes at all
    pub fn empty(key: GenomeId) -> Self {
        Self {
            key,
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            fitness: None,
        }
    }

    /// Fresh genome: output nodes only, every input fully connected to every output
    pub fn new_initial(key: GenomeId, config: &NeatConfig, rng: &mut impl Rng) -> Self {
        let mut genome = Self::empty(key);

        for output in output_keys(config) {
            genome.nodes.insert(output, NodeGene::new(output, config, rng));
        }

        for input in input_keys(config) {
            for output in output_keys(config) {
                let weight = random_symmetric(rng, config.init_weight_range);
                genome
                    .connections
                    .insert((input, output), ConnectionGene::new((input, output), weight));
            }
        }

        genome
    }

    /// Next unused node key
    pub fn next_node_key(&self) -> NodeKey {
        self.nodes.keys().next_back().map_or(0, |&k| k + 1)
    }

    /// Number of hidden nodes and enabled connections
    pub fn size(&self, config: &NeatConfig) -> (usize, usize) {
        let hidden = self.nodes.len().saturating_sub(config.num_outputs);
        let enabled = self.connections.values().filter(|c| c.enabled).count();
        (hidden, enabled)
    }

    /// Fitness with unevaluated genomes ranked last
    pub fn fitness_or_min(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }

    /// Compatibility distance used to group genomes into species.
    ///
    /// Node and connection terms are each the weighted sum of homologous
    /// gene differences plus the disjoint-gene count, normalized by the
    /// larger genome's gene count.
    pub fn distance(&self, other: &Genome, config: &NeatConfig) -> f64 {
        let node_distance = gene_distance(
            &self.nodes,
            &other.nodes,
            config,
            |a, b| {
                let mut d = (a.bias - b.bias).abs() + (a.response - b.response).abs();
                if a.activation != b.activation {
                    d += 1.0;
                }
                if a.aggregation != b.aggregation {
                    d += 1.0;
                }
                d
            },
        );
        let connection_distance = gene_distance(
            &self.connections,
            &other.connections,
            config,
            |a, b| {
                let mut d = (a.weight - b.weight).abs();
                if a.enabled != b.enabled {
                    d += 1.0;
                }
                d
            },
        );
        node_distance + connection_distance
    }

    /// All weights and biases finite
    pub fn is_valid(&self) -> bool {
        self.nodes
            .values()
            .all(|n| n.bias.is_finite() && n.response.is_finite())
            && self.connections.values().all(|c| c.weight.is_finite())
    }
}

/// Input node keys in sense-vector order
pub fn input_keys(config: &NeatConfig) -> Vec<NodeKey> {
    (1..=config.num_inputs as NodeKey).map(|i| -i).collect()
}

/// Output node keys in action-vector order
pub fn output_keys(config: &NeatConfig) -> Vec<NodeKey> {
    (0..config.num_outputs as NodeKey).collect()
}

fn gene_distance<K: Ord, G>(
    ours: &BTreeMap<K, G>,
    theirs: &BTreeMap<K, G>,
    config: &NeatConfig,
    homologous: impl Fn(&G, &G) -> f64,
) -> f64 {
    let max_genes = ours.len().max(theirs.len());
    if max_genes == 0 {
        return 0.0;
    }

    let mut disjoint = theirs.keys().filter(|k| !ours.contains_key(k)).count();
    let mut shared = 0.0;
    for (key, gene) in ours {
        match theirs.get(key) {
            Some(other) => shared += homologous(gene, other),
            None => disjoint += 1,
        }
    }

    (shared * config.compatibility_weight_coefficient
        + disjoint as f64 * config.compatibility_disjoint_coefficient)
        / max_genes as f64
}

pub(crate) fn random_symmetric(rng: &mut impl Rng, range: f64) -> f64 {
    if range <= 0.0 {
        0.0
    } else {
        rng.gen_range(-range..=range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_initial_genome_fully_connected() {
        let config = NeatConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let genome = Genome::new_initial(1, &config, &mut rng);

        assert_eq!(genome.nodes.len(), config.num_outputs);
        assert_eq!(genome.connections.len(), config.num_inputs * config.num_outputs);
        assert!(genome.connections.contains_key(&(-1, 0)));
        assert!(genome.connections.contains_key(&(-6, 1)));
        assert!(genome.fitness.is_none());
        assert!(genome.is_valid());
    }

    #[test]
    fn test_key_conventions() {
        let config = NeatConfig::default();
        assert_eq!(input_keys(&config), vec![-1, -2, -3, -4, -5, -6]);
        assert_eq!(output_keys(&config), vec![0, 1]);
    }

    #[test]
    fn test_next_node_key() {
        let config = NeatConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut genome = Genome::new_initial(1, &config, &mut rng);
        assert_eq!(genome.next_node_key(), 2);

        genome.nodes.insert(9, NodeGene::new(9, &config, &mut rng));
        assert_eq!(genome.next_node_key(), 10);
        assert_eq!(Genome::empty(3).next_node_key(), 0);
    }

    #[test]
    fn test_distance() {
        let config = NeatConfig::default();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let genome = Genome::new_initial(1, &config, &mut rng);
        assert_eq!(genome.distance(&genome, &config), 0.0);
        assert_eq!(Genome::empty(2).distance(&Genome::empty(3), &config), 0.0);

        let mut shifted = genome.clone();
        if let Some(conn) = shifted.connections.get_mut(&(-1, 0)) {
            conn.weight += 2.4;
        }
        let expected = 2.4 * config.compatibility_weight_coefficient / 12.0;
        assert!((genome.distance(&shifted, &config) - expected).abs() < 1e-9);

        // Every gene of one side is disjoint from an empty genome
        let d = genome.distance(&Genome::empty(2), &config);
        assert!((d - 2.0 * config.compatibility_disjoint_coefficient).abs() < 1e-9);
        assert_eq!(d, Genome::empty(2).distance(&genome, &config));
    }
}
