//! Feed-forward evaluation of a NEAT genome.

use super::activation::{Activation, Aggregation};
use super::genome::{input_keys, output_keys, ConnectionKey, Genome, NodeKey};
use crate::agent::Controller;
use crate::config::NeatConfig;
use std::collections::{BTreeSet, HashMap};

/// One node's compiled evaluation step
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEval {
    pub node: NodeKey,
    pub activation: Activation,
    pub aggregation: Aggregation,
    pub bias: f64,
    pub response: f64,
    /// (source node, weight) for every enabled incoming connection
    pub links: Vec<(NodeKey, f64)>,
}

/// Phenotype of a genome, evaluated layer by layer
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    pub input_nodes: Vec<NodeKey>,
    pub output_nodes: Vec<NodeKey>,
    pub node_evals: Vec<NodeEval>,
    values: HashMap<NodeKey, f64>,
}

impl FeedForwardNetwork {
    /// Compile a genome. Disabled connections and nodes that cannot reach an
    /// output are dropped.
    pub fn create(genome: &Genome, config: &NeatConfig) -> Self {
        let input_nodes = input_keys(config);
        let output_nodes = output_keys(config);

        let connections: Vec<ConnectionKey> = genome
            .connections
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.key)
            .collect();

        let layers = feed_forward_layers(&input_nodes, &output_nodes, &connections);

        let mut node_evals = Vec::new();
        for layer in layers {
            for node in layer {
                let links: Vec<(NodeKey, f64)> = genome
                    .connections
                    .values()
                    .filter(|c| c.enabled && c.key.1 == node)
                    .map(|c| (c.key.0, c.weight))
                    .collect();

                let Some(gene) = genome.nodes.get(&node) else {
                    log::warn!(
                        "genome {} has a connection into missing node {}; skipping it",
                        genome.key,
                        node
                    );
                    continue;
                };

                node_evals.push(NodeEval {
                    node,
                    activation: gene.activation,
                    aggregation: gene.aggregation,
                    bias: gene.bias,
                    response: gene.response,
                    links,
                });
            }
        }

        let values = input_nodes
            .iter()
            .chain(output_nodes.iter())
            .map(|&k| (k, 0.0))
            .collect();

        Self {
            input_nodes,
            output_nodes,
            node_evals,
            values,
        }
    }

    /// Run one forward pass
    pub fn activate(&mut self, inputs: &[f64]) -> Vec<f64> {
        assert_eq!(
            inputs.len(),
            self.input_nodes.len(),
            "expected {} inputs, got {}",
            self.input_nodes.len(),
            inputs.len()
        );

        for (&key, &value) in self.input_nodes.iter().zip(inputs) {
            self.values.insert(key, value);
        }

        let mut weighted = Vec::new();
        for eval in &self.node_evals {
            weighted.clear();
            weighted.extend(
                eval.links
                    .iter()
                    .map(|(src, w)| self.values.get(src).copied().unwrap_or(0.0) * w),
            );
            let s = eval.aggregation.apply(&weighted);
            let value = eval.activation.apply(eval.bias + eval.response * s);
            self.values.insert(eval.node, value);
        }

        self.output_nodes
            .iter()
            .map(|k| self.values.get(k).copied().unwrap_or(0.0))
            .collect()
    }

    /// Number of evaluated (non-input) nodes
    pub fn complexity(&self) -> usize {
        self.node_evals.len()
    }
}

impl Controller for FeedForwardNetwork {
    fn decide(&mut self, senses: &[f64]) -> Vec<f64> {
        self.activate(senses)
    }
}

/// Nodes whose values are needed to compute the outputs
pub fn required_for_output(
    inputs: &[NodeKey],
    outputs: &[NodeKey],
    connections: &[ConnectionKey],
) -> BTreeSet<NodeKey> {
    let inputs: BTreeSet<NodeKey> = inputs.iter().copied().collect();
    let mut required: BTreeSet<NodeKey> = outputs.iter().copied().collect();
    let mut seen = required.clone();

    loop {
        let frontier: BTreeSet<NodeKey> = connections
            .iter()
            .filter(|(a, b)| seen.contains(b) && !seen.contains(a))
            .map(|&(a, _)| a)
            .collect();
        if frontier.is_empty() {
            break;
        }

        let layer_nodes: BTreeSet<NodeKey> = frontier
            .iter()
            .copied()
            .filter(|n| !inputs.contains(n))
            .collect();
        if layer_nodes.is_empty() {
            break;
        }

        required.extend(layer_nodes);
        seen.extend(frontier);
    }

    required
}

/// Group required nodes into layers that can be evaluated in sequence
pub fn feed_forward_layers(
    inputs: &[NodeKey],
    outputs: &[NodeKey],
    connections: &[ConnectionKey],
) -> Vec<BTreeSet<NodeKey>> {
    let required = required_for_output(inputs, outputs, connections);

    let mut layers = Vec::new();
    let mut evaluated: BTreeSet<NodeKey> = inputs.iter().copied().collect();

    loop {
        let candidates: BTreeSet<NodeKey> = connections
            .iter()
            .filter(|(a, b)| evaluated.contains(a) && !evaluated.contains(b))
            .map(|&(_, b)| b)
            .collect();

        let layer: BTreeSet<NodeKey> = candidates
            .into_iter()
            .filter(|n| {
                required.contains(n)
                    && connections
                        .iter()
                        .filter(|(_, b)| b == n)
                        .all(|(a, _)| evaluated.contains(a))
            })
            .collect();

        if layer.is_empty() {
            break;
        }

        evaluated.extend(layer.iter().copied());
        layers.push(layer);
    }

    layers
}

/// Would adding `test` to a feed-forward graph introduce a cycle?
pub fn creates_cycle(connections: &[ConnectionKey], test: ConnectionKey) -> bool {
    let (input, output) = test;
    if input == output {
        return true;
    }

    let mut visited = BTreeSet::from([output]);
    loop {
        let mut added = 0;
        for &(a, b) in connections {
            if visited.contains(&a) && !visited.contains(&b) {
                if b == input {
                    return true;
                }
                visited.insert(b);
                added += 1;
            }
        }
        if added == 0 {
            return false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::genome::{ConnectionGene, NodeGene};

    fn identity_node(key: NodeKey, bias: f64) -> NodeGene {
        NodeGene {
            key,
            bias,
            response: 1.0,
            activation: Activation::Identity,
            aggregation: Aggregation::Sum,
        }
    }

    fn small_config() -> NeatConfig {
        NeatConfig {
            num_inputs: 2,
            num_outputs: 1,
            ..NeatConfig::default()
        }
    }

    #[test]
    fn test_single_link() {
        let config = small_config();
        let mut genome = Genome::empty(1);
        genome.nodes.insert(0, identity_node(0, 0.5));
        genome.connections.insert((-1, 0), ConnectionGene::new((-1, 0), 2.0));

        let mut net = FeedForwardNetwork::create(&genome, &config);
        assert_eq!(net.activate(&[1.0, 100.0]), vec![2.5]);
        assert_eq!(net.activate(&[-1.0, 0.0]), vec![-1.5]);
    }

    #[test]
    fn test_hidden_layer_and_disabled_links() {
        let config = small_config();
        let mut genome = Genome::empty(1);
        genome.nodes.insert(0, identity_node(0, 0.0));
        genome.nodes.insert(1, identity_node(1, 1.0));
        genome.connections.insert((-1, 1), ConnectionGene::new((-1, 1), 3.0));
        genome.connections.insert((1, 0), ConnectionGene::new((1, 0), 2.0));
        let mut disabled = ConnectionGene::new((-2, 0), 10.0);
        disabled.enabled = false;
        genome.connections.insert((-2, 0), disabled);

        let mut net = FeedForwardNetwork::create(&genome, &config);
        // hidden = 1 + 3*x ; out = 2*hidden
        assert_eq!(net.activate(&[2.0, 5.0]), vec![14.0]);
        assert_eq!(net.complexity(), 2);
    }

    #[test]
    fn test_dangling_hidden_node_is_pruned() {
        let config = small_config();
        let mut genome = Genome::empty(1);
        genome.nodes.insert(0, identity_node(0, 0.0));
        genome.nodes.insert(5, identity_node(5, 0.0));
        genome.connections.insert((-1, 0), ConnectionGene::new((-1, 0), 1.0));
        genome.connections.insert((-2, 5), ConnectionGene::new((-2, 5), 1.0));

        let net = FeedForwardNetwork::create(&genome, &config);
        assert!(net.node_evals.iter().all(|e| e.node != 5));
    }

    #[test]
    fn test_unconnected_output_reads_zero() {
        let config = NeatConfig {
            num_inputs: 1,
            num_outputs: 2,
            ..NeatConfig::default()
        };
        let mut genome = Genome::empty(1);
        genome.nodes.insert(0, identity_node(0, 0.0));
        genome.nodes.insert(1, identity_node(1, 0.0));
        genome.connections.insert((-1, 0), ConnectionGene::new((-1, 0), 1.0));

        let mut net = FeedForwardNetwork::create(&genome, &config);
        assert_eq!(net.activate(&[0.75]), vec![0.75, 0.0]);
    }

    #[test]
    fn test_creates_cycle() {
        let connections = vec![(-1, 2), (2, 3), (3, 0)];
        assert!(creates_cycle(&connections, (3, 2)));
        assert!(creates_cycle(&connections, (0, 2)));
        assert!(creates_cycle(&connections, (2, 2)));
        assert!(!creates_cycle(&connections, (-1, 3)));
        assert!(!creates_cycle(&connections, (2, 0)));
    }

    #[test]
    fn test_layers_respect_dependencies() {
        let connections = vec![(-1, 2), (2, 3), (3, 0), (-2, 0), (2, 0)];
        let layers = feed_forward_layers(&[-1, -2], &[0], &connections);
        assert_eq!(layers.len(), 3);
        assert!(layers[0].contains(&2));
        assert!(layers[1].contains(&3));
        assert!(layers[2].contains(&0));
    }
}
