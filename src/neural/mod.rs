//! NEAT genomes and the controller networks built from them.
//!
//! Implements NEAT-style networks with:
//! - Node and connection genes keyed by node id
//! - Feed-forward evaluation over the layers that reach the outputs
//! - Parameter and structural mutations (add node, add connection)
//! - Crossover between genomes

mod activation;
mod crossover;
mod genome;
mod mutations;
mod network;

pub use activation::{Activation, Aggregation};
pub use crossover::CrossoverStrategy;
pub use genome::{
    input_keys, output_keys, ConnectionGene, ConnectionKey, Genome, GenomeId, NodeGene, NodeKey,
};
pub use network::{creates_cycle, feed_forward_layers, required_for_output, FeedForwardNetwork, NodeEval};
