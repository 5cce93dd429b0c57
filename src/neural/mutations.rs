//! Genome mutations (NEAT-style).

use super::genome::{random_symmetric, ConnectionGene, ConnectionKey, Genome, NodeGene, NodeKey};
use super::network::creates_cycle;
use crate::config::NeatConfig;
use rand::seq::SliceRandom;
use rand::Rng;

impl Genome {
    /// Apply all mutations according to config
    pub fn mutate(&mut self, config: &NeatConfig, rng: &mut impl Rng) {
        // Structural mutations
        if rng.gen::<f64>() < config.node_add_prob {
            self.mutate_add_node(config, rng);
        }

        if rng.gen::<f64>() < config.conn_add_prob {
            self.mutate_add_connection(config, rng);
        }

        // Parameter mutations
        for node in self.nodes.values_mut() {
            node.bias = mutate_value(
                node.bias,
                config.bias_mutate_rate,
                config.bias_mutate_power,
                config.bias_replace_rate,
                config.init_bias_range,
                config.bias_limit,
                rng,
            );

            if config.response_mutate_rate + config.response_replace_rate > 0.0 {
                node.response = 1.0
                    + mutate_value(
                        node.response - 1.0,
                        config.response_mutate_rate,
                        config.response_mutate_power,
                        config.response_replace_rate,
                        0.0,
                        config.response_limit,
                        rng,
                    );
            }

            if rng.gen::<f64>() < config.activation_mutate_rate {
                if let Some(&activation) = config.activation_options.choose(rng) {
                    node.activation = activation;
                }
            }
        }

        for conn in self.connections.values_mut() {
            conn.weight = mutate_value(
                conn.weight,
                config.weight_mutate_rate,
                config.weight_mutate_power,
                config.weight_replace_rate,
                config.init_weight_range,
                config.weight_limit,
                rng,
            );

            if rng.gen::<f64>() < config.enabled_mutate_rate {
                conn.enabled = !conn.enabled;
            }
        }
    }

    /// Split a random enabled connection with a new hidden node.
    ///
    /// The old link is disabled; the incoming half gets weight 1 and the
    /// outgoing half inherits the old weight, so behavior barely changes.
    pub fn mutate_add_node(&mut self, config: &NeatConfig, rng: &mut impl Rng) -> Option<NodeKey> {
        let enabled: Vec<ConnectionKey> = self
            .connections
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.key)
            .collect();
        let &(input, output) = enabled.choose(rng)?;

        let conn = self.connections.get_mut(&(input, output))?;
        conn.enabled = false;
        let old_weight = conn.weight;

        let new_key = self.next_node_key();
        let mut node = NodeGene::new(new_key, config, rng);
        node.bias = 0.0;
        self.nodes.insert(new_key, node);

        self.connections
            .insert((input, new_key), ConnectionGene::new((input, new_key), 1.0));
        self.connections
            .insert((new_key, output), ConnectionGene::new((new_key, output), old_weight));

        Some(new_key)
    }

    /// Add a random feed-forward connection between two unconnected nodes.
    ///
    /// An existing but disabled connection is re-enabled instead.
    pub fn mutate_add_connection(
        &mut self,
        config: &NeatConfig,
        rng: &mut impl Rng,
    ) -> Option<ConnectionKey> {
        let outputs: Vec<NodeKey> = self.nodes.keys().copied().collect();
        let mut sources: Vec<NodeKey> = super::genome::input_keys(config);
        sources.extend(outputs.iter().copied());

        let &out_node = outputs.choose(rng)?;
        let &in_node = sources.choose(rng)?;
        let key = (in_node, out_node);

        if let Some(existing) = self.connections.get_mut(&key) {
            existing.enabled = true;
            return None;
        }

        // Output nodes never feed other outputs
        let num_outputs = config.num_outputs as NodeKey;
        if (0..num_outputs).contains(&in_node) && (0..num_outputs).contains(&out_node) {
            return None;
        }

        let existing: Vec<ConnectionKey> = self.connections.keys().copied().collect();
        if creates_cycle(&existing, key) {
            return None;
        }

        let weight = random_symmetric(rng, config.init_weight_range);
        self.connections.insert(key, ConnectionGene::new(key, weight));
        Some(key)
    }
}

/// Perturb or replace a single parameter, then clamp it to `limit`
fn mutate_value(
    value: f64,
    mutate_rate: f64,
    power: f64,
    replace_rate: f64,
    init_range: f64,
    limit: f64,
    rng: &mut impl Rng,
) -> f64 {
    let r = rng.gen::<f64>();
    let next = if r < mutate_rate {
        value + random_symmetric(rng, power)
    } else if r < mutate_rate + replace_rate {
        random_symmetric(rng, init_range)
    } else {
        value
    };
    next.clamp(-limit, limit)
}
