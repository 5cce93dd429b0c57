//! # DINONEAT
//!
//! Side-scrolling obstacle course where a population of reflex agents,
//! each driven by a NEAT-style network, learns to jump and crouch.
//!
//! ## Features
//!
//! - **Deterministic**: every generation's world is seeded from the run seed
//! - **Evolvable**: NEAT-style topology and weight mutations with speciation
//! - **Configurable**: YAML configuration files
//! - **Resumable**: binary checkpoints plus per-generation JSON records
//! - **Headless**: rendering goes through a [`render::Canvas`] you provide
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dinoneat::{Config, SaveStore, Trainer};
//!
//! let config = Config::default();
//! let store = SaveStore::fresh(&config.persistence).unwrap();
//! let mut trainer = Trainer::new(config, store, 42);
//!
//! let summary = trainer.run(10, None).unwrap();
//! if let Some((generation, id, fitness)) = summary.best {
//!     println!("Best: genome {} of generation {} ({:.1})", id, generation, fitness);
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use dinoneat::Config;
//!
//! let mut config = Config::default();
//! config.neat.population_size = 100;
//! config.fitness.death_tax = 50.0;
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Replaying a saved genome
//!
//! ```rust,no_run
//! use dinoneat::generation::replay_genome;
//! use dinoneat::persistence::load_all_time_best;
//! use dinoneat::Config;
//!
//! let config = Config::default();
//! let (_, record) = load_all_time_best(&config.persistence.save_dir).unwrap();
//! let outcome = replay_genome(&record.to_genome(), &config, &config.neat, None, 7).unwrap();
//! println!("Survived {} ticks", outcome.ticks);
//! ```

pub mod agent;
pub mod checkpoint;
pub mod config;
pub mod evolution;
pub mod generation;
pub mod geometry;
pub mod neural;
pub mod obstacle;
pub mod persistence;
pub mod render;
pub mod species;
pub mod stats;
pub mod trainer;
pub mod world;

// Re-export main types
pub use agent::{Agent, Controller, ControllerFactory};
pub use config::Config;
pub use generation::{GenerationRunner, StopSignal};
pub use persistence::SaveStore;
pub use trainer::Trainer;
pub use world::World;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
