//! Configuration system for DINONEAT training runs.
//!
//! Supports YAML configuration files with sensible defaults.

use crate::neural::{Activation, Aggregation};
use crate::obstacle::ObstacleKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub world: WorldConfig,
    pub agent: AgentConfig,
    pub obstacles: ObstacleConfig,
    pub fitness: FitnessConfig,
    pub neat: NeatConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// Playing field configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Width of the visible field; obstacles spawn at this x
    pub field_width: f32,
    /// Height of the visible field (rendering only)
    pub field_height: f32,
    /// Fixed lane x of every agent
    pub lane_x: f32,
    /// Top of a standing agent's hitbox when grounded
    pub ground_y: f32,
    /// Simulated frames per second; converts ticks to spawn-clock milliseconds
    pub fps: u32,
    /// Block on a real-time frame pacer between ticks
    pub frame_pacing: bool,
    /// Hard cap on ticks per generation (None = run until all agents are dead)
    pub max_ticks: Option<u64>,
}

/// Agent body and locomotion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub stand_width: f32,
    pub stand_height: f32,
    /// Hitbox height while crouching; the width stays the standing width
    pub crouch_height: f32,
    /// Initial upward velocity of a jump
    pub jump_impulse: f32,
    /// Velocity lost per airborne tick
    pub gravity: f32,
    /// Pixels moved per unit of velocity per tick
    pub jump_scale: f32,
    /// Ticks a crouch lasts before the agent stands up again
    pub crouch_frames: u32,
    /// Ticks of invulnerability after a hit
    pub grace_ticks: u32,
    /// Hit points at spawn; any collision outside the grace window zeroes them
    pub hit_points: u32,
}

/// Hitbox dimensions of one obstacle sprite variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitboxSize {
    pub width: f32,
    pub height: f32,
}

impl HitboxSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Fixed placement of one obstacle kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindSpec {
    /// Top of the hitbox
    pub y: f32,
    /// Sprite variants; one is picked uniformly per spawned obstacle
    pub variants: Vec<HitboxSize>,
}

/// Kind -> (y, hitbox) lookup table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindTable {
    pub ground_low: KindSpec,
    pub ground_high: KindSpec,
    pub flying_low: KindSpec,
    pub flying_high: KindSpec,
}

impl KindTable {
    pub fn get(&self, kind: ObstacleKind) -> &KindSpec {
        match kind {
            ObstacleKind::GroundLow => &self.ground_low,
            ObstacleKind::GroundHigh => &self.ground_high,
            ObstacleKind::FlyingLow => &self.flying_low,
            ObstacleKind::FlyingHigh => &self.flying_high,
        }
    }
}

/// Obstacle stream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleConfig {
    /// Minimum spawn-clock milliseconds between spawn events
    pub spawn_cooldown_ms: f64,
    /// Inclusive range of the random jitter added to the elapsed time
    pub jitter_ms: (i32, i32),
    /// Inclusive range of the per-check live obstacle bound
    pub live_cap: (usize, usize),
    /// Inclusive range of the ground cluster size
    pub cluster_size: (usize, usize),
    pub kinds: KindTable,
}

/// Fitness shaping and difficulty ramp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitnessConfig {
    /// Scroll speed at the start of every generation
    pub initial_speed: f32,
    /// Ticks between scroll speed increments
    pub speed_step_ticks: u64,
    /// Reward per survived tick
    pub survival_reward: f64,
    /// Extra reward per survived tick per unit of scroll speed
    pub speed_reward: f64,
    /// Deducted on every collision
    pub collision_penalty: f64,
    /// Deducted once when a dead agent is removed
    pub death_tax: f64,
}

/// NEAT genome and reproduction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeatConfig {
    pub population_size: usize,
    pub num_inputs: usize,
    pub num_outputs: usize,
    /// New weights are drawn uniformly from [-init_weight_range, init_weight_range]
    pub init_weight_range: f64,
    pub init_bias_range: f64,
    pub weight_limit: f64,
    pub bias_limit: f64,
    pub weight_mutate_rate: f64,
    pub weight_mutate_power: f64,
    pub weight_replace_rate: f64,
    pub bias_mutate_rate: f64,
    pub bias_mutate_power: f64,
    pub bias_replace_rate: f64,
    /// Response multipliers start at 1 and stay within 1 ± response_limit
    pub response_limit: f64,
    pub response_mutate_rate: f64,
    pub response_mutate_power: f64,
    /// Chance a response is reset to 1
    pub response_replace_rate: f64,
    pub conn_add_prob: f64,
    pub node_add_prob: f64,
    pub enabled_mutate_rate: f64,
    pub activation_default: Activation,
    pub activation_options: Vec<Activation>,
    pub activation_mutate_rate: f64,
    pub aggregation_default: Aggregation,
    /// Genomes closer than this share a species
    pub compatibility_threshold: f64,
    pub compatibility_disjoint_coefficient: f64,
    pub compatibility_weight_coefficient: f64,
    /// Generations without improvement before a species is removed
    pub max_stagnation: u32,
    /// Best species that are never removed for stagnation
    pub species_elitism: usize,
    /// Smallest offspring allotment of a surviving species
    pub min_species_size: usize,
    /// Genomes of each species carried over unchanged into the next generation
    pub elitism: usize,
    /// Fraction of the ranked population allowed to breed
    pub survival_threshold: f64,
    pub tournament_size: usize,
    /// Probability a child is produced by crossover instead of cloning
    pub crossover_rate: f64,
}

/// Output and retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Root of the per-generation genome records
    pub save_dir: PathBuf,
    /// Storage cap in bytes; exceeding it triggers the retention sweep
    pub max_bytes: u64,
    /// Usage target of the sweep, as a fraction of `max_bytes`
    pub retention_fraction: f64,
    /// Population checkpoint directory
    pub checkpoint_dir: PathBuf,
    /// Generations between population checkpoints (0 = never)
    pub checkpoint_interval: u32,
    /// Checkpoints kept on disk
    pub max_checkpoints: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Generations between stats summaries
    pub stats_interval: u32,
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            agent: AgentConfig::default(),
            obstacles: ObstacleConfig::default(),
            fitness: FitnessConfig::default(),
            neat: NeatConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            field_width: 1200.0,
            field_height: 900.0,
            lane_x: 80.0,
            ground_y: 310.0,
            fps: 30,
            frame_pacing: false,
            max_ticks: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            stand_width: 87.0,
            stand_height: 94.0,
            crouch_height: 60.0,
            jump_impulse: 8.5,
            gravity: 0.8,
            jump_scale: 4.0,
            crouch_frames: 10,
            grace_ticks: 30,
            hit_points: 1,
        }
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self {
            ground_low: KindSpec {
                y: 325.0,
                variants: vec![
                    HitboxSize::new(40.0, 71.0),
                    HitboxSize::new(68.0, 71.0),
                    HitboxSize::new(105.0, 71.0),
                ],
            },
            ground_high: KindSpec {
                y: 300.0,
                variants: vec![
                    HitboxSize::new(48.0, 95.0),
                    HitboxSize::new(99.0, 95.0),
                    HitboxSize::new(150.0, 95.0),
                ],
            },
            flying_low: KindSpec {
                y: 225.0,
                variants: vec![HitboxSize::new(97.0, 68.0)],
            },
            flying_high: KindSpec {
                y: 150.0,
                variants: vec![HitboxSize::new(97.0, 68.0)],
            },
        }
    }
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            spawn_cooldown_ms: 2000.0,
            jitter_ms: (-50, 500),
            live_cap: (1, 5),
            cluster_size: (1, 3),
            kinds: KindTable::default(),
        }
    }
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            initial_speed: 20.0,
            speed_step_ticks: 100,
            survival_reward: 0.2,
            speed_reward: 0.002,
            collision_penalty: 5.0,
            death_tax: 30.0,
        }
    }
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            num_inputs: 6,
            num_outputs: 2,
            init_weight_range: 1.0,
            init_bias_range: 1.0,
            weight_limit: 30.0,
            bias_limit: 30.0,
            weight_mutate_rate: 0.8,
            weight_mutate_power: 0.5,
            weight_replace_rate: 0.1,
            bias_mutate_rate: 0.7,
            bias_mutate_power: 0.5,
            bias_replace_rate: 0.1,
            response_limit: 30.0,
            response_mutate_rate: 0.0,
            response_mutate_power: 0.0,
            response_replace_rate: 0.0,
            conn_add_prob: 0.5,
            node_add_prob: 0.2,
            enabled_mutate_rate: 0.01,
            activation_default: Activation::Tanh,
            activation_options: vec![Activation::Tanh],
            activation_mutate_rate: 0.0,
            aggregation_default: Aggregation::Sum,
            compatibility_threshold: 3.0,
            compatibility_disjoint_coefficient: 1.0,
            compatibility_weight_coefficient: 0.5,
            max_stagnation: 20,
            species_elitism: 2,
            min_species_size: 2,
            elitism: 2,
            survival_threshold: 0.2,
            tournament_size: 3,
            crossover_rate: 0.75,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("dino_saves"),
            max_bytes: 100 * 1024 * 1024 * 1024,
            retention_fraction: 0.10,
            checkpoint_dir: PathBuf::from("checkpoints"),
            checkpoint_interval: 30,
            max_checkpoints: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stats_interval: 1,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.world.fps == 0 {
            return Err("fps must be > 0".to_string());
        }
        if self.world.field_width <= self.world.lane_x {
            return Err("field_width must lie right of lane_x".to_string());
        }
        if self.agent.stand_height <= 0.0 || self.agent.crouch_height <= 0.0 {
            return Err("agent heights must be > 0".to_string());
        }
        if self.agent.crouch_height > self.agent.stand_height {
            return Err("crouch_height cannot exceed stand_height".to_string());
        }
        if self.agent.jump_impulse <= 0.0 || self.agent.gravity <= 0.0 {
            return Err("jump_impulse and gravity must be > 0".to_string());
        }
        if self.agent.crouch_frames == 0 {
            return Err("crouch_frames must be > 0".to_string());
        }
        if self.agent.hit_points == 0 {
            return Err("hit_points must be > 0".to_string());
        }

        let obstacles = &self.obstacles;
        if obstacles.jitter_ms.0 > obstacles.jitter_ms.1 {
            return Err("jitter_ms range is empty".to_string());
        }
        if obstacles.live_cap.0 > obstacles.live_cap.1 {
            return Err("live_cap range is empty".to_string());
        }
        if obstacles.cluster_size.0 == 0 || obstacles.cluster_size.0 > obstacles.cluster_size.1 {
            return Err("cluster_size must be a non-empty range starting at 1 or more".to_string());
        }
        for kind in ObstacleKind::ALL {
            let spec = obstacles.kinds.get(kind);
            if spec.variants.is_empty() {
                return Err(format!("{:?} has no hitbox variants", kind));
            }
            if spec.variants.iter().any(|v| v.width <= 0.0 || v.height <= 0.0) {
                return Err(format!("{:?} has a degenerate hitbox", kind));
            }
        }

        if self.fitness.speed_step_ticks == 0 {
            return Err("speed_step_ticks must be > 0".to_string());
        }

        let neat = &self.neat;
        if neat.population_size == 0 {
            return Err("population_size must be > 0".to_string());
        }
        if neat.num_inputs != crate::agent::SENSE_INPUTS {
            return Err(format!(
                "num_inputs must be {} (one per sensed feature)",
                crate::agent::SENSE_INPUTS
            ));
        }
        if neat.num_outputs < 2 {
            return Err("num_outputs must be >= 2 (jump, crouch)".to_string());
        }
        if neat.elitism > neat.population_size {
            return Err("elitism cannot exceed population_size".to_string());
        }
        if !(0.0..=1.0).contains(&neat.survival_threshold) || neat.survival_threshold == 0.0 {
            return Err("survival_threshold must be in (0, 1]".to_string());
        }
        if neat.compatibility_threshold <= 0.0 {
            return Err("compatibility_threshold must be > 0".to_string());
        }
        if neat.max_stagnation == 0 {
            return Err("max_stagnation must be > 0".to_string());
        }
        if neat.tournament_size == 0 {
            return Err("tournament_size must be > 0".to_string());
        }
        if neat.activation_options.is_empty() {
            return Err("activation_options cannot be empty".to_string());
        }

        let persistence = &self.persistence;
        if !(0.0..1.0).contains(&persistence.retention_fraction) {
            return Err("retention_fraction must be in [0, 1)".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let loaded: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.world.field_width, loaded.world.field_width);
        assert_eq!(config.obstacles.kinds.ground_low.variants, loaded.obstacles.kinds.ground_low.variants);
        assert_eq!(config.neat.activation_default, loaded.neat.activation_default);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut config = Config::default();
        config.obstacles.cluster_size = (3, 1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.neat.num_inputs = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.obstacles.kinds.flying_high.variants.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_validates() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = Config::default();
        config.save(&path).unwrap();
        assert!(Config::from_file(&path).is_ok());

        config.world.fps = 0;
        config.save(&path).unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_spawning_can_be_disabled() {
        let mut config = Config::default();
        config.obstacles.live_cap = (0, 0);
        assert!(config.validate().is_ok());
    }
}
