//! Checkpoint system for saving and resuming a training run.
//!
//! A checkpoint holds the population about to be evaluated, the run seed and
//! the running best-of-generation summary, so a resumed run replays exactly
//! the generations the original would have.

use crate::config::Config;
use crate::evolution::Population;
use crate::persistence::GenomeRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"DINO";

/// Complete training state for checkpointing
#[derive(Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Version for compatibility checking
    pub version: u32,
    /// Configuration
    pub config: Config,
    /// Genomes of the next generation to evaluate
    pub population: Population,
    /// Best record of every finished generation
    pub summary: BTreeMap<u32, GenomeRecord>,
    /// Run seed (for reproducibility)
    pub random_seed: u64,
}

impl Checkpoint {
    /// Current checkpoint version
    pub const VERSION: u32 = 1;

    /// Create a new checkpoint
    pub fn new(
        config: Config,
        population: Population,
        summary: BTreeMap<u32, GenomeRecord>,
        random_seed: u64,
    ) -> Self {
        Self {
            version: Self::VERSION,
            config,
            population,
            summary,
            random_seed,
        }
    }

    /// Generation the checkpointed population belongs to
    pub fn generation(&self) -> u32 {
        self.population.generation
    }

    /// Save checkpoint to binary file, replacing any existing one atomically
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir)?;

        {
            let mut writer = BufWriter::new(tmp.as_file());

            // Write magic bytes for identification
            writer.write_all(MAGIC)?;

            // Serialize and write
            bincode::serialize_into(&mut writer, self)?;
            writer.flush()?;
        }

        tmp.persist(path).map_err(|e| CheckpointError::Io(e.error))?;
        Ok(())
    }

    /// Load checkpoint from binary file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        // Check magic bytes
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CheckpointError::InvalidFormat("Invalid magic bytes".to_string()));
        }

        // Read and deserialize
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer)?;
        let checkpoint: Checkpoint = bincode::deserialize(&buffer)?;

        // Version check
        if checkpoint.version != Self::VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: Self::VERSION,
                found: checkpoint.version,
            });
        }

        Ok(checkpoint)
    }

    /// Get approximate size in bytes
    pub fn size_bytes(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }
}

/// Errors that can occur during checkpoint operations
#[derive(Debug)]
pub enum CheckpointError {
    Io(std::io::Error),
    Serialization(bincode::Error),
    InvalidFormat(String),
    VersionMismatch { expected: u32, found: u32 },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),
            Self::VersionMismatch { expected, found } => {
                write!(f, "Version mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<std::io::Error> for CheckpointError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<bincode::Error> for CheckpointError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e)
    }
}

/// Checkpoint manager for automatic saving
pub struct CheckpointManager {
    /// Base directory for checkpoints
    pub base_dir: PathBuf,
    /// Generations between checkpoints (0 disables)
    pub interval: u32,
    /// Maximum checkpoints to keep
    pub max_checkpoints: usize,
    /// Generation of the last checkpoint written
    last_checkpoint: Option<u32>,
}

impl CheckpointManager {
    /// Create a new checkpoint manager
    pub fn new(base_dir: impl Into<PathBuf>, interval: u32, max_checkpoints: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            interval,
            max_checkpoints,
            last_checkpoint: None,
        }
    }

    /// Check if a checkpoint should be saved before evaluating `generation`
    pub fn should_save(&self, generation: u32) -> bool {
        self.interval > 0
            && generation > 1
            && (generation - 1) % self.interval == 0
            && self.last_checkpoint != Some(generation)
    }

    /// Generate checkpoint filename
    pub fn checkpoint_path(&self, generation: u32) -> PathBuf {
        self.base_dir.join(format!("checkpoint_{:08}.bin", generation))
    }

    /// Save checkpoint and update state
    pub fn save(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError> {
        std::fs::create_dir_all(&self.base_dir)?;
        let path = self.checkpoint_path(checkpoint.generation());
        checkpoint.save(&path)?;
        self.last_checkpoint = Some(checkpoint.generation());

        // Cleanup old checkpoints
        self.cleanup()?;

        Ok(path)
    }

    fn checkpoint_files(&self) -> Vec<std::fs::DirEntry> {
        match std::fs::read_dir(&self.base_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    name.starts_with("checkpoint_") && name.ends_with(".bin")
                })
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Remove old checkpoints beyond max limit
    fn cleanup(&self) -> Result<(), CheckpointError> {
        let mut checkpoints = self.checkpoint_files();

        if checkpoints.len() > self.max_checkpoints {
            // Sort by name (which includes the generation)
            checkpoints.sort_by_key(|e| e.file_name());

            // Remove oldest
            let to_remove = checkpoints.len() - self.max_checkpoints;
            for entry in checkpoints.into_iter().take(to_remove) {
                std::fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }

    /// Find latest checkpoint in directory
    pub fn find_latest(&self) -> Option<PathBuf> {
        self.checkpoint_files()
            .into_iter()
            .max_by_key(|e| e.file_name())
            .map(|e| e.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use tempfile::TempDir;

    fn create_test_checkpoint(generation: u32) -> Checkpoint {
        let mut config = Config::default();
        config.neat.population_size = 5;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut population = Population::new(&config.neat, &mut rng);
        population.generation = generation;

        let mut summary = BTreeMap::new();
        let mut best = population.genomes[0].clone();
        best.fitness = Some(12.5);
        summary.insert(generation - 1, GenomeRecord::from_genome(&best));

        Checkpoint::new(config, population, summary, 12345)
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let dir = TempDir::new().unwrap();
        let checkpoint = create_test_checkpoint(4);
        let path = dir.path().join("test_checkpoint.bin");

        checkpoint.save(&path).unwrap();
        let loaded = Checkpoint::load(&path).unwrap();

        assert_eq!(loaded.generation(), 4);
        assert_eq!(loaded.population.genomes, checkpoint.population.genomes);
        assert_eq!(loaded.population.next_genome_id, checkpoint.population.next_genome_id);
        assert_eq!(loaded.summary, checkpoint.summary);
        assert_eq!(loaded.random_seed, checkpoint.random_seed);
        assert_eq!(loaded.config.neat.population_size, 5);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.bin");
        std::fs::write(&path, b"PRMD0000").unwrap();

        assert!(matches!(
            Checkpoint::load(&path),
            Err(CheckpointError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_checkpoint_size() {
        let checkpoint = create_test_checkpoint(2);
        let size = checkpoint.size_bytes();

        assert!(size > 0);
        assert!(size < 1_000_000);
    }

    #[test]
    fn test_manager_schedule_and_rotation() {
        let dir = TempDir::new().unwrap();
        let mut manager = CheckpointManager::new(dir.path().join("ckpt"), 3, 2);

        assert!(!manager.should_save(1));
        assert!(manager.should_save(4));
        assert!(!manager.should_save(5));

        for generation in [4, 7, 10] {
            manager.save(&create_test_checkpoint(generation)).unwrap();
        }
        assert!(!manager.should_save(10));

        let latest = manager.find_latest().unwrap();
        assert!(latest.ends_with("checkpoint_00000010.bin"));
        assert!(!manager.checkpoint_path(4).exists());
        assert!(manager.checkpoint_path(7).exists());
    }
}
