//! Per-generation genome records on disk.
//!
//! Layout under the save root:
//!
//! ```text
//! gen_<N>/dino_<genome_id>.json   one record per genome
//! gen_<N>/best_dino.json          copy of the generation's best record
//! generations_summary.json        generation -> best record, whole run
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader never sees a half-written record.

use crate::config::PersistenceConfig;
use crate::neural::{Activation, Aggregation, ConnectionGene, Genome, GenomeId, NodeGene, NodeKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const SUMMARY_FILE: &str = "generations_summary.json";
pub const BEST_FILE: &str = "best_dino.json";

/// One connection of a persisted genome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    #[serde(rename = "in")]
    pub input: NodeKey,
    #[serde(rename = "out")]
    pub output: NodeKey,
    pub weight: f64,
    pub enabled: bool,
}

/// One node of a persisted genome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeKey,
    pub bias: f64,
    pub activation: Activation,
    pub aggregation: Aggregation,
    pub response: f64,
}

/// Everything needed to rebuild a genome's controller exactly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeRecord {
    pub genome_id: GenomeId,
    pub fitness: f64,
    pub connections: Vec<ConnectionRecord>,
    pub nodes: Vec<NodeRecord>,
}

impl GenomeRecord {
    pub fn from_genome(genome: &Genome) -> Self {
        Self {
            genome_id: genome.key,
            fitness: genome.fitness.unwrap_or(0.0),
            connections: genome
                .connections
                .values()
                .map(|c| ConnectionRecord {
                    input: c.key.0,
                    output: c.key.1,
                    weight: c.weight,
                    enabled: c.enabled,
                })
                .collect(),
            nodes: genome
                .nodes
                .values()
                .map(|n| NodeRecord {
                    id: n.key,
                    bias: n.bias,
                    activation: n.activation,
                    aggregation: n.aggregation,
                    response: n.response,
                })
                .collect(),
        }
    }

    /// Rebuild the genome, keyed exactly as persisted
    pub fn to_genome(&self) -> Genome {
        let mut genome = Genome::empty(self.genome_id);
        genome.fitness = Some(self.fitness);

        for n in &self.nodes {
            genome.nodes.insert(
                n.id,
                NodeGene {
                    key: n.id,
                    bias: n.bias,
                    response: n.response,
                    activation: n.activation,
                    aggregation: n.aggregation,
                },
            );
        }
        for c in &self.connections {
            let key = (c.input, c.output);
            genome.connections.insert(
                key,
                ConnectionGene {
                    key,
                    weight: c.weight,
                    enabled: c.enabled,
                },
            );
        }

        genome
    }
}

/// Errors that can occur while persisting records
#[derive(Debug)]
pub enum PersistenceError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Missing(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
            Self::Missing(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<tempfile::PersistError> for PersistenceError {
    fn from(e: tempfile::PersistError) -> Self {
        Self::Io(e.error)
    }
}

/// Outcome of a retention sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionReport {
    pub deleted: usize,
    pub freed_bytes: u64,
    pub usage_after: u64,
}

/// Outcome of saving one generation
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    pub written: usize,
    pub skipped: usize,
    pub best: Option<(GenomeId, f64)>,
    pub retention: Option<RetentionReport>,
}

/// Generation records plus the running summary
pub struct SaveStore {
    root: PathBuf,
    max_bytes: u64,
    retention_fraction: f64,
    summary: BTreeMap<u32, GenomeRecord>,
}

impl SaveStore {
    /// Open (or create) a save directory, loading any existing summary
    pub fn open(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        fs::create_dir_all(&config.save_dir)?;
        let summary_path = config.save_dir.join(SUMMARY_FILE);
        let summary = if summary_path.exists() {
            read_json(&summary_path)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            root: config.save_dir.clone(),
            max_bytes: config.max_bytes,
            retention_fraction: config.retention_fraction,
            summary,
        })
    }

    /// Start an empty save directory, removing previous contents
    pub fn fresh(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        if config.save_dir.exists() {
            log::info!("Clearing previous saves in {}", config.save_dir.display());
            fs::remove_dir_all(&config.save_dir)?;
        }
        Self::open(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_dir(&self, generation: u32) -> PathBuf {
        self.root.join(format!("gen_{}", generation))
    }

    pub fn summary(&self) -> &BTreeMap<u32, GenomeRecord> {
        &self.summary
    }

    /// Replace the in-memory summary (used when resuming from a checkpoint)
    pub fn set_summary(&mut self, summary: BTreeMap<u32, GenomeRecord>) {
        self.summary = summary;
    }

    /// Generation and record with the highest fitness across the run
    pub fn all_time_best(&self) -> Option<(u32, &GenomeRecord)> {
        best_in_summary(&self.summary)
    }

    /// Persist every genome of a generation, its best record and the summary.
    ///
    /// A record that fails to write is logged and skipped. Retention runs
    /// first when the directory is over its cap.
    pub fn save_generation(
        &mut self,
        generation: u32,
        genomes: &[Genome],
    ) -> Result<SaveReport, PersistenceError> {
        let mut report = SaveReport::default();

        let usage = disk_usage(&self.root);
        if usage > self.max_bytes {
            let target = (self.max_bytes as f64 * self.retention_fraction) as u64;
            log::warn!(
                "Save directory uses {} bytes (cap {}), sweeping down to {}",
                usage,
                self.max_bytes,
                target
            );
            report.retention = Some(retention_sweep(&self.root, target));
        }

        let dir = self.generation_dir(generation);
        fs::create_dir_all(&dir)?;

        for genome in genomes {
            let path = dir.join(format!("dino_{}.json", genome.key));
            match write_json_atomic(&path, &GenomeRecord::from_genome(genome)) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    log::warn!("Skipping record for genome {}: {}", genome.key, e);
                    report.skipped += 1;
                }
            }
        }

        let best = genomes
            .iter()
            .max_by(|a, b| a.fitness_or_min().total_cmp(&b.fitness_or_min()));
        if let Some(best) = best {
            let record = GenomeRecord::from_genome(best);
            report.best = Some((record.genome_id, record.fitness));

            if let Err(e) = write_json_atomic(&dir.join(BEST_FILE), &record) {
                log::warn!("Could not write best record for generation {}: {}", generation, e);
            }
            self.summary.insert(generation, record);
            write_json_atomic(&self.root.join(SUMMARY_FILE), &self.summary)?;
        }

        log::info!(
            "Saved generation {}: {} records ({} skipped) to {}",
            generation,
            report.written,
            report.skipped,
            dir.display()
        );

        Ok(report)
    }
}

/// Best entry of a summary map; ties go to the earliest generation
pub fn best_in_summary(summary: &BTreeMap<u32, GenomeRecord>) -> Option<(u32, &GenomeRecord)> {
    summary
        .iter()
        .fold(None, |best: Option<(u32, &GenomeRecord)>, (&gen, record)| match best {
            Some((_, b)) if b.fitness >= record.fitness => best,
            _ => Some((gen, record)),
        })
}

/// Read a summary file
pub fn load_summary<P: AsRef<Path>>(path: P) -> Result<BTreeMap<u32, GenomeRecord>, PersistenceError> {
    read_json(path.as_ref())
}

/// Read one genome record
pub fn load_record<P: AsRef<Path>>(path: P) -> Result<GenomeRecord, PersistenceError> {
    read_json(path.as_ref())
}

/// Read a genome record and rebuild the genome
pub fn load_genome<P: AsRef<Path>>(path: P) -> Result<Genome, PersistenceError> {
    Ok(load_record(path)?.to_genome())
}

/// Locate the all-time best record of a save directory.
///
/// Prefers the generation's `best_dino.json`; falls back to the copy kept in
/// the summary when that file has been swept away.
pub fn load_all_time_best<P: AsRef<Path>>(root: P) -> Result<(u32, GenomeRecord), PersistenceError> {
    let root = root.as_ref();
    let summary = load_summary(root.join(SUMMARY_FILE))?;
    let (generation, record) = best_in_summary(&summary)
        .ok_or_else(|| PersistenceError::Missing(format!("no generations in {}", root.display())))?;

    let best_path = root.join(format!("gen_{}", generation)).join(BEST_FILE);
    match load_record(&best_path) {
        Ok(from_file) => Ok((generation, from_file)),
        Err(e) => {
            log::warn!("{}: {}; using summary copy", best_path.display(), e);
            Ok((generation, record.clone()))
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write JSON to `path` through a temporary file in the same directory
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.flush()?;
    tmp.persist(path)?;
    Ok(())
}

/// Total size of all files under `root`
pub fn disk_usage(root: &Path) -> u64 {
    collect_files(root).iter().map(|f| f.size).sum()
}

struct FileEntry {
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

fn collect_files(root: &Path) -> Vec<FileEntry> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if meta.is_dir() {
                stack.push(entry.path());
            } else {
                files.push(FileEntry {
                    path: entry.path(),
                    size: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                });
            }
        }
    }

    files
}

/// Delete the oldest files under `root` until usage is at most `target`
/// bytes. The run summary is never deleted. Files that cannot be removed are
/// logged and skipped.
pub fn retention_sweep(root: &Path, target: u64) -> RetentionReport {
    sweep_with(root, target, |path| fs::remove_file(path))
}

fn sweep_with<F>(root: &Path, target: u64, mut remove: F) -> RetentionReport
where
    F: FnMut(&Path) -> std::io::Result<()>,
{
    let summary = root.join(SUMMARY_FILE);
    let mut files = collect_files(root);
    let mut usage: u64 = files.iter().map(|f| f.size).sum();

    // Records are written once, so mtime is their creation time
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

    let mut report = RetentionReport::default();
    for file in files.iter().filter(|f| f.path != summary) {
        if usage <= target {
            break;
        }
        match remove(&file.path) {
            Ok(()) => {
                usage -= file.size;
                report.deleted += 1;
                report.freed_bytes += file.size;
            }
            Err(e) => log::warn!("Retention: could not delete {}: {}", file.path.display(), e),
        }
    }

    // Drop generation directories that are now empty
    if let Ok(entries) = fs::read_dir(root) {
        for entry in entries.filter_map(|e| e.ok()) {
            if entry.path().is_dir() {
                let _ = fs::remove_dir(entry.path());
            }
        }
    }

    report.usage_after = usage;
    log::info!(
        "Retention: deleted {} files ({} bytes), usage now {} bytes",
        report.deleted,
        report.freed_bytes,
        usage
    );
    report
}
