use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::classfile::{ClassFileError, decode, encode};
use crate::config::RunConfig;
use crate::scan::{ClassEntry, scan_classes, scan_roots};
use crate::tokens::TokenMap;
use crate::visit::{VisitSummary, replace_tokens};

/// Result of running one class through decode, visit and encode.
#[derive(Debug)]
pub struct Processed {
    pub summary: VisitSummary,
    /// New bytes, present only when a site changed.
    pub output: Option<Vec<u8>>,
}

pub fn process_class(bytes: &[u8], tokens: &TokenMap) -> Result<Processed, ClassFileError> {
    let mut tree = decode(bytes)?;
    let summary = replace_tokens(&mut tree, tokens);
    let output = if summary.changed() {
        Some(encode(&tree)?)
    } else {
        None
    };
    Ok(Processed { summary, output })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Rewritten,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub sites: usize,
    pub rewritten_sites: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub roots: Vec<String>,
    pub mode: &'static str,
    pub output_root: Option<String>,
    pub dry_run: bool,
    pub scanned: usize,
    pub rewritten: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub cleaned: usize,
    pub duration_ms: u64,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn skipped_files(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| f.status == FileStatus::Skipped)
    }
}

struct PendingWrite {
    source: PathBuf,
    destination: PathBuf,
    bytes: Vec<u8>,
}

/// Runs token replacement over every class below the configured roots.
///
/// All classes are processed in memory before anything is written, so a
/// strict-mode failure or a shadow destination collision leaves the file
/// system untouched. Each write replaces its destination atomically.
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let start = Instant::now();
    let entries = scan_roots(&config.roots)?;

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = config.jobs {
        builder = builder.num_threads(jobs.max(1));
    }
    let pool = builder.build().context("Failed to build worker pool")?;

    let results: Vec<Result<Result<Processed, ClassFileError>>> = pool.install(|| {
        entries
            .par_iter()
            .map(|entry| -> Result<Result<Processed, ClassFileError>> {
                let path = entry.path();
                let bytes = std::fs::read(&path)
                    .with_context(|| format!("Failed to read class file: {}", path.display()))?;
                Ok(process_class(&bytes, &config.tokens))
            })
            .collect()
    });

    let mut files = Vec::new();
    let mut pending = Vec::new();
    let mut unchanged = 0usize;
    let mut destinations: HashMap<PathBuf, PathBuf> = HashMap::new();

    for (entry, result) in entries.iter().zip(results) {
        let source = entry.path();
        match result? {
            Ok(Processed {
                summary,
                output: Some(bytes),
            }) => {
                let destination = config.output.destination(entry);
                if let Some(previous) = destinations.insert(destination.clone(), source.clone()) {
                    anyhow::bail!(
                        "{} and {} both map to {}",
                        previous.display(),
                        source.display(),
                        destination.display()
                    );
                }
                files.push(FileReport {
                    source: source.to_string_lossy().to_string(),
                    status: FileStatus::Rewritten,
                    destination: Some(destination.to_string_lossy().to_string()),
                    sites: summary.sites,
                    rewritten_sites: summary.rewritten,
                    sha256: Some(hash_bytes(&bytes)),
                    error_kind: None,
                    reason: None,
                });
                pending.push(PendingWrite {
                    source,
                    destination,
                    bytes,
                });
            }
            Ok(Processed { output: None, .. }) => unchanged += 1,
            Err(err) => {
                if config.strict {
                    return Err(anyhow::Error::new(err)
                        .context(format!("Failed to process {}", source.display())));
                }
                files.push(FileReport {
                    source: source.to_string_lossy().to_string(),
                    status: FileStatus::Skipped,
                    destination: None,
                    sites: 0,
                    rewritten_sites: 0,
                    sha256: None,
                    error_kind: Some(err.kind()),
                    reason: Some(err.to_string()),
                });
            }
        }
    }

    let mut cleaned = 0usize;
    if !config.dry_run {
        if config.clean
            && let Some(root) = config.output.root()
        {
            cleaned = clean_output(root)?;
        }

        pool.install(|| {
            pending.par_iter().try_for_each(|write| {
                write_atomically(&write.destination, &write.bytes).with_context(|| {
                    format!("Failed to write rewritten {}", write.source.display())
                })
            })
        })?;
    }

    let rewritten = pending.len();
    let skipped = files.len() - rewritten;
    Ok(RunReport {
        roots: config
            .roots
            .iter()
            .map(|r| r.to_string_lossy().to_string())
            .collect(),
        mode: config.output.name(),
        output_root: config
            .output
            .root()
            .map(|r| r.to_string_lossy().to_string()),
        dry_run: config.dry_run,
        scanned: entries.len(),
        rewritten,
        unchanged,
        skipped,
        cleaned,
        duration_ms: start.elapsed().as_millis() as u64,
        files,
    })
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deletes every `.class` file below `root`, returning how many were removed.
fn clean_output(root: &Path) -> Result<usize> {
    let stale = scan_classes(root)?;
    for entry in &stale {
        let path = entry.path();
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove stale output: {}", path.display()))?;
    }
    Ok(stale.len())
}

/// Writes `bytes` to a sibling temporary file and renames it over `path`.
/// An existing destination keeps its permissions.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut tmp_os = path.as_os_str().to_os_string();
    tmp_os.push(".tmp");
    let tmp = PathBuf::from(tmp_os);
    let result = replace_with_tmp(path, &tmp, bytes);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn replace_with_tmp(path: &Path, tmp: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(tmp, bytes)
        .with_context(|| format!("Failed to write temporary file: {}", tmp.display()))?;

    if let Ok(metadata) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp, metadata.permissions())
            .with_context(|| format!("Failed to copy permissions to {}", tmp.display()))?;
    }

    std::fs::rename(tmp, path)
        .with_context(|| format!("Failed to atomically replace file: {}", path.display()))
}
