use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// A `.class` file found under one of the input roots.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClassEntry {
    pub root: PathBuf,
    /// Path relative to `root`, used to mirror the file in shadow mode.
    pub relative: PathBuf,
}

impl ClassEntry {
    pub fn path(&self) -> PathBuf {
        self.root.join(&self.relative)
    }
}

pub fn is_class_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "class")
}

/// Lists every regular `.class` file below `root`, sorted by relative path.
///
/// A root that does not exist or is not a directory yields nothing. Hidden
/// and git-ignored files are included; symbolic links are not followed.
pub fn scan_classes(root: &Path) -> Result<Vec<ClassEntry>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return ignore::WalkState::Continue;
                }
            };
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            if is_file && is_class_file(entry.path()) {
                let _ = tx.send(Ok(entry.into_path()));
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);

    let mut entries = Vec::new();
    for found in rx {
        let path = found.with_context(|| format!("failed to walk {}", root.display()))?;
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?
            .to_path_buf();
        entries.push(ClassEntry {
            root: root.to_path_buf(),
            relative,
        });
    }
    entries.sort();
    Ok(entries)
}

/// Scans each root in turn; results keep the root order.
///
/// A file reachable from several roots (repeated or nested roots) is listed
/// once, under the first root that reaches it.
pub fn scan_roots(roots: &[PathBuf]) -> Result<Vec<ClassEntry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for root in roots {
        for entry in scan_classes(root)? {
            let path = entry.path();
            let key = path.canonicalize().unwrap_or(path);
            if seen.insert(key) {
                entries.push(entry);
            }
        }
    }
    Ok(entries)
}
