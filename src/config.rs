use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::cli::ReplaceArgs;
use crate::scan::ClassEntry;
use crate::tokens::TokenMap;

/// Where changed classes are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Replace each changed file where it was found.
    InPlace,
    /// Mirror changed files under `root`, keyed by their path relative to
    /// the input root they came from.
    Shadow { root: PathBuf },
}

impl OutputMode {
    pub fn destination(&self, entry: &ClassEntry) -> PathBuf {
        match self {
            OutputMode::InPlace => entry.path(),
            OutputMode::Shadow { root } => root.join(&entry.relative),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputMode::InPlace => "in-place",
            OutputMode::Shadow { .. } => "shadow",
        }
    }

    pub fn root(&self) -> Option<&Path> {
        match self {
            OutputMode::InPlace => None,
            OutputMode::Shadow { root } => Some(root),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub tokens: TokenMap,
    pub roots: Vec<PathBuf>,
    pub output: OutputMode,
    pub strict: bool,
    pub dry_run: bool,
    pub clean: bool,
    /// Worker threads; `None` uses the available parallelism.
    pub jobs: Option<usize>,
}

pub fn resolve_run_config(args: &ReplaceArgs) -> Result<RunConfig> {
    let mut tokens = TokenMap::new();
    if let Some(path) = &args.token_file {
        tokens = load_token_file(path)?;
    }
    for assignment in &args.tokens {
        tokens
            .insert_assignment(assignment)
            .with_context(|| format!("Invalid --token argument: {assignment}"))?;
    }

    let output = match &args.output {
        Some(root) => {
            check_output_root(root, &args.roots, args.clean)?;
            OutputMode::Shadow { root: root.clone() }
        }
        None => OutputMode::InPlace,
    };

    if args.jobs == Some(0) {
        anyhow::bail!("--jobs must be at least 1");
    }

    Ok(RunConfig {
        tokens,
        roots: args.roots.clone(),
        output,
        strict: args.strict,
        dry_run: args.dry_run,
        clean: args.clean,
        jobs: args.jobs,
    })
}

/// Reads a JSON object of token to replacement, keeping file order.
pub fn load_token_file(path: &Path) -> Result<TokenMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file: {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("Token file is not valid JSON: {}", path.display()))?;
    let mut tokens = TokenMap::new();
    tokens
        .extend_from_json(&value)
        .with_context(|| format!("Invalid token file: {}", path.display()))?;
    Ok(tokens)
}

/// The shadow root must be an existing directory outside every input root.
/// With `clean`, no input root may lie inside it either, since cleaning would
/// delete inputs.
fn check_output_root(output: &Path, roots: &[PathBuf], clean: bool) -> Result<()> {
    if !output.is_dir() {
        anyhow::bail!(
            "Output directory does not exist or is not a directory: {}",
            output.display()
        );
    }
    let output_canonical = output
        .canonicalize()
        .with_context(|| format!("Failed to resolve output directory: {}", output.display()))?;

    for root in roots {
        // Missing input roots are skipped by the walker.
        let Ok(root_canonical) = root.canonicalize() else {
            continue;
        };
        if output_canonical.starts_with(&root_canonical) {
            anyhow::bail!(
                "Output directory {} must not be inside input directory {}",
                output.display(),
                root.display()
            );
        }
        if clean && root_canonical.starts_with(&output_canonical) {
            anyhow::bail!(
                "--clean would delete input directory {} inside output directory {}",
                root.display(),
                output.display()
            );
        }
    }
    Ok(())
}
