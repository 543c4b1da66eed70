//! Module descriptor touch-up.
//!
//! After usages move to a new package, every module that was edited may need
//! a dependency on the module that now owns the symbol. Edited modules are
//! discovered from `git diff`; each one's descriptor (`pom.xml`) gets the
//! dependency fragment inserted after a fixed anchor tag unless it already
//! contains it.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Default descriptor file name of a module.
pub const DESCRIPTOR_FILE: &str = "pom.xml";

/// Default tag after which the dependency fragment is inserted.
pub const DEFAULT_ANCHOR: &str = "<dependencies>";

/// What to ensure in the descriptors of edited modules.
#[derive(Debug, Clone)]
pub struct DescriptorUpdate {
    /// Text that must be present, e.g. a `<dependency>` block.
    pub fragment: String,
    /// Tag the fragment is inserted after.
    pub anchor: String,
    /// Descriptor file name inside each module directory.
    pub file_name: String,
}

impl DescriptorUpdate {
    pub fn new(fragment: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            anchor: DEFAULT_ANCHOR.to_string(),
            file_name: DESCRIPTOR_FILE.to_string(),
        }
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = anchor.into();
        self
    }
}

/// Lists files changed in the working tree of `repo_dir` relative to its last
/// commit, as paths relative to `repo_dir`.
pub fn changed_files(repo_dir: &Path) -> Result<Vec<String>> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_dir)
        .args(["diff", "--relative", "--name-only"])
        .output()
        .context("Failed to run git diff")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git diff failed in {}: {}", repo_dir.display(), stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect())
}

/// Maps changed files to the descriptors of their top-level modules.
///
/// The module of `core/src/main/java/A.java` is `core`; its descriptor is
/// `repo_dir/core/<file_name>`. Only descriptors that exist are returned.
pub fn descriptors_for(repo_dir: &Path, changed: &[String], file_name: &str) -> Vec<PathBuf> {
    let modules: BTreeSet<&str> = changed
        .iter()
        .filter_map(|f| f.split('/').next())
        .filter(|m| !m.is_empty())
        .collect();

    modules
        .into_iter()
        .map(|m| repo_dir.join(m).join(file_name))
        .filter(|p| p.is_file())
        .collect()
}

/// Descriptors of the modules edited in the working tree of `repo_dir`.
pub fn descriptors_of_modified_modules(
    repo_dir: &Path,
    file_name: &str,
) -> Result<Vec<PathBuf>> {
    let changed = changed_files(repo_dir)?;
    Ok(descriptors_for(repo_dir, &changed, file_name))
}

/// Inserts `fragment` right after the first `anchor` in `content`.
///
/// Returns `Ok(None)` when `fragment` is already present.
pub fn ensure_fragment(content: &str, anchor: &str, fragment: &str) -> Result<Option<String>> {
    if content.contains(fragment) {
        return Ok(None);
    }
    let index = content
        .find(anchor)
        .with_context(|| format!("Anchor `{}` not found", anchor))?
        + anchor.len();

    let mut out = String::with_capacity(content.len() + fragment.len());
    out.push_str(&content[..index]);
    out.push_str(fragment);
    out.push_str(&content[index..]);
    Ok(Some(out))
}

/// Ensures the file at `path` contains `fragment`. Returns whether it was changed.
pub fn ensure_file_contains(path: &Path, anchor: &str, fragment: &str) -> Result<bool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match ensure_fragment(&content, anchor, fragment)
        .with_context(|| format!("Cannot update {}", path.display()))?
    {
        Some(updated) => {
            std::fs::write(path, updated)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Applies `update` to every edited module's descriptor.
///
/// Per-descriptor failures are logged and skipped. Returns the descriptors
/// that were changed.
pub fn update_modified_modules(
    repo_dir: &Path,
    update: &DescriptorUpdate,
) -> Result<Vec<PathBuf>> {
    let mut updated = Vec::new();
    for descriptor in descriptors_of_modified_modules(repo_dir, &update.file_name)? {
        match ensure_file_contains(&descriptor, &update.anchor, &update.fragment) {
            Ok(true) => {
                log::debug!("Added dependency to {}.", descriptor.display());
                updated.push(descriptor);
            }
            Ok(false) => {}
            Err(e) => log::error!("{:#}", e),
        }
    }
    Ok(updated)
}
