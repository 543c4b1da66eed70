//! Java source scanner.
//!
//! Recursively walks a source tree to collect `.java` files, skipping entries
//! whose names start with `.` (unless disabled) and entries matching the
//! user's exclusion globs. Walk order is sorted by file name so repeated runs
//! see files in the same order.

use anyhow::{Context, Result};
use glob::Pattern;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extension of the sources the scanner collects.
pub const SOURCE_EXTENSION: &str = "java";

/// Which entries the scanner skips while walking.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    exclude: Vec<Pattern>,
    skip_hidden: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            skip_hidden: true,
        }
    }
}

impl ScanOptions {
    /// Builds scan options from raw glob strings.
    ///
    /// Globs are matched against both the entry's file name and its path
    /// relative to the walk root, so `target` and `core/target` both work.
    pub fn new(exclude: &[String], no_default_excludes: bool) -> Result<Self> {
        let exclude = exclude
            .iter()
            .map(|g| Pattern::new(g).with_context(|| format!("Invalid exclude glob '{}'", g)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            exclude,
            skip_hidden: !no_default_excludes,
        })
    }

    fn is_excluded(&self, entry: &walkdir::DirEntry, root: &Path) -> bool {
        // The root itself is never excluded, even when it is `.`.
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if self.skip_hidden && name.starts_with('.') {
            return true;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        self.exclude
            .iter()
            .any(|p| p.matches(&name) || p.matches_path(relative))
    }
}

/// Collects all `.java` files under `root`.
pub fn collect_java_files(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !options.is_excluded(e, root))
    {
        let entry = match entry {
            Ok(entry) => entry,
            // Below the root, an unreadable entry costs only its own files.
            Err(e) if e.depth() > 0 => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to walk {}", root.display()));
            }
        };
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext == SOURCE_EXTENSION)
        {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Collects `.java` files under `root` whose file name is exactly `file_name`.
pub fn find_files_named(
    root: &Path,
    file_name: &str,
    options: &ScanOptions,
) -> Result<Vec<PathBuf>> {
    Ok(collect_java_files(root, options)?
        .into_iter()
        .filter(|p| p.file_name().is_some_and(|n| n == file_name))
        .collect())
}

/// Returns the `.java` files under `root` whose content matches `pattern`.
///
/// Unreadable files (e.g. non UTF-8) are logged and skipped.
pub fn files_matching(
    root: &Path,
    pattern: &Regex,
    options: &ScanOptions,
) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    for file in collect_java_files(root, options)? {
        match std::fs::read_to_string(&file) {
            Ok(content) if pattern.is_match(&content) => matches.push(file),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable {}: {}", file.display(), e),
        }
    }
    Ok(matches)
}
