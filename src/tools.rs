//! Low-level text search and substitution.
//!
//! The rewriter only ever needs two primitives: "which files mention this" and
//! "replace this in that file". [`NativeTools`] does both in-process with the
//! `regex` crate. [`SedTools`] hands substitution to GNU `sed`, which is what
//! the selector in [`find_sed_command`] guarantees; BSD `sed` lacks `\b` and
//! would silently corrupt files.

use crate::rewriter::UsagePattern;
use crate::scanner::{self, ScanOptions};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Search and substitution primitives used by the rewriter.
pub trait TextTools {
    /// Returns the source files under `root` whose content matches `pattern`.
    fn files_containing(&self, pattern: &Regex, root: &Path) -> Result<Vec<PathBuf>>;

    /// Replaces every occurrence of `pattern` in the file at `path` with
    /// `replacement`, returning the number of substitutions. The file is left
    /// untouched when the count is zero.
    fn substitute_in_file(
        &self,
        path: &Path,
        pattern: &UsagePattern,
        replacement: &str,
    ) -> Result<usize>;
}

/// In-process implementation: walkdir for search, regex for substitution.
#[derive(Debug, Clone, Default)]
pub struct NativeTools {
    scan: ScanOptions,
}

impl NativeTools {
    pub fn new(scan: ScanOptions) -> Self {
        Self { scan }
    }
}

impl TextTools for NativeTools {
    fn files_containing(&self, pattern: &Regex, root: &Path) -> Result<Vec<PathBuf>> {
        scanner::files_matching(root, pattern, &self.scan)
    }

    fn substitute_in_file(
        &self,
        path: &Path,
        pattern: &UsagePattern,
        replacement: &str,
    ) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (new_content, count) = pattern.replace_all(&content, replacement);
        if count > 0 {
            std::fs::write(path, new_content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(count)
    }
}

/// Substitution through an external GNU `sed`; search stays in-process.
#[derive(Debug, Clone)]
pub struct SedTools {
    executable: String,
    scan: ScanOptions,
}

impl SedTools {
    pub fn new(executable: impl Into<String>, scan: ScanOptions) -> Self {
        Self {
            executable: executable.into(),
            scan,
        }
    }

    /// Builds a `SedTools` with the GNU `sed` suitable for this host.
    pub fn detect(scan: ScanOptions) -> Result<Self> {
        Ok(Self::new(find_sed_command()?, scan))
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }
}

impl TextTools for SedTools {
    fn files_containing(&self, pattern: &Regex, root: &Path) -> Result<Vec<PathBuf>> {
        scanner::files_matching(root, pattern, &self.scan)
    }

    fn substitute_in_file(
        &self,
        path: &Path,
        pattern: &UsagePattern,
        replacement: &str,
    ) -> Result<usize> {
        // sed cannot report a count, so count in-process first.
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let count = pattern.count_changes(&content, replacement);
        if count == 0 {
            return Ok(0);
        }

        let output = Command::new(&self.executable)
            .arg("-i")
            .arg("-E")
            .arg(sed_expression(pattern.literal(), replacement))
            .arg(path)
            .output()
            .with_context(|| format!("Failed to run {}", self.executable))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            anyhow::bail!(
                "{} failed on {}: {}",
                self.executable,
                path.display(),
                stderr.trim()
            );
        }
        Ok(count)
    }
}

/// Builds an ERE substitution equivalent to [`UsagePattern`]: word-bounded,
/// never right after a `.`.
fn sed_expression(literal: &str, replacement: &str) -> String {
    format!(
        "s/(^|[^.[:alnum:]_]){}\\b/\\1{}/g",
        escape_sed_pattern(literal),
        escape_sed_replacement(replacement)
    )
}

fn escape_sed_pattern(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "\\/.[]*^$+?(){}|".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_sed_replacement(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '/' | '&') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Picks the GNU `sed` binary for the host.
///
/// Linux ships GNU `sed` as `sed`. On macOS the system `sed` is BSD, so GNU
/// `sed` must be installed as `gsed` (`brew install gnu-sed`). Any other
/// platform is refused rather than guessed.
pub fn find_sed_command() -> Result<String> {
    sed_command_for(std::env::consts::OS, |name| which::which(name).is_ok())
}

fn sed_command_for(os: &str, installed: impl Fn(&str) -> bool) -> Result<String> {
    match os {
        "linux" => Ok("sed".to_string()),
        "macos" => {
            if !installed("gsed") {
                anyhow::bail!(
                    "GNU sed not found as `gsed`; install it with `brew install gnu-sed`"
                );
            }
            Ok("gsed".to_string())
        }
        other => anyhow::bail!("Platform not supported for sed substitution: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn linux_uses_plain_sed() {
        assert_eq!(sed_command_for("linux", |_| false).unwrap(), "sed");
    }

    #[test]
    fn macos_requires_gsed() {
        assert_eq!(sed_command_for("macos", |n| n == "gsed").unwrap(), "gsed");
        let err = sed_command_for("macos", |_| false).unwrap_err();
        assert!(err.to_string().contains("brew install gnu-sed"));
    }

    #[test]
    fn other_platforms_fail_loudly() {
        let err = sed_command_for("windows", |_| true).unwrap_err();
        assert!(err.to_string().contains("Platform not supported"));
    }

    #[test]
    fn sed_expression_escapes_dots_and_guards_prefix() {
        assert_eq!(
            sed_expression("com.foo.Bar", "org.baz.Bar"),
            r"s/(^|[^.[:alnum:]_])com\.foo\.Bar\b/\1org.baz.Bar/g"
        );
    }

    #[test]
    fn native_substitution_writes_only_on_change() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("A.java");
        std::fs::write(&file, "import com.foo.Bar;\n").unwrap();
        let tools = NativeTools::default();

        let pattern = UsagePattern::new("com.foo.Bar").unwrap();
        assert_eq!(tools.substitute_in_file(&file, &pattern, "org.baz.Bar").unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "import org.baz.Bar;\n");

        assert_eq!(tools.substitute_in_file(&file, &pattern, "org.baz.Bar").unwrap(), 0);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn sed_substitution_matches_native() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("A.java");
        std::fs::write(&file, "import com.foo.Bar;\nx.com.foo.Bar y;\n").unwrap();
        let tools = SedTools::new("sed", ScanOptions::default());

        let pattern = UsagePattern::new("com.foo.Bar").unwrap();
        assert_eq!(tools.substitute_in_file(&file, &pattern, "org.baz.Bar").unwrap(), 1);
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "import org.baz.Bar;\nx.com.foo.Bar y;\n"
        );
    }
}
