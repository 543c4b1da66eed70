//! Declaration lookup.
//!
//! Finds the file declaring a symbol by its conventional `<Symbol>.java` name,
//! disambiguates duplicates with an ordered list of preferred directories, and
//! reads the package a file declares.

use crate::scanner::{self, ScanOptions};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PACKAGE_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bpackage\s+(?P<name>[^;\s]+?)\s*;").unwrap());

/// A located symbol: what the migration needs to know before touching anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolRow {
    pub symbol: String,
    /// Declaration file, relative to the search root.
    pub path: PathBuf,
    /// Package declared by that file.
    pub package: String,
}

/// Scores `path` against an ordered list of preferred ancestor directories.
///
/// Returns the index of the first entry that is an ancestor of `path`, or
/// `preferences.len()` when none is. Lower is better. With an empty list every
/// path scores 0.
///
/// Given `b/d/f.java` and `[a, b, c, b/d]`, returns 1.
pub fn score(path: &Path, preferences: &[PathBuf]) -> usize {
    preferences
        .iter()
        .position(|candidate| path.starts_with(candidate))
        .unwrap_or(preferences.len())
}

/// Finds the file declaring `symbol` under `root`.
///
/// Returns `None` (with a warning) when no `<symbol>.java` exists. When several
/// exist, the one with the lowest [`score`] wins; ties go to the first in walk
/// order.
pub fn find_declaration(
    symbol: &str,
    root: &Path,
    preferences: &[PathBuf],
    options: &ScanOptions,
) -> Result<Option<PathBuf>> {
    let file_name = format!("{}.{}", symbol, scanner::SOURCE_EXTENSION);
    let paths = scanner::find_files_named(root, &file_name, options)?;
    let count = paths.len();

    // `min_by_key` keeps the first of equal elements, i.e. walk order.
    let Some(chosen) = paths.into_iter().min_by_key(|p| score(p, preferences)) else {
        log::warn!("No path is found for {}.", symbol);
        return Ok(None);
    };
    if count > 1 {
        log::warn!(
            "{} paths are found for {}. Using `{}`.",
            count,
            symbol,
            chosen.display()
        );
    }
    Ok(Some(chosen))
}

/// Extracts the package name from Java source text.
pub fn package_of(source: &str) -> Option<&str> {
    PACKAGE_DECLARATION
        .captures(source)
        .and_then(|c| c.name("name"))
        .map(|m| m.as_str())
}

/// Reads the package declared by the file at `path`.
///
/// A file without a package statement is logged as an error and yields `None`.
pub fn package_name(path: &Path) -> Result<Option<String>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match package_of(&source) {
        Some(name) => Ok(Some(name.to_string())),
        None => {
            log::error!("Didn't find package name in `{}`.", path.display());
            Ok(None)
        }
    }
}

/// Locates each symbol and reads its package.
///
/// Symbols that cannot be located, or whose file declares no package, are
/// dropped. Paths in the result are relative to `root`. Callers without a real
/// directory preference should still pass `root` itself in `preferences` so a
/// duplicate outside every preferred directory loses to one inside.
pub fn make_table<S: AsRef<str>>(
    symbols: &[S],
    root: &Path,
    preferences: &[PathBuf],
    options: &ScanOptions,
) -> Result<Vec<SymbolRow>> {
    let mut rows = Vec::new();

    for symbol in symbols {
        let symbol = symbol.as_ref();
        let Some(path) = find_declaration(symbol, root, preferences, options)? else {
            continue;
        };
        let Some(package) = package_name(&path)? else {
            continue;
        };
        let path = path.strip_prefix(root).map(Path::to_path_buf).unwrap_or(path);
        rows.push(SymbolRow {
            symbol: symbol.to_string(),
            path,
            package,
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dummy-java-project")
    }

    fn prefs(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn score_picks_first_ancestor() {
        let preferences = prefs(&["a", "b", "c", "b/d"]);
        assert_eq!(score(Path::new("b/d/f.java"), &preferences), 1);
    }

    #[test]
    fn score_is_len_when_nothing_matches() {
        let preferences = prefs(&["a", "c"]);
        assert_eq!(score(Path::new("b/f.java"), &preferences), 2);
    }

    #[test]
    fn score_is_zero_for_empty_preferences() {
        assert_eq!(score(Path::new("b/f.java"), &[]), 0);
        assert_eq!(score(Path::new("anything/else.java"), &[]), 0);
    }

    #[test]
    fn score_matches_whole_components_only() {
        let preferences = prefs(&["src/ma", "src/main"]);
        assert_eq!(score(Path::new("src/main/Foo.java"), &preferences), 1);
    }

    #[test]
    fn score_stays_within_bounds() {
        let preferences = prefs(&["x", "y", "z"]);
        for path in ["x/1.java", "y/2.java", "z/3.java", "w/4.java"] {
            let s = score(Path::new(path), &preferences);
            assert!(s <= preferences.len());
            assert_eq!(s == 0, Path::new(path).starts_with("x"));
        }
    }

    #[test]
    fn package_of_reads_declaration() {
        let source = "// header\npackage com.example.main;\n\npublic class A {}\n";
        assert_eq!(package_of(source), Some("com.example.main"));
    }

    #[test]
    fn package_of_missing_declaration() {
        assert_eq!(package_of("public class A {}\n"), None);
    }

    #[test]
    fn find_declaration_prefers_earlier_directory() {
        let root = fixture_root();
        let preferences = vec![root.join("PreferredLocation"), root.clone()];
        let found = find_declaration("Lorem", &root, &preferences, &ScanOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(found, root.join("PreferredLocation/Lorem.java"));
    }

    #[test]
    fn find_declaration_missing_symbol() {
        let root = fixture_root();
        let found =
            find_declaration("SymbolWithNoJavaCode", &root, &[], &ScanOptions::default()).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn make_table_from_fixture() {
        let root = fixture_root();
        let preferences = vec![root.join("PreferredLocation"), root.clone()];
        let rows = make_table(
            &["Lorem", "Ipsum", "SymbolWithNoJavaCode"],
            &root,
            &preferences,
            &ScanOptions::default(),
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![SymbolRow {
                symbol: "Lorem".to_string(),
                path: PathBuf::from("PreferredLocation/Lorem.java"),
                package: "com.example.main.dummyJavaProject.PreferredLocation".to_string(),
            }]
        );
    }
}
