//! Usage rewriting for a relocated symbol.
//!
//! Java lets a type be referenced in several ways, and each needs its own pass:
//!
//! 1. **Direct**: the fully qualified name, e.g. `import com.foo.bar.MyClass;`.
//! 2. **Wildcard**: `import com.foo.*;` makes `bar.MyClass` resolvable.
//! 3. **Relative**: code declared in `package com.foo;` may write `bar.MyClass`
//!    without importing anything.
//!
//! Passes 2 and 3 run at every ancestor scope of the old package, broadest
//! first. All matching is textual: a [`UsagePattern`] is a word-bounded literal
//! that refuses to match right after a `.`, so the tail of an already qualified
//! name is left alone. References split across lines, or spelled out in
//! comments and string literals, are treated like any other text.

use crate::tools::TextTools;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::ops::{AddAssign, Range};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static IMPORT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*import\s+[^;\n]+;[^\n]*$").unwrap());

static PACKAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*package\s+[^;\n]+;[^\n]*$").unwrap());

/// Word-bounded matcher for a (possibly partially) qualified symbol name.
#[derive(Debug, Clone)]
pub struct UsagePattern {
    literal: String,
    regex: Regex,
}

impl UsagePattern {
    /// Builds a pattern for `usage`, e.g. `bar.MyClass` or `MyClass`.
    pub fn new(usage: &str) -> Result<Self> {
        if usage.is_empty() {
            anyhow::bail!("Usage pattern must not be empty");
        }
        let regex = Regex::new(&format!(r"\b{}\b", regex::escape(usage)))
            .with_context(|| format!("Failed to build usage pattern for '{}'", usage))?;
        Ok(Self {
            literal: usage.to_string(),
            regex,
        })
    }

    /// The qualified name this pattern matches.
    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// Byte ranges of every accepted match, in order.
    ///
    /// The `regex` crate has no look-behind, so matches preceded by `.` are
    /// filtered here and the search resumes one character later.
    fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        let mut pos = 0;
        while let Some(m) = self.regex.find_at(text, pos) {
            if text[..m.start()].ends_with('.') {
                let step = text[m.start()..].chars().next().map_or(1, char::len_utf8);
                pos = m.start() + step;
            } else {
                spans.push(m.range());
                pos = m.end();
            }
            if pos >= text.len() {
                break;
            }
        }
        spans
    }

    pub fn is_match(&self, text: &str) -> bool {
        !self.spans(text).is_empty()
    }

    pub fn count(&self, text: &str) -> usize {
        self.spans(text).len()
    }

    /// Whether substituting `replacement` would leave every match unchanged.
    pub fn is_identity(&self, replacement: &str) -> bool {
        self.literal == replacement
    }

    /// Number of matches that `replacement` would actually change.
    pub fn count_changes(&self, text: &str, replacement: &str) -> usize {
        if self.is_identity(replacement) {
            return 0;
        }
        self.count(text)
    }

    /// Replaces every accepted match, returning the new text and the count.
    ///
    /// A replacement equal to the literal is not a change and counts zero.
    pub fn replace_all(&self, text: &str, replacement: &str) -> (String, usize) {
        if self.is_identity(replacement) {
            return (text.to_string(), 0);
        }
        let spans = self.spans(text);
        if spans.is_empty() {
            return (text.to_string(), 0);
        }
        let mut out = String::with_capacity(text.len() + spans.len() * replacement.len());
        let mut last = 0;
        for span in &spans {
            out.push_str(&text[last..span.start]);
            out.push_str(replacement);
            last = span.end;
        }
        out.push_str(&text[last..]);
        (out, spans.len())
    }
}

/// One ancestor scope of a package, paired with what is left of the name.
///
/// For `com.foo.bar` and `MyClass` the levels are `com` / `foo.bar.MyClass`,
/// `com.foo` / `bar.MyClass` and `com.foo.bar` / `MyClass`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeLevel {
    pub scope: String,
    pub usage: String,
}

/// Splits `package` into its scope levels, broadest first.
pub fn scope_levels(package: &str, symbol: &str) -> Vec<ScopeLevel> {
    let parts: Vec<&str> = package.split('.').filter(|p| !p.is_empty()).collect();
    (1..=parts.len())
        .map(|i| {
            let scope = parts[..i].join(".");
            let rest = parts[i..].join(".");
            let usage = if rest.is_empty() {
                symbol.to_string()
            } else {
                format!("{}.{}", rest, symbol)
            };
            ScopeLevel { scope, usage }
        })
        .collect()
}

/// What a rewriting pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewriteSummary {
    pub files_modified: usize,
    pub substitutions: usize,
    pub imports_added: usize,
}

impl RewriteSummary {
    pub fn is_empty(&self) -> bool {
        self.files_modified == 0
    }
}

impl AddAssign for RewriteSummary {
    fn add_assign(&mut self, other: Self) {
        self.files_modified += other.files_modified;
        self.substitutions += other.substitutions;
        self.imports_added += other.imports_added;
    }
}

/// Replaces the fully qualified `old_fqn` with `new_fqn` in every file under `root`.
pub fn migrate_direct_usages(
    old_fqn: &str,
    new_fqn: &str,
    root: &Path,
    tools: &dyn TextTools,
) -> Result<RewriteSummary> {
    let pattern = UsagePattern::new(old_fqn)?;
    let files = tools.files_containing(&pattern.regex, root)?;
    let summary = substitute_each(&files, &pattern, new_fqn, tools);

    log::debug!(
        "Direct usages of `{}`: {} substitutions in {} files.",
        old_fqn,
        summary.substitutions,
        summary.files_modified
    );
    Ok(summary)
}

/// Rewrites usages in files that import `scope.*`.
///
/// `import com.foo.*;` exposes `com.foo.bar.MyClass` as `bar.MyClass`, so with
/// `scope = "com.foo"` and a pattern for `bar.MyClass` every occurrence in
/// those files becomes `new_fqn`.
pub fn migrate_wildcard_imports(
    scope: &str,
    pattern: &UsagePattern,
    new_fqn: &str,
    root: &Path,
    tools: &dyn TextTools,
) -> Result<RewriteSummary> {
    let star_import = Regex::new(&format!(
        r"(?m)^[ \t]*import\s+{}\.\*\s*;[ \t]*\r?$",
        regex::escape(scope)
    ))?;
    let files = tools.files_containing(&star_import, root)?;
    if files.is_empty() {
        return Ok(RewriteSummary::default());
    }
    log::debug!(
        "Trying to migrate wildcard imports. {} files import `{}.*`.",
        files.len(),
        scope
    );

    let summary = substitute_each(&files, pattern, new_fqn, tools);
    log::debug!(
        "Modified {} out of {} files with wildcard imports, a total of {} substitutions.",
        summary.files_modified,
        files.len(),
        summary.substitutions
    );
    Ok(summary)
}

/// Runs `substitute_in_file` over `files`, logging per-file failures.
fn substitute_each(
    files: &[PathBuf],
    pattern: &UsagePattern,
    replacement: &str,
    tools: &dyn TextTools,
) -> RewriteSummary {
    let mut summary = RewriteSummary::default();
    for file in files {
        match tools.substitute_in_file(file, pattern, replacement) {
            Ok(0) => {}
            Ok(n) => {
                summary.files_modified += 1;
                summary.substitutions += n;
            }
            Err(e) => log::error!("{:#}", e),
        }
    }
    summary
}

/// Rewrites usages in files declared directly in `scope`.
///
/// Code in `package com.foo;` can write `bar.MyClass` with no import at all.
/// Each such occurrence becomes `new_fqn`, and an `import new_fqn;` line is
/// added unless already present. The old declaration file itself is skipped.
pub fn migrate_relative_usages(
    scope: &str,
    pattern: &UsagePattern,
    new_fqn: &str,
    declaration: &Path,
    root: &Path,
    tools: &dyn TextTools,
) -> Result<RewriteSummary> {
    let package_declaration = Regex::new(&format!(
        r"(?m)^[ \t]*package\s+{}\s*;[ \t]*\r?$",
        regex::escape(scope)
    ))?;
    let files = tools.files_containing(&package_declaration, root)?;
    let mut summary = RewriteSummary::default();
    if files.is_empty() {
        log::debug!("No file is declared in `{}`.", scope);
        return Ok(summary);
    }
    log::debug!(
        "Trying to migrate relative usages. {} files are declared in `{}`.",
        files.len(),
        scope
    );

    for file in files {
        if is_same_file(&file, declaration) {
            continue;
        }
        match rewrite_relative_file(&file, pattern, new_fqn) {
            Ok(None) => {}
            Ok(Some((substitutions, import_added))) => {
                log::debug!(
                    "`{}` uses `{}` without qualifying it.",
                    file.strip_prefix(root).unwrap_or(&file).display(),
                    pattern.literal()
                );
                summary.files_modified += 1;
                summary.substitutions += substitutions;
                if import_added {
                    summary.imports_added += 1;
                }
            }
            Err(e) => log::error!("{:#}", e),
        }
    }

    Ok(summary)
}

/// Returns `None` when the file does not use the pattern.
fn rewrite_relative_file(
    file: &Path,
    pattern: &UsagePattern,
    new_fqn: &str,
) -> Result<Option<(usize, bool)>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let (mut content, substitutions) = pattern.replace_all(&content, new_fqn);
    if substitutions == 0 {
        return Ok(None);
    }

    let mut import_added = false;
    if !has_import(&content, new_fqn) {
        match insert_import(&content, new_fqn) {
            Some(updated) => {
                content = updated;
                import_added = true;
            }
            None => log::warn!(
                "Failed to find a proper place to add the import statement in {}.",
                file.display()
            ),
        }
    }

    std::fs::write(file, content).with_context(|| format!("Failed to write {}", file.display()))?;
    Ok(Some((substitutions, import_added)))
}

/// Whether `content` has a single-type import of `fqn`.
pub fn has_import(content: &str, fqn: &str) -> bool {
    Regex::new(&format!(r"(?m)^[ \t]*import\s+{}\s*;", regex::escape(fqn)))
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

/// Inserts `import fqn;` on its own line after the last import, or after the
/// package declaration when there is no import. Returns `None` when neither
/// anchor exists.
pub fn insert_import(content: &str, fqn: &str) -> Option<String> {
    let anchor = IMPORT_LINE
        .find_iter(content)
        .last()
        .or_else(|| PACKAGE_LINE.find(content))?;

    // Keep CRLF files consistently CRLF.
    let (end, newline) = match anchor.as_str().strip_suffix('\r') {
        Some(_) => (anchor.end() - 1, "\r\n"),
        None => (anchor.end(), "\n"),
    };

    let mut out = String::with_capacity(content.len() + fqn.len() + 10);
    out.push_str(&content[..end]);
    out.push_str(newline);
    out.push_str("import ");
    out.push_str(fqn);
    out.push(';');
    out.push_str(&content[end..]);
    Some(out)
}

/// Rewrites wildcard-import and relative usages at every scope of `old_package`.
///
/// For `old_package = "com.foo.bar"` and `symbol = "MyClass"`:
/// 1. in scope `com`, usages of `foo.bar.MyClass`;
/// 2. in scope `com.foo`, usages of `bar.MyClass`;
/// 3. in scope `com.foo.bar`, usages of `MyClass`.
///
/// `declaration` is the file declaring the old symbol; it is never rewritten.
pub fn migrate_usages_at_each_level(
    old_package: &str,
    symbol: &str,
    new_fqn: &str,
    declaration: &Path,
    root: &Path,
    tools: &dyn TextTools,
) -> Result<RewriteSummary> {
    let mut summary = RewriteSummary::default();

    for level in scope_levels(old_package, symbol) {
        log::debug!("Finding `{}` in `{}`", level.usage, level.scope);
        let pattern = UsagePattern::new(&level.usage)?;
        summary += migrate_wildcard_imports(&level.scope, &pattern, new_fqn, root, tools)?;
        summary +=
            migrate_relative_usages(&level.scope, &pattern, new_fqn, declaration, root, tools)?;
    }

    Ok(summary)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::NativeTools;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) -> PathBuf {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn pattern_is_word_bounded() {
        let pattern = UsagePattern::new("Lorem").unwrap();
        assert_eq!(pattern.count("Lorem LoremIpsum UserOfLorem lorem (Lorem)"), 2);
    }

    #[test]
    fn pattern_skips_qualified_tail() {
        let pattern = UsagePattern::new("bar.MyClass").unwrap();
        assert_eq!(pattern.count("com.foo.bar.MyClass"), 0);
        assert_eq!(pattern.count("new bar.MyClass()"), 1);
    }

    #[test]
    fn pattern_escapes_dots() {
        let pattern = UsagePattern::new("bar.MyClass").unwrap();
        assert!(!pattern.is_match("barXMyClass"));
    }

    #[test]
    fn pattern_finds_match_after_rejected_one() {
        let pattern = UsagePattern::new("Lorem").unwrap();
        let (out, n) = pattern.replace_all("a.Lorem Lorem", "x.y.Lorem");
        assert_eq!(n, 1);
        assert_eq!(out, "a.Lorem x.y.Lorem");
    }

    #[test]
    fn replacing_with_the_literal_changes_nothing() {
        let pattern = UsagePattern::new("bar.MyClass").unwrap();
        let (out, n) = pattern.replace_all("class Up { bar.MyClass m; }", "bar.MyClass");
        assert_eq!(n, 0);
        assert_eq!(out, "class Up { bar.MyClass m; }");
        assert_eq!(pattern.count_changes("bar.MyClass", "bar.MyClass"), 0);
        assert_eq!(pattern.count_changes("bar.MyClass", "org.MyClass"), 1);
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(UsagePattern::new("").is_err());
    }

    #[test]
    fn scope_levels_broadest_first() {
        let levels = scope_levels("com.foo.bar", "MyClass");
        let pairs: Vec<_> = levels
            .iter()
            .map(|l| (l.scope.as_str(), l.usage.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("com", "foo.bar.MyClass"),
                ("com.foo", "bar.MyClass"),
                ("com.foo.bar", "MyClass"),
            ]
        );
    }

    #[test]
    fn scope_levels_single_segment() {
        assert_eq!(
            scope_levels("app", "Main"),
            vec![ScopeLevel {
                scope: "app".into(),
                usage: "Main".into()
            }]
        );
    }

    #[test]
    fn insert_import_after_last_import() {
        let source = "package a;\n\nimport java.util.List;\nimport java.util.Map;\n\nclass A {}\n";
        insta::assert_snapshot!(insert_import(source, "org.x.Lorem").unwrap(), @r"
        package a;

        import java.util.List;
        import java.util.Map;
        import org.x.Lorem;

        class A {}
        ");
    }

    #[test]
    fn insert_import_after_package_when_no_imports() {
        let source = "package a;\n\nclass A {}\n";
        assert_eq!(
            insert_import(source, "org.x.Lorem").unwrap(),
            "package a;\nimport org.x.Lorem;\n\nclass A {}\n"
        );
    }

    #[test]
    fn insert_import_keeps_crlf_line_endings() {
        let source = "package a;\r\nimport x.Y;\r\n\r\nclass A {}\r\n";
        assert_eq!(
            insert_import(source, "org.Lorem").unwrap(),
            "package a;\r\nimport x.Y;\r\nimport org.Lorem;\r\n\r\nclass A {}\r\n"
        );
    }

    #[test]
    fn insert_import_without_anchor() {
        assert_eq!(insert_import("class A {}\n", "org.x.Lorem"), None);
    }

    #[test]
    fn has_import_ignores_wildcards_and_prefixes() {
        let source = "import org.x.*;\nimport org.x.LoremIpsum;\n";
        assert!(!has_import(source, "org.x.Lorem"));
        assert!(has_import("import org.x.Lorem;\n", "org.x.Lorem"));
    }

    #[test]
    fn direct_usages_are_replaced_everywhere() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a/A.java", "package a;\nimport com.foo.Bar;\n");
        let b = write(
            dir.path(),
            "b/B.java",
            "package b;\nclass B { com.foo.Bar x; com.foo.BarBaz y; }\n",
        );
        let tools = NativeTools::default();

        let summary =
            migrate_direct_usages("com.foo.Bar", "org.new.Bar", dir.path(), &tools).unwrap();

        assert_eq!(summary.files_modified, 2);
        assert_eq!(summary.substitutions, 2);
        assert_eq!(read(&a), "package a;\nimport org.new.Bar;\n");
        assert_eq!(read(&b), "package b;\nclass B { org.new.Bar x; com.foo.BarBaz y; }\n");
    }

    #[test]
    fn wildcard_import_at_broader_scope() {
        let dir = TempDir::new().unwrap();
        let user = write(
            dir.path(),
            "User.java",
            concat!(
                "package z;\n\nimport com.foo.*;\n\n",
                "class User { bar.MyClass c = new bar.MyClass(); }\n",
            ),
        );
        let other = write(
            dir.path(),
            "Other.java",
            "package z;\n\nclass Other { bar.MyClass c; }\n",
        );
        let tools = NativeTools::default();
        let pattern = UsagePattern::new("bar.MyClass").unwrap();

        let summary =
            migrate_wildcard_imports("com.foo", &pattern, "org.MyClass", dir.path(), &tools)
                .unwrap();

        assert_eq!(summary.substitutions, 2);
        assert_eq!(
            read(&user),
            "package z;\n\nimport com.foo.*;\n\nclass User { org.MyClass c = new org.MyClass(); }\n"
        );
        assert_eq!(read(&other), "package z;\n\nclass Other { bar.MyClass c; }\n");
    }

    #[test]
    fn relative_usage_gets_replaced_and_imported() {
        let dir = TempDir::new().unwrap();
        let decl = write(
            dir.path(),
            "com/foo/bar/MyClass.java",
            "package com.foo.bar;\nclass MyClass {}\n",
        );
        let user = write(
            dir.path(),
            "com/foo/Sibling.java",
            "package com.foo;\n\nimport java.util.List;\n\nclass Sibling { bar.MyClass c; }\n",
        );
        let tools = NativeTools::default();
        let pattern = UsagePattern::new("bar.MyClass").unwrap();

        let summary =
            migrate_relative_usages("com.foo", &pattern, "org.MyClass", &decl, dir.path(), &tools)
                .unwrap();

        assert_eq!(summary.files_modified, 1);
        assert_eq!(summary.imports_added, 1);
        assert_eq!(
            read(&user),
            concat!(
                "package com.foo;\n\nimport java.util.List;\nimport org.MyClass;\n\n",
                "class Sibling { org.MyClass c; }\n",
            )
        );
    }

    #[test]
    fn relative_usage_skips_declaration_and_existing_import() {
        let dir = TempDir::new().unwrap();
        let decl = write(
            dir.path(),
            "Lorem.java",
            "package p;\npublic class Lorem { Lorem() {} }\n",
        );
        let user = write(
            dir.path(),
            "User.java",
            "package p;\nimport org.Lorem;\nclass User { Lorem l; }\n",
        );
        let tools = NativeTools::default();
        let pattern = UsagePattern::new("Lorem").unwrap();

        let summary =
            migrate_relative_usages("p", &pattern, "org.Lorem", &decl, dir.path(), &tools).unwrap();

        assert_eq!(summary.imports_added, 0);
        assert_eq!(read(&decl), "package p;\npublic class Lorem { Lorem() {} }\n");
        assert_eq!(read(&user), "package p;\nimport org.Lorem;\nclass User { org.Lorem l; }\n");
    }

    #[test]
    fn cascade_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let decl = write(
            dir.path(),
            "com/foo/bar/MyClass.java",
            "package com.foo.bar;\nclass MyClass {}\n",
        );
        write(
            dir.path(),
            "com/foo/bar/Peer.java",
            "package com.foo.bar;\n\nclass Peer { MyClass m; }\n",
        );
        write(dir.path(), "com/foo/Up.java", "package com.foo;\n\nclass Up { bar.MyClass m; }\n");
        write(
            dir.path(),
            "x/Wild.java",
            "package x;\n\nimport com.*;\n\nclass Wild { foo.bar.MyClass m; }\n",
        );
        let tools = NativeTools::default();

        let first = migrate_usages_at_each_level(
            "com.foo.bar",
            "MyClass",
            "org.dest.MyClass",
            &decl,
            dir.path(),
            &tools,
        )
        .unwrap();
        assert_eq!(first.files_modified, 3);

        let snapshot: Vec<String> = ["com/foo/bar/Peer.java", "com/foo/Up.java", "x/Wild.java"]
            .iter()
            .map(|p| read(&dir.path().join(p)))
            .collect();

        let second = migrate_usages_at_each_level(
            "com.foo.bar",
            "MyClass",
            "org.dest.MyClass",
            &decl,
            dir.path(),
            &tools,
        )
        .unwrap();
        assert!(second.is_empty());

        let after: Vec<String> = ["com/foo/bar/Peer.java", "com/foo/Up.java", "x/Wild.java"]
            .iter()
            .map(|p| read(&dir.path().join(p)))
            .collect();
        assert_eq!(snapshot, after);
        assert_eq!(
            after[2],
            "package x;\n\nimport com.*;\n\nclass Wild { org.dest.MyClass m; }\n"
        );
    }

    #[test]
    fn cascade_onto_a_usage_literal_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let decl = write(
            dir.path(),
            "com/foo/bar/MyClass.java",
            "package com.foo.bar;\nclass MyClass {}\n",
        );
        let up = write(
            dir.path(),
            "com/foo/Up.java",
            "package com.foo;\n\nclass Up { bar.MyClass m; }\n",
        );
        let peer = write(
            dir.path(),
            "com/foo/bar/Peer.java",
            "package com.foo.bar;\n\nclass Peer { MyClass m; }\n",
        );
        let tools = NativeTools::default();
        let run = || {
            migrate_usages_at_each_level(
                "com.foo.bar",
                "MyClass",
                "bar.MyClass",
                &decl,
                dir.path(),
                &tools,
            )
            .unwrap()
        };

        let first = run();
        assert_eq!(first.files_modified, 1);
        assert_eq!(first.imports_added, 1);
        assert_eq!(read(&up), "package com.foo;\n\nclass Up { bar.MyClass m; }\n");
        assert_eq!(
            read(&peer),
            "package com.foo.bar;\nimport bar.MyClass;\n\nclass Peer { bar.MyClass m; }\n"
        );

        let second = run();
        assert!(second.is_empty());
        assert_eq!(second.substitutions, 0);
        assert_eq!(
            read(&peer),
            "package com.foo.bar;\nimport bar.MyClass;\n\nclass Peer { bar.MyClass m; }\n"
        );
    }
}
