//! Migration pipeline.
//!
//! Moves one symbol: rewrite direct usages, cascade through every ancestor
//! scope, touch up module descriptors, delete the old declaration. A batch runs
//! that pipeline over a [`MigrationPlan`], strictly in order, since a later
//! symbol's rewrite can depend on imports added for an earlier one.

use crate::descriptor::{self, DescriptorUpdate};
use crate::locator::SymbolRow;
use crate::planner::MigrationPlan;
use crate::rewriter::{self, RewriteSummary};
use crate::tools::TextTools;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One symbol to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRequest {
    pub symbol: String,
    /// Declaration file, relative to the repository root.
    pub path: PathBuf,
    pub old_package: String,
    pub new_package: String,
}

impl MigrationRequest {
    pub fn new(
        symbol: impl Into<String>,
        path: impl Into<PathBuf>,
        old_package: impl Into<String>,
        new_package: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            path: path.into(),
            old_package: old_package.into(),
            new_package: new_package.into(),
        }
    }

    /// Builds a request for a located symbol moving to `new_package`.
    pub fn from_row(row: &SymbolRow, new_package: &str) -> Self {
        Self::new(&row.symbol, &row.path, &row.package, new_package)
    }

    pub fn old_fqn(&self) -> String {
        format!("{}.{}", self.old_package, self.symbol)
    }

    pub fn new_fqn(&self) -> String {
        format!("{}.{}", self.new_package, self.symbol)
    }

    /// Rejects requests that would rewrite nonsense into the tree.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.symbol) {
            anyhow::bail!("`{}` is not a valid symbol name", self.symbol);
        }
        for package in [&self.old_package, &self.new_package] {
            if package.is_empty() || !package.split('.').all(is_identifier) {
                anyhow::bail!("`{}` is not a valid dotted package name", package);
            }
        }
        if self.old_package == self.new_package {
            anyhow::bail!(
                "`{}` is already in `{}`; nothing to migrate",
                self.symbol,
                self.new_package
            );
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Result of migrating one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The declaration file was already gone.
    Skipped,
    Migrated {
        direct: RewriteSummary,
        cascade: RewriteSummary,
        descriptors_updated: Vec<PathBuf>,
    },
}

/// Moves `request.symbol` from its old package to its new one under `repo_dir`.
///
/// The run is idempotent at the symbol level: if the declaration file no
/// longer exists the symbol counts as migrated and nothing is touched.
/// Descriptor updates are best effort. Deleting the declaration is the last
/// step, so an interrupted run can be repeated.
pub fn migrate(
    request: &MigrationRequest,
    repo_dir: &Path,
    descriptor: Option<&DescriptorUpdate>,
    tools: &dyn TextTools,
) -> Result<MigrationOutcome> {
    request.validate()?;

    let declaration = repo_dir.join(&request.path);
    if !declaration.is_file() {
        log::info!("`{}` is already migrated. Skipping.", request.symbol);
        return Ok(MigrationOutcome::Skipped);
    }

    let old_fqn = request.old_fqn();
    let new_fqn = request.new_fqn();
    log::info!("Migrating `{}` to `{}`.", old_fqn, new_fqn);

    let direct = rewriter::migrate_direct_usages(&old_fqn, &new_fqn, repo_dir, tools)?;
    let cascade = rewriter::migrate_usages_at_each_level(
        &request.old_package,
        &request.symbol,
        &new_fqn,
        &declaration,
        repo_dir,
        tools,
    )?;

    let descriptors_updated = match descriptor {
        Some(update) => descriptor::update_modified_modules(repo_dir, update).unwrap_or_else(|e| {
            log::error!("Failed to update module descriptors: {:#}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    std::fs::remove_file(&declaration)
        .with_context(|| format!("Failed to delete {}", declaration.display()))?;

    log::info!(
        "Migrated `{}`: {} files rewritten directly, {} through scopes, {} imports added.",
        request.symbol,
        direct.files_modified,
        cascade.files_modified,
        cascade.imports_added
    );
    Ok(MigrationOutcome::Migrated {
        direct,
        cascade,
        descriptors_updated,
    })
}

/// Per-symbol results of a batch run.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub migrated: Vec<String>,
    pub skipped: Vec<String>,
    /// Planned names with no local declaration.
    pub not_local: Vec<String>,
    /// Declined at the interactive prompt.
    pub declined: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Migrates every locally declared symbol of `plan`, in plan order.
///
/// `table` holds the located symbols; planned names missing from it are only
/// referenced and are reported, not migrated. `confirm` is asked before each
/// symbol and may decline it. Failures are recorded and the batch continues.
pub fn migrate_batch(
    plan: &MigrationPlan,
    table: &[SymbolRow],
    new_package: &str,
    repo_dir: &Path,
    descriptor: Option<&DescriptorUpdate>,
    tools: &dyn TextTools,
    mut confirm: impl FnMut(&MigrationRequest) -> Result<bool>,
) -> Result<BatchReport> {
    let rows: HashMap<&str, &SymbolRow> = table.iter().map(|r| (r.symbol.as_str(), r)).collect();
    let mut report = BatchReport::default();

    for name in &plan.order {
        let Some(row) = rows.get(name.as_str()) else {
            log::debug!("`{}` has no local declaration.", name);
            report.not_local.push(name.clone());
            continue;
        };
        let request = MigrationRequest::from_row(row, new_package);
        if !confirm(&request)? {
            report.declined.push(name.clone());
            continue;
        }
        match migrate(&request, repo_dir, descriptor, tools) {
            Ok(MigrationOutcome::Migrated { .. }) => report.migrated.push(name.clone()),
            Ok(MigrationOutcome::Skipped) => report.skipped.push(name.clone()),
            Err(e) => {
                log::error!("Failed to migrate `{}`: {:#}", name, e);
                report.failed.push((name.clone(), format!("{:#}", e)));
            }
        }
    }

    Ok(report)
}
