//! Contract loading and dependency extraction.
//!
//! Reads an OpenAPI-style YAML contract and turns the `$ref` markers found
//! under `components.schemas` into a [`DependencyGraph`]. A reference such as
//! `#/components/schemas/Pet` names the `Pet` entry; references into other
//! documents (`common.yaml#/components/schemas/Money`) are kept verbatim.

use crate::planner::{self, DependencyGraph, MigrationPlan};
use anyhow::{Context, Result};
use serde_yml::Value;
use std::collections::BTreeSet;
use std::path::Path;

/// Key marking a reference to another entry.
pub const REFERENCE_KEY: &str = "$ref";

/// Prefix of references that point into the same document.
pub const LOCAL_SCHEMA_PREFIX: &str = "#/components/schemas/";

/// Reads and parses the YAML document at `path`.
pub fn load(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read contract {}", path.display()))?;
    serde_yml::from_str(&text)
        .with_context(|| format!("Failed to parse contract YAML {}", path.display()))
}

/// Collects every string stored under `key`, at any depth.
///
/// Non-string values under `key` cannot name a schema; they are logged and
/// skipped.
///
/// Given `{ a: { $ref: X, b: c }, d: [ { $ref: Y } ] }`, returns `{X, Y}`.
pub fn find_references(value: &Value, key: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_references(value, key, &mut found);
    found
}

fn collect_references(value: &Value, key: &str, found: &mut BTreeSet<String>) {
    match value {
        Value::Mapping(map) => {
            match map.get(key) {
                Some(Value::String(reference)) => {
                    found.insert(reference.clone());
                }
                Some(other) => log::warn!("Ignoring non-string `{}` value: {:?}", key, other),
                None => {}
            }
            for (_, child) in map {
                collect_references(child, key, found);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_references(item, key, found);
            }
        }
        Value::Tagged(tagged) => collect_references(&tagged.value, key, found),
        _ => {}
    }
}

/// The `components.schemas` mapping of a contract.
fn schemas(contract: &Value) -> Result<&serde_yml::Mapping> {
    contract
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_mapping)
        .context("Contract has no `components.schemas` mapping")
}

/// Names of the entries defined in the contract.
pub fn defined_symbols(contract: &Value) -> Result<BTreeSet<String>> {
    schemas(contract)?
        .keys()
        .map(|k| {
            k.as_str()
                .map(str::to_string)
                .with_context(|| format!("Schema name is not a string: {:?}", k))
        })
        .collect()
}

/// Builds the dependency graph of the contract's schemas.
///
/// Self references are dropped with a warning.
pub fn build_dependency_graph(contract: &Value) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();

    for (name, definition) in schemas(contract)? {
        let name = name
            .as_str()
            .with_context(|| format!("Schema name is not a string: {:?}", name))?;
        graph.add_node(name);
        for reference in find_references(definition, REFERENCE_KEY) {
            let target = reference
                .strip_prefix(LOCAL_SCHEMA_PREFIX)
                .unwrap_or(&reference);
            graph.add_dependency(name, target);
        }
    }

    Ok(graph)
}

/// Whether `name` points into another document rather than naming a local entry.
pub fn is_external_reference(name: &str) -> bool {
    name.contains(".yaml#/") || name.contains(".yml#/")
}

/// Orders the contract's symbols for migration.
///
/// References into other documents are dropped from the order. Names that are
/// referenced but not defined in this contract are kept; callers tell them
/// apart with [`defined_symbols`].
pub fn sort_symbols(path: &Path) -> Result<MigrationPlan> {
    let contract = load(path)?;
    let defined = defined_symbols(&contract)?;
    log::info!("There are {} symbols defined in the contract.", defined.len());

    let graph = build_dependency_graph(&contract)?;
    let mut plan = planner::plan(&graph);
    plan.order.retain(|name| !is_external_reference(name));

    let referenced_only = plan
        .order
        .iter()
        .filter(|name| !defined.contains(name.as_str()))
        .count();
    log::info!(
        "{} symbols to migrate; {} of them are referenced but not defined in this contract.",
        plan.order.len(),
        referenced_only
    );
    Ok(plan)
}
