//! Migration ordering.
//!
//! Symbols must be migrated after everything they reference, otherwise the
//! later rewrite passes see half-moved code. The planner produces a
//! topological order over the dependency graph. Cycles are broken greedily:
//! find one, drop the dependency of its second node on its first, start over.
//! This does not minimise the number of dropped edges, but every round removes
//! one edge, so it terminates after at most |E| rounds.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Symbol name to the names it references.
///
/// Self references are dropped on insertion. Referenced names without an
/// entry of their own are still nodes of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

/// A dependency that was ignored to break a cycle: `dependent` was ordered as
/// if it did not reference `dependency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenEdge {
    pub dependent: String,
    pub dependency: String,
}

/// Output of [`plan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    /// Every node of the graph, each after all of its remaining dependencies.
    pub order: Vec<String>,
    /// Dependencies ignored to make the order possible, in the order they were cut.
    pub broken: Vec<BrokenEdge>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `name` as a node with no dependencies if it is not already present.
    pub fn add_node(&mut self, name: impl Into<String>) {
        self.edges.entry(name.into()).or_default();
    }

    /// Records that `dependent` references `dependency`.
    ///
    /// Returns `false` (and records nothing) for a self reference.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) -> bool {
        self.add_node(dependent);
        if dependent == dependency {
            log::warn!("`{}` references itself.", dependent);
            return false;
        }
        self.edges
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());
        true
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(name)
            .into_iter()
            .flat_map(|deps| deps.iter().map(String::as_str))
    }

    /// All nodes, including referenced-only ones, sorted.
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .flat_map(|(name, deps)| {
                std::iter::once(name.as_str()).chain(deps.iter().map(String::as_str))
            })
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    fn remove_dependency(&mut self, dependent: &str, dependency: &str) -> bool {
        self.edges
            .get_mut(dependent)
            .is_some_and(|deps| deps.remove(dependency))
    }
}

impl<K, V, I> FromIterator<(K, I)> for DependencyGraph
where
    K: Into<String>,
    V: AsRef<str>,
    I: IntoIterator<Item = V>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut graph = DependencyGraph::new();
        for (name, deps) in iter {
            let name = name.into();
            graph.add_node(name.clone());
            for dep in deps {
                graph.add_dependency(&name, dep.as_ref());
            }
        }
        graph
    }
}

/// Orders every node of `graph` so dependencies come first, breaking cycles.
pub fn plan(graph: &DependencyGraph) -> MigrationPlan {
    let mut graph = graph.clone();
    let mut broken = Vec::new();

    loop {
        match topological_order(&graph) {
            Ok(order) => return MigrationPlan { order, broken },
            Err(cycle) => {
                // `cycle[1]` depends on `cycle[0]`.
                let dependency = &cycle[0];
                let dependent = &cycle[1];
                log::warn!(
                    "Cycle detected: {}. Breaking it by dropping `{}` as a dependency of `{}`.",
                    cycle.join(" -> "),
                    dependency,
                    dependent
                );
                if !graph.remove_dependency(dependent, dependency) {
                    // Cannot happen for a cycle found in `graph`; bail out
                    // instead of spinning.
                    log::error!("Failed to remove `{}` -> `{}`.", dependent, dependency);
                    return MigrationPlan {
                        order: graph.nodes().into_iter().map(str::to_string).collect(),
                        broken,
                    };
                }
                broken.push(BrokenEdge {
                    dependent: dependent.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
}

/// Kahn's algorithm with a sorted ready set.
///
/// On failure returns a cycle as a node sequence that starts and ends with the
/// same node, in which each node is a dependency of the next.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<String>, Vec<String>> {
    let nodes = graph.nodes();
    let mut pending: BTreeMap<&str, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for &node in &nodes {
        for dep in graph.dependencies(node) {
            *pending.entry(node).or_default() += 1;
            dependents.entry(dep).or_default().push(node);
        }
    }

    let mut ready: BTreeSet<&str> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(node) = ready.pop_first() {
        order.push(node.to_string());
        for dependent in dependents.get(node).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }

    let remaining: BTreeSet<&str> = pending
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(node, _)| node)
        .collect();
    Err(find_cycle(graph, &remaining))
}

/// Walks dependencies inside `remaining` until a node repeats.
///
/// Every node left over by Kahn's algorithm still has a dependency inside the
/// left-over set, so the walk can always continue and must close a loop.
fn find_cycle(graph: &DependencyGraph, remaining: &BTreeSet<&str>) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut position: BTreeMap<&str, usize> = BTreeMap::new();
    let mut current = remaining.first().copied();

    while let Some(node) = current {
        if let Some(&start) = position.get(node) {
            // `path[start..]` runs dependent -> dependency; flip it so each
            // node is followed by one of its dependents.
            let mut cycle: Vec<String> =
                path[start..].iter().rev().map(|s| s.to_string()).collect();
            cycle.push(cycle[0].clone());
            return cycle;
        }
        position.insert(node, path.len());
        path.push(node);
        current = graph.dependencies(node).find(|dep| remaining.contains(dep));
    }

    path.iter().map(|s| s.to_string()).collect()
}
