//! Dead code and cycle detection over a built call graph.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::CallGraph;
use crate::analysis::SymbolId;
use crate::detect::Severity;

/// Names that are reached from outside the program, compared lowercase.
static ENTRY_POINTS: phf::Set<&'static str> = phf::phf_set! {
    "main",
    "__init__",
    "__main__",
    "init",
    "setup",
    "start",
    "main-paragraph",
    "_start",
};

/// An internal function nothing calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadCode {
    pub name: String,
    pub file: Option<String>,
    pub symbol_id: Option<SymbolId>,
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    /// Number of distinct callees of the dead function.
    pub calls: usize,
    pub severity: Severity,
}

/// A cycle of mutually recursive functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    /// Node keys in call order; the last calls the first.
    pub nodes: Vec<String>,
    pub length: usize,
    pub severity: Severity,
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

fn is_entry_point(name: &str, extra: &[String]) -> bool {
    let lower = name.to_lowercase();
    ENTRY_POINTS.contains(lower.as_str()) || extra.iter().any(|e| e.to_lowercase() == lower)
}

/// Find internal nodes with no callers.
///
/// Entry points, configured extras and dunder names are exempt. A dead
/// function that calls nothing is `high`, one that still calls others is
/// `medium`. Results are ordered by severity, highest first; ties keep
/// graph order.
pub fn find_dead_code(graph: &CallGraph, extra_entry_points: &[String]) -> Vec<DeadCode> {
    let mut dead: Vec<DeadCode> = graph
        .nodes
        .values()
        .filter(|node| {
            node.called_by.is_empty()
                && !node.is_external
                && !is_entry_point(&node.name, extra_entry_points)
                && !is_dunder(&node.name)
        })
        .map(|node| DeadCode {
            name: node.name.clone(),
            file: node.file.clone(),
            symbol_id: node.symbol_id,
            line_start: node.line_start,
            line_end: node.line_end,
            calls: node.calls.len(),
            severity: if node.calls.is_empty() {
                Severity::High
            } else {
                Severity::Medium
            },
        })
        .collect();

    dead.sort_by(|a, b| b.severity.cmp(&a.severity));
    tracing::debug!(count = dead.len(), "dead code detected");
    dead
}

fn cycle_severity(edges: usize) -> Severity {
    match edges {
        0..=2 => Severity::High,
        3..=4 => Severity::Medium,
        _ => Severity::Low,
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Find call cycles with an iterative depth-first search.
///
/// Each node is entered and left once over the whole traversal, so the
/// cost is linear in nodes plus edges and deep graphs cannot overflow the
/// stack. A back edge to a node on the current path reports the path from
/// that node. Self-calls are ignored; cycles with the same node set are
/// reported once. Results are ordered by length, shortest first.
pub fn find_cycles(graph: &CallGraph) -> Vec<Cycle> {
    let adjacency: Vec<Vec<usize>> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(idx, (_, node))| {
            node.calls
                .iter()
                .filter_map(|key| graph.nodes.get_index_of(key))
                .filter(|&target| target != idx)
                .collect()
        })
        .collect();

    let mut color = vec![Color::White; adjacency.len()];
    let mut seen: HashSet<Vec<usize>> = HashSet::new();
    let mut cycles = Vec::new();

    for root in 0..adjacency.len() {
        if color[root] != Color::White {
            continue;
        }

        // (node, index of the next neighbour to visit)
        let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
        let mut path: Vec<usize> = vec![root];
        let mut on_path: IndexMap<usize, usize> = IndexMap::new();
        on_path.insert(root, 0);
        color[root] = Color::Gray;

        while let Some(frame) = frames.last_mut() {
            let (node, next) = *frame;
            if next < adjacency[node].len() {
                frame.1 += 1;
                let target = adjacency[node][next];
                match color[target] {
                    Color::White => {
                        color[target] = Color::Gray;
                        on_path.insert(target, path.len());
                        path.push(target);
                        frames.push((target, 0));
                    }
                    Color::Gray => {
                        if let Some(&start) = on_path.get(&target) {
                            let members = path[start..].to_vec();
                            let mut key = members.clone();
                            key.sort_unstable();
                            if seen.insert(key) {
                                let nodes: Vec<String> = members
                                    .iter()
                                    .filter_map(|&i| graph.nodes.get_index(i).map(|(k, _)| k.clone()))
                                    .collect();
                                let length = nodes.len();
                                cycles.push(Cycle {
                                    nodes,
                                    length,
                                    severity: cycle_severity(length),
                                });
                            }
                        }
                    }
                    Color::Black => {}
                }
            } else {
                color[node] = Color::Black;
                on_path.swap_remove(&node);
                path.pop();
                frames.pop();
            }
        }
    }

    cycles.sort_by_key(|c| c.length);
    tracing::debug!(count = cycles.len(), "call cycles detected");
    cycles
}
