//! Call graph and file dependency graph construction, plus analytics.
//!
//! Nodes are keyed by bare name unless `NodeKeying::FileQualified` is
//! configured, in which case functions declared in different files stay
//! separate.

mod analytics;
mod callgraph;
mod dependencies;

pub use analytics::{find_cycles, find_dead_code, Cycle, DeadCode};
pub use callgraph::{CallGraph, CallGraphBuilder, GraphNode};
pub use dependencies::{DependencyGraph, FileDependencies};
