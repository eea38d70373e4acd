//! Call graph assembly from per-file symbols and call sites.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::analysis::{get_analyzer_for, CallEdge, FileSymbols, Symbol, SymbolId, SymbolKind};
use crate::config::{GraphConfig, NodeKeying};

/// A function-like node of the call graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub name: String,
    pub file: Option<String>,
    pub symbol_id: Option<SymbolId>,
    /// Declared span, known only for seeded nodes.
    pub line_start: Option<usize>,
    pub line_end: Option<usize>,
    /// Keys of the nodes this node calls, in first-seen order.
    pub calls: IndexSet<String>,
    /// Keys of the nodes calling this node, in first-seen order.
    pub called_by: IndexSet<String>,
    pub is_external: bool,
}

impl GraphNode {
    fn new(name: &str, file: Option<String>, symbol_id: Option<SymbolId>, is_external: bool) -> Self {
        Self {
            name: name.to_string(),
            file,
            symbol_id,
            line_start: None,
            line_end: None,
            calls: IndexSet::new(),
            called_by: IndexSet::new(),
            is_external,
        }
    }
}

/// Directed call graph.
///
/// Node order is insertion order, which keeps every traversal and report
/// deterministic for identical input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallGraph {
    pub nodes: IndexMap<String, GraphNode>,
    pub edges: Vec<CallEdge>,
    pub total_functions: usize,
    pub total_calls: usize,
    #[serde(skip)]
    keying: NodeKeying,
}

impl CallGraph {
    pub fn new(keying: NodeKeying) -> Self {
        Self {
            keying,
            ..Default::default()
        }
    }

    /// Key of an internal node under the configured keying.
    pub fn node_key(&self, name: &str, file: Option<&str>) -> String {
        match (self.keying, file) {
            (NodeKeying::FileQualified, Some(file)) => format!("{}::{}", file, name),
            _ => name.to_string(),
        }
    }

    /// Add a declared function or procedure as a node.
    ///
    /// A node created earlier from an unresolved call under the same key
    /// becomes internal.
    pub fn add_symbol(&mut self, symbol: &Symbol) {
        let key = self.node_key(&symbol.name, Some(&symbol.file_id));
        match self.nodes.get_mut(&key) {
            Some(node) => {
                if node.is_external {
                    node.is_external = false;
                    node.file = Some(symbol.file_id.clone());
                    node.symbol_id = Some(symbol.id);
                    node.line_start = Some(symbol.line_start);
                    node.line_end = Some(symbol.line_end);
                }
            }
            None => {
                let mut node = GraphNode::new(
                    &symbol.name,
                    Some(symbol.file_id.clone()),
                    Some(symbol.id),
                    false,
                );
                node.line_start = Some(symbol.line_start);
                node.line_end = Some(symbol.line_end);
                self.nodes.insert(key, node);
            }
        }
        self.total_functions = self.nodes.len();
    }

    /// Record a call site, creating either endpoint on first sight.
    pub fn add_edge(&mut self, edge: CallEdge) {
        let caller_key = self.node_key(&edge.caller_name, Some(&edge.caller_file));
        let callee_key = if edge.is_external {
            edge.callee_name.clone()
        } else {
            self.node_key(&edge.callee_name, edge.callee_file.as_deref())
        };

        self.nodes
            .entry(caller_key.clone())
            .or_insert_with(|| {
                GraphNode::new(
                    &edge.caller_name,
                    Some(edge.caller_file.clone()),
                    edge.caller_symbol_id,
                    false,
                )
            })
            .calls
            .insert(callee_key.clone());

        self.nodes
            .entry(callee_key)
            .or_insert_with(|| {
                GraphNode::new(
                    &edge.callee_name,
                    edge.callee_file.clone(),
                    edge.callee_symbol_id,
                    edge.is_external,
                )
            })
            .called_by
            .insert(caller_key);

        self.edges.push(edge);
        self.total_functions = self.nodes.len();
        self.total_calls = self.edges.len();
    }

    /// Look up a node by key.
    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.get(key)
    }
}

/// Builds a call graph over many files.
pub struct CallGraphBuilder<'a> {
    config: &'a GraphConfig,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(config: &'a GraphConfig) -> Self {
        Self { config }
    }

    /// Seed every declared function and procedure, then add the call sites
    /// of each file.
    ///
    /// A file whose call sites cannot be extracted is logged and contributes
    /// only its seeded nodes.
    pub fn build(&self, files: &[FileSymbols]) -> CallGraph {
        let mut graph = CallGraph::new(self.config.node_keying);

        for entry in files {
            for symbol in entry
                .symbols
                .iter()
                .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Procedure))
            {
                graph.add_symbol(symbol);
            }
        }

        for entry in files {
            let Some(analyzer) = get_analyzer_for(entry.file.language) else {
                continue;
            };
            match analyzer.extract_calls(&entry.file, &entry.symbols) {
                Ok(edges) => {
                    tracing::debug!(path = %entry.file.path, calls = edges.len(), "extracted call sites");
                    for edge in edges {
                        graph.add_edge(edge);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %entry.file.path, error = %e, "failed to extract call sites");
                }
            }
        }

        tracing::info!(
            nodes = graph.total_functions,
            edges = graph.total_calls,
            "call graph built"
        );
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Language, SourceFile};

    fn file_symbols(path: &str, language: Language, content: &str) -> FileSymbols {
        let file = SourceFile::new(path, language, content);
        let symbols = get_analyzer_for(language)
            .unwrap()
            .extract_symbols(&file)
            .unwrap();
        FileSymbols { file, symbols }
    }

    #[test]
    fn test_two_functions_one_edge() {
        let files = vec![file_symbols(
            "m.py",
            Language::Python,
            "def f1():\n    f2()\n\ndef f2():\n    return 1\n",
        )];
        let graph = CallGraphBuilder::new(&GraphConfig::default()).build(&files);

        assert_eq!(graph.total_functions, 2);
        assert_eq!(graph.total_calls, 1);
        let f1 = graph.node("f1").unwrap();
        let f2 = graph.node("f2").unwrap();
        assert!(f1.calls.contains("f2"));
        assert!(f2.called_by.contains("f1"));
        assert!(!f2.is_external);
    }

    #[test]
    fn test_unresolved_callee_is_external_node() {
        let files = vec![file_symbols(
            "m.py",
            Language::Python,
            "def run():\n    print(1)\n    print(2)\n",
        )];
        let graph = CallGraphBuilder::new(&GraphConfig::default()).build(&files);

        assert_eq!(graph.total_calls, 2);
        let print = graph.node("print").unwrap();
        assert!(print.is_external);
        assert_eq!(print.called_by.len(), 1);
        assert_eq!(graph.node("run").unwrap().calls.len(), 1);
    }

    #[test]
    fn test_bare_name_keying_merges_files() {
        let files = vec![
            file_symbols("a.py", Language::Python, "def util():\n    return 1\n"),
            file_symbols("b.py", Language::Python, "def util():\n    return 2\n"),
        ];
        let graph = CallGraphBuilder::new(&GraphConfig::default()).build(&files);
        assert_eq!(graph.total_functions, 1);

        let qualified = GraphConfig {
            node_keying: NodeKeying::FileQualified,
            ..Default::default()
        };
        let graph = CallGraphBuilder::new(&qualified).build(&files);
        assert_eq!(graph.total_functions, 2);
        assert!(graph.node("a.py::util").is_some());
        assert!(graph.node("b.py::util").is_some());
    }

    #[test]
    fn test_seeded_node_flips_external_to_internal() {
        let caller = Symbol::new("a.py", "main", SymbolKind::Function, 1, 3, "def main()");
        let callee = Symbol::new("b.py", "helper", SymbolKind::Function, 1, 2, "def helper()");

        let mut graph = CallGraph::new(NodeKeying::BareName);
        graph.add_edge(CallEdge::external(&caller, "helper", 2));
        assert!(graph.node("helper").unwrap().is_external);

        graph.add_symbol(&callee);
        let helper = graph.node("helper").unwrap();
        assert!(!helper.is_external);
        assert_eq!(helper.file.as_deref(), Some("b.py"));
        assert_eq!(helper.called_by.len(), 1);
    }
}
