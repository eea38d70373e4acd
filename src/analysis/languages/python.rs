//! Python language analyzer using tree-sitter.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

use crate::analysis::traits::normalize_tokens;
use crate::analysis::{
    finalize_symbols, CallEdge, Dependency, DependencyKind, Language, LanguageAnalyzer,
    ParsedFile, SourceFile, Symbol, SymbolKind,
};

const DECLARATION_QUERY: &str = r#"
; Function definitions (nested and decorated ones included)
(function_definition
  name: (identifier) @func_name
) @function

; Class definitions
(class_definition
  name: (identifier) @class_name
) @class
"#;

/// Every call expression; the callee shape is inspected in code.
const CALL_QUERY: &str = r#"
(call
  function: (_) @callee
) @call
"#;

/// Tree-sitter query for extracting imports.
const IMPORT_QUERY: &str = r#"
; import module
(import_statement
  name: (dotted_name) @module_name
)

; import module as alias
(import_statement
  name: (aliased_import name: (dotted_name) @module_name)
)

; from module import name
(import_from_statement
  module_name: (dotted_name) @module_name
)

; from . import name
(import_from_statement
  module_name: (relative_import) @module_name
)
"#;

lazy_static! {
    static ref LINE_COMMENT: Regex = Regex::new(r"(?m)#.*$").unwrap();
    static ref TRIPLE_QUOTED: Regex = Regex::new(r#"(?s)""".*?"""|'''.*?'''"#).unwrap();
    static ref TOKEN: Regex = Regex::new(r"\b\w+\b|[+\-*/%=<>!&|^~]|[\[\]{}();,.]").unwrap();
}

pub struct PythonAnalyzer {
    language: tree_sitter::Language,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    /// Parse, rejecting sources with syntax errors.
    fn parse(&self, path: &str, source: &str) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse Python source: {}", path))?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error_line(root).unwrap_or(1);
            anyhow::bail!("syntax error in {} near line {}", path, line);
        }

        Ok(ParsedFile {
            tree,
            source: source.as_bytes().to_vec(),
            path: path.to_string(),
        })
    }

    fn extract_declarations(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<Symbol>> {
        let query = Query::new(&self.language, DECLARATION_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut symbols = Vec::new();
        let mut seen_positions = HashSet::new();

        while let Some(m) = matches.next() {
            let mut name = String::new();
            let mut kind = SymbolKind::Function;
            let mut decl_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "func_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = SymbolKind::Function;
                    }
                    "class_name" => {
                        name = parsed.node_text(capture.node).to_string();
                        kind = SymbolKind::Class;
                    }
                    "function" | "class" => decl_node = Some(capture.node),
                    _ => {}
                }
            }

            let Some(node) = decl_node else { continue };
            if name.is_empty() || !seen_positions.insert(node.start_byte()) {
                continue;
            }

            let signature = match kind {
                SymbolKind::Class => format!("class {}", name),
                _ => format!("def {}({})", name, self.parameter_list(parsed, node).join(", ")),
            };
            let mut symbol = Symbol::new(
                &parsed.path,
                name,
                kind,
                node.start_position().row + 1,
                node.end_position().row + 1,
                signature,
            );
            symbol.docstring = self.body_docstring(parsed, node);
            symbols.push(symbol);
        }

        finalize_symbols(&mut symbols);
        Ok(symbols)
    }

    /// Positional parameter names followed by `*args` and `**kwargs`.
    /// Keyword-only parameters are left out.
    fn parameter_list(&self, parsed: &ParsedFile, func: Node) -> Vec<String> {
        let Some(params) = func.child_by_field_name("parameters") else {
            return Vec::new();
        };

        let mut names = Vec::new();
        let mut keyword_only = false;
        let mut walker = params.walk();
        for child in params.named_children(&mut walker) {
            match child.kind() {
                "identifier" if !keyword_only => names.push(parsed.node_text(child).to_string()),
                "default_parameter" | "typed_default_parameter" if !keyword_only => {
                    if let Some(n) = child.child_by_field_name("name") {
                        names.push(parsed.node_text(n).to_string());
                    }
                }
                "typed_parameter" => {
                    let Some(inner) = child.named_child(0) else { continue };
                    match inner.kind() {
                        "list_splat_pattern" => {
                            keyword_only = true;
                            names.push(parsed.node_text(inner).to_string());
                        }
                        "dictionary_splat_pattern" => names.push(parsed.node_text(inner).to_string()),
                        _ if !keyword_only => names.push(parsed.node_text(inner).to_string()),
                        _ => {}
                    }
                }
                "list_splat_pattern" => {
                    keyword_only = true;
                    names.push(parsed.node_text(child).to_string());
                }
                "dictionary_splat_pattern" => names.push(parsed.node_text(child).to_string()),
                "keyword_separator" => keyword_only = true,
                _ => {}
            }
        }
        names
    }

    /// First statement of the body when it is a bare string literal.
    fn body_docstring(&self, parsed: &ParsedFile, def: Node) -> Option<String> {
        let body = def.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let literal = first.named_child(0)?;
        if literal.kind() != "string" {
            return None;
        }

        let mut walker = literal.walk();
        let content: String = literal
            .named_children(&mut walker)
            .filter(|c| c.kind() == "string_content")
            .map(|c| parsed.node_text(c))
            .collect();
        let text = content.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    fn extract_call_sites(
        &self,
        parsed: &ParsedFile,
        symbols: &[Symbol],
    ) -> anyhow::Result<Vec<CallEdge>> {
        // Callers are matched by name and definition line.
        let functions: HashMap<(&str, usize), &Symbol> = symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Function)
            .map(|s| ((s.name.as_str(), s.line_start), s))
            .collect();

        let query = Query::new(&self.language, CALL_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut edges = Vec::new();
        while let Some(m) = matches.next() {
            let mut callee_node = None;
            let mut call_node = None;
            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "callee" => callee_node = Some(capture.node),
                    "call" => call_node = Some(capture.node),
                    _ => {}
                }
            }
            let (Some(callee_node), Some(call_node)) = (callee_node, call_node) else {
                continue;
            };

            let callee = match callee_node.kind() {
                "identifier" => parsed.node_text(callee_node),
                "attribute" => match callee_node.child_by_field_name("attribute") {
                    Some(attr) => parsed.node_text(attr),
                    None => continue,
                },
                _ => continue,
            };
            let line = call_node.start_position().row + 1;

            // A call belongs to every function it is lexically nested in.
            let mut ancestor = call_node.parent();
            while let Some(node) = ancestor {
                if node.kind() == "function_definition" {
                    let caller = node
                        .child_by_field_name("name")
                        .map(|n| parsed.node_text(n))
                        .and_then(|name| functions.get(&(name, node.start_position().row + 1)));
                    if let Some(caller) = caller {
                        if caller.name != callee {
                            edges.push(CallEdge::resolve(caller, callee, line, symbols));
                        }
                    }
                }
                ancestor = node.parent();
            }
        }

        edges.sort_by(|a, b| {
            a.line
                .cmp(&b.line)
                .then_with(|| a.caller_name.cmp(&b.caller_name))
                .then_with(|| a.callee_name.cmp(&b.callee_name))
        });
        Ok(edges)
    }

    fn extract_imports(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<Dependency>> {
        let query = Query::new(&self.language, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut imports = Vec::new();
        let mut seen = HashSet::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let target = parsed.node_text(capture.node).to_string();
                if target.is_empty() || !seen.insert(target.clone()) {
                    continue;
                }
                imports.push(Dependency {
                    file_id: parsed.path.clone(),
                    target,
                    kind: DependencyKind::Import,
                    line: capture.node.start_position().row + 1,
                });
            }
        }
        imports.sort_by_key(|d| d.line);
        Ok(imports)
    }
}

/// Line of the first ERROR or missing node, depth first.
fn first_error_line(node: Node) -> Option<usize> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position().row + 1);
    }
    let mut walker = node.walk();
    let children: Vec<Node> = node.children(&mut walker).collect();
    children
        .into_iter()
        .filter(|c| c.has_error())
        .find_map(first_error_line)
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for PythonAnalyzer {
    fn language(&self) -> Language {
        Language::Python
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn extract_symbols(&self, file: &SourceFile) -> anyhow::Result<Vec<Symbol>> {
        let parsed = self.parse(&file.path, &file.content)?;
        self.extract_declarations(&parsed)
    }

    fn extract_calls(&self, file: &SourceFile, symbols: &[Symbol]) -> anyhow::Result<Vec<CallEdge>> {
        let parsed = self.parse(&file.path, &file.content)?;
        self.extract_call_sites(&parsed, symbols)
    }

    fn tokenize(&self, code: &str) -> Vec<String> {
        let code = LINE_COMMENT.replace_all(code, "");
        let code = TRIPLE_QUOTED.replace_all(&code, "");
        normalize_tokens(TOKEN.find_iter(&code).map(|m| m.as_str()))
    }

    fn extract_docstring(&self, source: &str, symbol: &Symbol) -> Option<String> {
        let parsed = self.parse(&symbol.file_id, source).ok()?;
        self.extract_declarations(&parsed)
            .ok()?
            .into_iter()
            .find(|s| s.line_start == symbol.line_start && s.name == symbol.name)
            .and_then(|s| s.docstring)
    }

    fn extract_dependencies(&self, file: &SourceFile) -> Vec<Dependency> {
        match self
            .parse(&file.path, &file.content)
            .and_then(|parsed| self.extract_imports(&parsed))
        {
            Ok(deps) => deps,
            Err(e) => {
                tracing::debug!(path = %Path::new(&file.path).display(), error = %e, "skipping imports");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_file(source: &str) -> SourceFile {
        SourceFile::new("test.py", Language::Python, source)
    }

    #[test]
    fn test_extract_functions_and_classes() {
        let source = r#"
def simple():
    pass

def with_args(x, y=2, *args, key=None, **kwargs):
    return x + y

class MyClass:
    """A documented class."""

    def method(self):
        def inner():
            pass
        return inner
"#;
        let analyzer = PythonAnalyzer::new();
        let symbols = analyzer.extract_symbols(&python_file(source)).unwrap();

        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["simple", "with_args", "MyClass", "method", "inner"]);

        let with_args = &symbols[1];
        assert_eq!(with_args.signature, "def with_args(x, y, *args, **kwargs)");
        assert_eq!(with_args.line_start, 5);
        assert_eq!(with_args.line_end, 6);

        let class = &symbols[2];
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.signature, "class MyClass");
        assert_eq!(class.docstring.as_deref(), Some("A documented class."));

        assert_eq!(symbols[3].parent, Some(class.id));
        assert_eq!(symbols[4].parent, Some(symbols[3].id));
    }

    #[test]
    fn test_decorated_definition_uses_def_line() {
        let source = "@decorator\ndef wrapped(a):\n    return a\n";
        let analyzer = PythonAnalyzer::new();
        let symbols = analyzer.extract_symbols(&python_file(source)).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].line_start, 2);
        assert_eq!(symbols[0].signature, "def wrapped(a)");
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let analyzer = PythonAnalyzer::new();
        let result = analyzer.extract_symbols(&python_file("def broken(:\n    pass\n"));
        assert!(result.is_err());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let source = "class A:\n    def a(self):\n        pass\n\ndef b():\n    pass\n";
        let analyzer = PythonAnalyzer::new();
        let first = analyzer.extract_symbols(&python_file(source)).unwrap();
        let second = analyzer.extract_symbols(&python_file(source)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_call_sites() {
        let source = r#"
def f1():
    helper.run()
    return f2()

def f2():
    return 1
"#;
        let analyzer = PythonAnalyzer::new();
        let file = python_file(source);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let calls = analyzer.extract_calls(&file, &symbols).unwrap();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].callee_name, "run");
        assert!(calls[0].is_external);
        assert_eq!(calls[1].caller_name, "f1");
        assert_eq!(calls[1].callee_name, "f2");
        assert!(!calls[1].is_external);
        assert_eq!(calls[1].line, 4);
    }

    #[test]
    fn test_nested_calls_count_for_outer_function() {
        let source = "def outer():\n    def inner():\n        work()\n    inner()\n";
        let analyzer = PythonAnalyzer::new();
        let file = python_file(source);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let calls = analyzer.extract_calls(&file, &symbols).unwrap();

        let pairs: Vec<_> = calls
            .iter()
            .map(|c| (c.caller_name.as_str(), c.callee_name.as_str()))
            .collect();
        assert!(pairs.contains(&("outer", "work")));
        assert!(pairs.contains(&("inner", "work")));
        assert!(pairs.contains(&("outer", "inner")));
    }

    #[test]
    fn test_recursive_call_is_not_an_edge() {
        let source = "def fact(n):\n    return n * fact(n - 1)\n";
        let analyzer = PythonAnalyzer::new();
        let file = python_file(source);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        assert!(analyzer.extract_calls(&file, &symbols).unwrap().is_empty());
    }

    #[test]
    fn test_tokenize_strips_comments_and_docstrings() {
        let analyzer = PythonAnalyzer::new();
        let tokens = analyzer.tokenize("def Run(x):  # comment here\n    \"\"\"doc words\"\"\"\n    return x\n");
        assert_eq!(tokens, vec!["def", "run", "return"]);
    }

    #[test]
    fn test_extract_imports() {
        let source = "import os\nimport numpy as np\nfrom collections import OrderedDict\nfrom . import sibling\n";
        let analyzer = PythonAnalyzer::new();
        let deps = analyzer.extract_dependencies(&python_file(source));
        let targets: Vec<_> = deps.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(targets, vec!["os", "numpy", "collections", "."]);
    }
}
