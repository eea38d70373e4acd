//! C language analyzer using tree-sitter, with a regex fallback for sources
//! the grammar cannot handle (heavy macro use, non-standard extensions).

use std::collections::HashSet;

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Parser, Query, QueryCursor};

use crate::analysis::traits::normalize_tokens;
use crate::analysis::{
    finalize_symbols, CallEdge, Dependency, DependencyKind, Language, LanguageAnalyzer,
    ParsedFile, SourceFile, Symbol, SymbolKind,
};

/// Tree-sitter query for extracting C declarations.
const DECLARATION_QUERY: &str = r#"
; Function definitions
(function_definition
  declarator: (_) @func_declarator
) @function

; Struct definitions with a body
(struct_specifier
  name: (type_identifier) @struct_name
  body: (field_declaration_list)
) @struct

; Enum definitions with a body
(enum_specifier
  name: (type_identifier) @enum_name
  body: (enumerator_list)
) @enum

; Typedef definitions
(type_definition
  declarator: (_) @typedef_declarator
) @typedef
"#;

/// Tree-sitter query for extracting includes.
const IMPORT_QUERY: &str = r#"
; #include <header.h>
(preproc_include
  path: (system_lib_string) @system_include
)

; #include "header.h"
(preproc_include
  path: (string_literal) @local_include
)
"#;

/// Identifiers followed by `(` that are never calls.
static CALL_STOPLIST: phf::Set<&'static str> = phf_set! {
    "if", "while", "for", "switch", "return", "sizeof",
};

const SIGNATURE_LIMIT: usize = 100;

lazy_static! {
    static ref CALL_SITE: Regex = Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap();
    /// Function header starting at column 0: return type, name, open paren,
    /// and no terminating `;` (which would make it a prototype).
    static ref FALLBACK_HEADER: Regex =
        Regex::new(r"^[A-Za-z_][\w\*\s]*[\s\*]([A-Za-z_]\w*)\s*\([^;]*$").unwrap();
    static ref LINE_COMMENT: Regex = Regex::new(r"(?m)//.*$").unwrap();
    static ref BLOCK_COMMENT: Regex = Regex::new(r"(?s)/\*.*?\*/").unwrap();
    static ref TOKEN: Regex =
        Regex::new(r"#\w+|\b\w+\b|->|\.\.\.|[+\-*/%=<>!&|^~]|[\[\]{}();,.]").unwrap();
}

/// C language analyzer.
pub struct CAnalyzer {
    language: tree_sitter::Language,
}

impl CAnalyzer {
    pub fn new() -> Self {
        Self {
            language: tree_sitter_c::LANGUAGE.into(),
        }
    }

    fn create_parser(&self) -> anyhow::Result<Parser> {
        let mut parser = Parser::new();
        parser.set_language(&self.language)?;
        Ok(parser)
    }

    fn parse(&self, path: &str, source: &str) -> anyhow::Result<ParsedFile> {
        let mut parser = self.create_parser()?;
        let tree = parser
            .parse(source.as_bytes(), None)
            .ok_or_else(|| anyhow::anyhow!("failed to parse C source: {}", path))?;

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
            let mut name = None;
            let mut kind = SymbolKind::Function;
            let mut decl_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "func_declarator" => {
                        name = declarator_name(parsed, capture.node);
                        kind = SymbolKind::Function;
                    }
                    "struct_name" => {
                        name = Some(parsed.node_text(capture.node).to_string());
                        kind = SymbolKind::Struct;
                    }
                    "enum_name" => {
                        name = Some(parsed.node_text(capture.node).to_string());
                        kind = SymbolKind::Enum;
                    }
                    "typedef_declarator" => {
                        name = declarator_name(parsed, capture.node);
                        kind = SymbolKind::Typedef;
                    }
                    "function" | "struct" | "enum" | "typedef" => decl_node = Some(capture.node),
                    _ => {}
                }
            }

            let (Some(name), Some(node)) = (name, decl_node) else {
                continue;
            };
            if name.is_empty() || !seen_positions.insert((node.start_byte(), name.clone())) {
                continue;
            }

            let text = parsed.node_text(node);
            let signature = match kind {
                SymbolKind::Function => function_signature(text),
                SymbolKind::Struct => format!("struct {}", name),
                SymbolKind::Enum => format!("enum {}", name),
                _ => truncate_signature(&text.split_whitespace().collect::<Vec<_>>().join(" ")),
            };

            symbols.push(Symbol::new(
                &parsed.path,
                name,
                kind,
                node.start_position().row + 1,
                node.end_position().row + 1,
                signature,
            ));
        }

        Ok(symbols)
    }

    fn extract_includes(&self, parsed: &ParsedFile) -> anyhow::Result<Vec<Dependency>> {
        let query = Query::new(&self.language, IMPORT_QUERY)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, parsed.tree.root_node(), &parsed.source[..]);

        let mut includes = Vec::new();
        while let Some(m) = matches.next() {
            for capture in m.captures {
                let raw = parsed.node_text(capture.node);
                let (target, kind) = match query.capture_names()[capture.index as usize] {
                    "system_include" => (
                        raw.trim_matches(|c| c == '<' || c == '>'),
                        DependencyKind::SystemInclude,
                    ),
                    "local_include" => (raw.trim_matches('"'), DependencyKind::LocalInclude),
                    _ => continue,
                };
                includes.push(Dependency {
                    file_id: parsed.path.clone(),
                    target: target.to_string(),
                    kind,
                    line: capture.node.start_position().row + 1,
                });
            }
        }
        includes.sort_by_key(|d| d.line);
        Ok(includes)
    }
}

/// Resolve the identifier at the bottom of a declarator chain
/// (`*name`, `name(args)`, `(*name)(args)`, ...).
fn declarator_name(parsed: &ParsedFile, node: Node) -> Option<String> {
    match node.kind() {
        "identifier" | "type_identifier" | "field_identifier" => {
            Some(parsed.node_text(node).to_string())
        }
        _ => {
            let next = node
                .child_by_field_name("declarator")
                .or_else(|| node.named_child(0))?;
            declarator_name(parsed, next)
        }
    }
}

/// First line of a definition, cut at 100 characters, with the body elided.
fn function_signature(text: &str) -> String {
    let first = text.lines().next().unwrap_or("").trim_end();
    if first.chars().count() > SIGNATURE_LIMIT {
        return format!("{}...", first.chars().take(SIGNATURE_LIMIT).collect::<String>());
    }
    let head = first.trim_end_matches('{').trim_end();
    if head.is_empty() {
        String::new()
    } else {
        format!("{} {{...}}", head)
    }
}

fn truncate_signature(text: &str) -> String {
    if text.chars().count() > SIGNATURE_LIMIT {
        format!("{}...", text.chars().take(SIGNATURE_LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Blank out comments and the contents of string and character literals,
/// keeping line structure intact.
pub(crate) fn mask_comments_and_strings(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        LineComment,
        BlockComment,
        Literal(char),
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match state {
            State::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    out.push_str("  ");
                    state = State::BlockComment;
                }
                '"' | '\'' => {
                    out.push(c);
                    state = State::Literal(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("  ");
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::Literal(quote) => {
                if c == '\\' {
                    out.push(' ');
                    if let Some(escaped) = chars.next() {
                        out.push(if escaped == '\n' { '\n' } else { ' ' });
                    }
                } else if c == quote {
                    out.push(c);
                    state = State::Code;
                } else if c == '\n' {
                    // Unterminated literal; resynchronise at end of line.
                    out.push('\n');
                    state = State::Code;
                } else {
                    out.push(' ');
                }
            }
        }
    }
    out
}

/// Regex fallback: column-0 function headers with brace-matched bodies.
fn fallback_functions(path: &str, source: &str) -> Vec<Symbol> {
    let masked = mask_comments_and_strings(source);
    let lines: Vec<&str> = masked.split('\n').collect();
    let original: Vec<&str> = source.split('\n').collect();
    let mut symbols = Vec::new();

    let mut idx = 0;
    while idx < lines.len() {
        let Some(caps) = FALLBACK_HEADER.captures(lines[idx]) else {
            idx += 1;
            continue;
        };
        let name = &caps[1];
        if CALL_STOPLIST.contains(name) {
            idx += 1;
            continue;
        }

        // The opening brace may sit on the header line or up to two lines below.
        let Some(open) = (idx..lines.len().min(idx + 3)).find(|&i| lines[i].contains('{')) else {
            idx += 1;
            continue;
        };
        if (idx + 1..open).any(|i| lines[i].contains(';')) {
            idx += 1;
            continue;
        }

        let mut depth = 0i64;
        let mut end = None;
        'scan: for (i, line) in lines.iter().enumerate().skip(open) {
            for ch in line.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            end = Some(i);
                            break 'scan;
                        }
                    }
                    _ => {}
                }
            }
        }
        let end = end.unwrap_or(lines.len() - 1);

        symbols.push(Symbol::new(
            path,
            name,
            SymbolKind::Function,
            idx + 1,
            end + 1,
            function_signature(original.get(idx).copied().unwrap_or("")),
        ));
        idx = end + 1;
    }
    symbols
}

impl Default for CAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageAnalyzer for CAnalyzer {
    fn language(&self) -> Language {
        Language::C
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["c", "h"]
    }

    fn extract_symbols(&self, file: &SourceFile) -> anyhow::Result<Vec<Symbol>> {
        let parsed = self.parse(&file.path, &file.content)?;
        let mut symbols = if parsed.tree.root_node().has_error() {
            tracing::debug!(path = %file.path, "grammar errors, using regex fallback");
            fallback_functions(&file.path, &file.content)
        } else {
            self.extract_declarations(&parsed)?
        };

        for symbol in symbols.iter_mut() {
            symbol.docstring = self.extract_docstring(&file.content, symbol);
        }
        finalize_symbols(&mut symbols);
        Ok(symbols)
    }

    fn extract_calls(&self, file: &SourceFile, symbols: &[Symbol]) -> anyhow::Result<Vec<CallEdge>> {
        let masked = mask_comments_and_strings(&file.content);
        let lines: Vec<&str> = masked.split('\n').collect();
        let mut edges = Vec::new();

        for caller in symbols.iter().filter(|s| s.kind == SymbolKind::Function) {
            let body = crate::analysis::slice_lines(&lines, caller.line_start, caller.line_end);
            for (offset, line) in body.iter().enumerate() {
                for caps in CALL_SITE.captures_iter(line) {
                    let callee = &caps[1];
                    if CALL_STOPLIST.contains(callee) || callee == caller.name {
                        continue;
                    }
                    edges.push(CallEdge::resolve(caller, callee, caller.line_start + offset, symbols));
                }
            }
        }
        Ok(edges)
    }

    fn tokenize(&self, code: &str) -> Vec<String> {
        let code = LINE_COMMENT.replace_all(code, "");
        let code = BLOCK_COMMENT.replace_all(&code, "");
        normalize_tokens(TOKEN.find_iter(&code).map(|m| m.as_str()))
    }

    /// A `/** ... */` block whose closing line sits within ten lines above
    /// the symbol, separated from it only by blank lines.
    fn extract_docstring(&self, source: &str, symbol: &Symbol) -> Option<String> {
        let lines: Vec<&str> = source.lines().collect();
        if symbol.line_start == 0 || symbol.line_start > lines.len() {
            return None;
        }

        let floor = symbol.line_start.saturating_sub(11);
        let mut parts: Vec<String> = Vec::new();
        let mut in_block = false;
        let mut i = symbol.line_start - 1;
        while i > floor {
            i -= 1;
            let mut line = lines[i].trim();
            if !in_block {
                if line.is_empty() {
                    continue;
                }
                if !line.ends_with("*/") {
                    break;
                }
                in_block = true;
                line = line[..line.len() - 2].trim();
                if line.starts_with("/**") {
                    push_front(&mut parts, &line[3..]);
                    return join_doc(parts);
                }
                push_front(&mut parts, line.trim_start_matches('*'));
                continue;
            }
            if let Some(rest) = line.strip_prefix("/**") {
                push_front(&mut parts, rest);
                return join_doc(parts);
            }
            if line.starts_with("/*") {
                // A plain block comment, not documentation.
                return None;
            }
            push_front(&mut parts, line.trim_start_matches('*'));
        }
        None
    }

    fn extract_dependencies(&self, file: &SourceFile) -> Vec<Dependency> {
        match self
            .parse(&file.path, &file.content)
            .and_then(|parsed| self.extract_includes(&parsed))
        {
            Ok(deps) => deps,
            Err(e) => {
                tracing::debug!(path = %file.path, error = %e, "skipping includes");
                Vec::new()
            }
        }
    }
}

fn push_front(parts: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        parts.insert(0, text.to_string());
    }
}

fn join_doc(parts: Vec<String>) -> Option<String> {
    let joined = parts.join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
