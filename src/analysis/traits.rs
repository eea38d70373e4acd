//! Core traits for language analysis.

use super::{CallEdge, Dependency, Language, SourceFile, Symbol};

/// Holds a parsed tree-sitter tree and associated metadata.
///
/// Kept separate from the extracted symbols so the tree can be reused for
/// several passes (symbols, then call sites) without re-parsing.
pub struct ParsedFile {
    /// The tree-sitter parse tree.
    pub tree: tree_sitter::Tree,
    /// The original source code (kept for node text extraction).
    pub source: Vec<u8>,
    /// The file path (for error reporting).
    pub path: String,
}

impl ParsedFile {
    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &str {
        node.utf8_text(&self.source).unwrap_or("")
    }
}

/// Language-specific analyzer.
///
/// Each supported language implements this once; callers obtain the
/// implementation through the registry in `languages/mod.rs` instead of
/// branching on language names.
///
/// # Thread Safety
///
/// `tree_sitter::Parser` is not `Sync`, so implementations create parsers
/// per call.
pub trait LanguageAnalyzer: Send + Sync {
    /// The language this analyzer handles.
    fn language(&self) -> Language;

    /// Returns file extensions this analyzer handles (without dot, lowercase).
    fn file_extensions(&self) -> &'static [&'static str];

    /// Extract the ordered symbol list of a file.
    ///
    /// Returns an error when the file cannot be parsed; the caller logs it
    /// and moves on. Identical input always yields an identical list.
    fn extract_symbols(&self, file: &SourceFile) -> anyhow::Result<Vec<Symbol>>;

    /// Extract call sites, attributing each to one of `symbols`.
    ///
    /// `symbols` must be the list produced by `extract_symbols` for the same
    /// file; callee resolution never looks outside it.
    fn extract_calls(&self, file: &SourceFile, symbols: &[Symbol]) -> anyhow::Result<Vec<CallEdge>>;

    /// Split code into lowercase tokens for duplication detection, with
    /// comments stripped and single-character tokens dropped.
    fn tokenize(&self, code: &str) -> Vec<String>;

    /// Sliding-window size in lines for duplication detection.
    fn min_block_lines(&self, default: usize) -> usize {
        default
    }

    /// Documentation attached to a symbol, if any.
    fn extract_docstring(&self, source: &str, symbol: &Symbol) -> Option<String>;

    /// Imports, includes and copybooks referenced by the file.
    fn extract_dependencies(&self, file: &SourceFile) -> Vec<Dependency>;

    /// Check if this analyzer handles the given file extension.
    fn handles_extension(&self, ext: &str) -> bool {
        self.file_extensions()
            .contains(&ext.to_ascii_lowercase().as_str())
    }
}

/// Keep tokens longer than one character, lowercased.
pub(crate) fn normalize_tokens<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    raw.filter(|t| t.chars().count() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Collect consecutive comment lines directly above `line_start`.
///
/// `strip` returns the comment text of a line, or `None` if the line is not
/// a comment. Used by the line-oriented languages.
pub(crate) fn leading_comment_block<F>(source: &str, line_start: usize, strip: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let lines: Vec<&str> = source.split('\n').collect();
    let mut idx = line_start.saturating_sub(1).min(lines.len());
    let mut collected = Vec::new();
    while idx > 0 {
        idx -= 1;
        match strip(lines[idx]) {
            Some(text) => collected.push(text),
            None => break,
        }
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    let joined = collected.join("\n").trim().to_string();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}
