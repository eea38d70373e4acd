//! Fact structures extracted from source files.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Languages the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    C,
    Assembly,
    Cobol,
}

impl Language {
    pub const ALL: [Language; 4] = [
        Language::Python,
        Language::C,
        Language::Assembly,
        Language::Cobol,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::C => "c",
            Language::Assembly => "assembly",
            Language::Cobol => "cobol",
        }
    }

    /// Map a file extension (without dot, any case) to a language.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "c" | "h" => Some(Language::C),
            "asm" | "s" => Some(Language::Assembly),
            "cbl" | "cob" | "cpy" => Some(Language::Cobol),
            _ => None,
        }
    }

    /// Detect the language of a path from its suffix.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "c" => Ok(Language::C),
            "assembly" | "asm" => Ok(Language::Assembly),
            "cobol" => Ok(Language::Cobol),
            other => Err(format!("unknown language: {}", other)),
        }
    }
}

/// A file handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Repository-relative path; doubles as the file id.
    pub path: String,
    pub language: Language,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            content: content.into(),
        }
    }

    /// Build a descriptor, detecting the language from the path.
    ///
    /// Returns `None` for unsupported extensions.
    pub fn detect(path: impl Into<String>, content: impl Into<String>) -> Option<Self> {
        let path = path.into();
        let language = Language::from_path(Path::new(&path))?;
        Some(Self::new(path, language, content))
    }

    pub fn lines(&self) -> Vec<&str> {
        self.content.split('\n').collect()
    }

    /// Text of the 1-indexed inclusive line range, clamped to the file.
    pub fn line_range(&self, start: usize, end: usize) -> String {
        let lines = self.lines();
        slice_lines(&lines, start, end).join("\n")
    }
}

/// Clamp a 1-indexed inclusive range to `lines`.
pub(crate) fn slice_lines<'a, 'b>(lines: &'b [&'a str], start: usize, end: usize) -> &'b [&'a str] {
    let lo = start.saturating_sub(1).min(lines.len());
    let hi = end.min(lines.len()).max(lo);
    &lines[lo..hi]
}

/// Stable symbol identifier.
///
/// Derived from the file, kind, name and starting line so that re-scanning
/// unchanged input yields the same ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolId(pub u64);

impl SymbolId {
    pub fn derive(file_id: &str, kind: SymbolKind, name: &str, line_start: usize) -> Self {
        let key = format!("{}\0{}\0{}\0{}", file_id, kind.as_str(), name, line_start);
        SymbolId(xxh3_64(key.as_bytes()))
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Kind of symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Variable,
    Procedure,
    Label,
    Program,
    Struct,
    Enum,
    Typedef,
    Section,
    Global,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Variable => "variable",
            SymbolKind::Procedure => "procedure",
            SymbolKind::Label => "label",
            SymbolKind::Program => "program",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Typedef => "typedef",
            SymbolKind::Section => "section",
            SymbolKind::Global => "global",
        }
    }

    /// Symbols that can be the target of a call or `PERFORM`.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function | SymbolKind::Procedure | SymbolKind::Label
        )
    }

    /// Symbols whose span may enclose other symbols.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            SymbolKind::Function
                | SymbolKind::Class
                | SymbolKind::Procedure
                | SymbolKind::Program
                | SymbolKind::Struct
                | SymbolKind::Enum
                | SymbolKind::Section
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A declared symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub file_id: String,
    pub name: String,
    pub kind: SymbolKind,
    /// First line (1-indexed).
    pub line_start: usize,
    /// Last line (1-indexed, inclusive).
    pub line_end: usize,
    pub signature: String,
    /// Innermost enclosing container, `None` at top level.
    pub parent: Option<SymbolId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
}

impl Symbol {
    pub fn new(
        file_id: &str,
        name: impl Into<String>,
        kind: SymbolKind,
        line_start: usize,
        line_end: usize,
        signature: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id: SymbolId::derive(file_id, kind, &name, line_start),
            file_id: file_id.to_string(),
            name,
            kind,
            line_start,
            line_end: line_end.max(line_start),
            signature: signature.into(),
            parent: None,
            docstring: None,
        }
    }

    /// Number of lines spanned beyond the first (`line_end - line_start`).
    pub fn span_lines(&self) -> usize {
        self.line_end - self.line_start
    }

    pub fn contains(&self, other: &Symbol) -> bool {
        self.line_start <= other.line_start
            && other.line_end <= self.line_end
            && (self.line_start, self.line_end) != (other.line_start, other.line_end)
    }
}

/// Order symbols canonically and link each one to its innermost container.
///
/// Ordering is by start line, then the wider span first, then name, so a
/// container always precedes what it encloses.
pub fn finalize_symbols(symbols: &mut Vec<Symbol>) {
    symbols.sort_by(|a, b| {
        a.line_start
            .cmp(&b.line_start)
            .then(b.line_end.cmp(&a.line_end))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.kind.as_str().cmp(b.kind.as_str()))
    });
    symbols.dedup_by(|a, b| a.id == b.id);

    // Stack of open containers, outermost first.
    let mut open: Vec<usize> = Vec::new();
    for i in 0..symbols.len() {
        while let Some(&top) = open.last() {
            if symbols[top].contains(&symbols[i]) {
                break;
            }
            open.pop();
        }
        symbols[i].parent = open.last().map(|&top| symbols[top].id);
        if symbols[i].kind.is_container() {
            open.push(i);
        }
    }
}

/// A single call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller_name: String,
    pub caller_file: String,
    pub caller_symbol_id: Option<SymbolId>,
    pub callee_name: String,
    /// Set only when the callee resolves within the caller's file.
    pub callee_file: Option<String>,
    pub callee_symbol_id: Option<SymbolId>,
    pub line: usize,
    pub is_external: bool,
}

impl CallEdge {
    /// Build an edge, resolving the callee against the caller's own file.
    pub fn resolve(caller: &Symbol, callee_name: &str, line: usize, local: &[Symbol]) -> Self {
        let target = local
            .iter()
            .rev()
            .find(|s| s.kind.is_callable() && s.name == callee_name);
        Self {
            caller_name: caller.name.clone(),
            caller_file: caller.file_id.clone(),
            caller_symbol_id: Some(caller.id),
            callee_name: target
                .map(|s| s.name.clone())
                .unwrap_or_else(|| callee_name.to_string()),
            callee_file: target.map(|s| s.file_id.clone()),
            callee_symbol_id: target.map(|s| s.id),
            line,
            is_external: target.is_none(),
        }
    }

    /// An edge whose callee is never resolved locally.
    pub fn external(caller: &Symbol, callee_name: &str, line: usize) -> Self {
        Self {
            caller_name: caller.name.clone(),
            caller_file: caller.file_id.clone(),
            caller_symbol_id: Some(caller.id),
            callee_name: callee_name.to_string(),
            callee_file: None,
            callee_symbol_id: None,
            line,
            is_external: true,
        }
    }
}

/// Kind of file-level dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Import,
    SystemInclude,
    LocalInclude,
    Include,
    Copybook,
}

/// An import, include or copybook reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub file_id: String,
    pub target: String,
    pub kind: DependencyKind,
    pub line: usize,
}
