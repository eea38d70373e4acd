//! Per-language symbol and call-site extraction.
//!
//! This module provides a language-agnostic interface for extracting facts
//! from source code. Facts include:
//! - Declared symbols with spans, signatures, parents and docstrings
//! - Call sites attributed to the enclosing function or procedure
//! - Imports, includes and copybooks
//! - Token streams for duplication detection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ SourceFile      │────▶│ Analyzers    │────▶│ FileSymbols   │
//! └─────────────────┘     │ (Python, C,  │     │ (Symbols,     │
//!                         │  asm, COBOL) │     │  CallEdges)   │
//!                         └──────────────┘     └───────────────┘
//!                                                      │
//!                                                      ▼
//!                         ┌──────────────┐     ┌───────────────┐
//!                         │ Graph and    │◀────│AnalysisContext│
//!                         │ detectors    │     │ (batch, skip) │
//!                         └──────────────┘     └───────────────┘
//! ```
//!
//! Python and C are parsed with tree-sitter; assembly and COBOL are line
//! based.
//!
//! # Adding a New Language
//!
//! 1. Add a variant to `Language` and its extensions to `Language::from_extension`
//! 2. Create a new module in `src/analysis/languages/`
//! 3. Implement the `LanguageAnalyzer` trait
//! 4. Register the analyzer in `languages/mod.rs`

mod context;
mod facts;
mod languages;
pub mod streaming;
mod traits;

pub use context::{AnalysisContext, FileSymbols};
pub use facts::{
    finalize_symbols, CallEdge, Dependency, DependencyKind, Language, SourceFile, Symbol,
    SymbolId, SymbolKind,
};
pub(crate) use facts::slice_lines;
pub use languages::{
    get_analyzer, get_analyzer_for, register_analyzers, registered_extensions,
    registered_languages, AssemblyAnalyzer, CAnalyzer, CobolAnalyzer, PythonAnalyzer,
};
pub use streaming::{should_stream, SymbolStream};
pub use traits::{LanguageAnalyzer, ParsedFile};
