//! codeintel - multi-language static analysis engine.
//!
//! codeintel extracts symbols from Python, C, assembly and COBOL sources,
//! builds a call graph over them and runs a set of detectors: dead code,
//! call cycles, near-duplicate blocks, code smells, complexity and
//! maintainability metrics, and pattern-based security findings.
//!
//! # Architecture
//!
//! - `analysis`: language dispatch and per-language symbol extraction
//! - `graph`: call graph assembly, dead code and cycle detection
//! - `detect`: duplication, smells, complexity, security and the scan runner
//! - `config`: YAML configuration with per-stage thresholds
//! - `report`: output formatting (pretty, JSON)
//!
//! # Example
//!
//! ```no_run
//! use codeintel::{Runner, ScanConfig};
//!
//! let config = ScanConfig::default();
//! let report = Runner::new(&config).scan_paths(".", &["app.py".into()]);
//! println!("{} smells", report.smells.len());
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod graph;
pub mod report;

pub use analysis::{
    register_analyzers, AnalysisContext, CallEdge, FileSymbols, Language, LanguageAnalyzer,
    SourceFile, Symbol, SymbolId, SymbolKind,
};
pub use config::ScanConfig;
pub use detect::{Runner, ScanReport, Severity};
pub use error::{Result, ScanError, ScanStatus};
pub use graph::{CallGraph, CallGraphBuilder, DependencyGraph};

/// Initialize all subsystems.
///
/// Call this once at startup. Analyzer lookups also initialize lazily.
pub fn init() {
    register_analyzers();
}
