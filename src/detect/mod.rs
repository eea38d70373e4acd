//! Detectors that consume extracted symbols and raw source.

mod complexity;
mod duplication;
mod runner;
mod security;
mod smells;
mod types;

pub use complexity::{
    analyze_code_quality, analyze_symbols, count_lines, cyclomatic_complexity,
    cyclomatic_complexity_with_breakdown, maintainability_index, LineCounts, QualityMetrics,
    QualityRating, SymbolMetrics,
};
pub use duplication::{
    minhash, signature_similarity, CodeBlock, Duplication, DuplicationDetector, NUM_BANDS,
    NUM_HASHES, ROWS_PER_BAND,
};
pub use runner::{Runner, ScanMetrics, ScanReport};
pub use security::{redact_secrets, SecurityScanner};
pub use smells::{count_parameters, from_dead_code, from_duplication, SmellDetector};
pub use types::{
    Confidence, Location, SecurityIssue, Severity, SmellFinding, SmellKind, VulnerabilityClass,
};
