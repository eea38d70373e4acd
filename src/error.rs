//! Error and status types shared by the engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the engine's public entry points.
///
/// Per-file problems never abort a scan; they are logged and the file is
/// skipped. This type covers the failures a caller has to act on.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    ConfigSyntax(#[from] serde_yaml::Error),
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },
    #[error("no analyzer registered for {0}")]
    UnsupportedLanguage(String),
    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Independent analyzer stages of a full scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Symbols,
    CallGraph,
    Duplication,
    Smells,
    Complexity,
    Security,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Symbols => "symbols",
            Stage::CallGraph => "call_graph",
            Stage::Duplication => "duplication",
            Stage::Smells => "smells",
            Stage::Complexity => "complexity",
            Stage::Security => "security",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Repository-level outcome of a scan.
///
/// `NoFiles` and `NoSourceCode` are ordinary results, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    #[default]
    Completed,
    /// No supported files were found.
    NoFiles,
    /// Files were found but none had readable, non-empty content.
    NoSourceCode,
    /// A cancellation signal was observed between files or stages.
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Completed => "completed",
            ScanStatus::NoFiles => "no_files",
            ScanStatus::NoSourceCode => "no_source_code",
            ScanStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure recorded for one stage while the rest of the scan proceeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl From<&ScanError> for StageError {
    fn from(err: &ScanError) -> Self {
        match err {
            ScanError::Stage { stage, message } => StageError {
                stage: *stage,
                message: message.clone(),
            },
            other => StageError {
                stage: Stage::Symbols,
                message: other.to_string(),
            },
        }
    }
}
