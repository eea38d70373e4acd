//! Core types for detection results.

use serde::{Deserialize, Serialize};

use crate::analysis::SymbolId;

/// Severity levels for findings, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// How sure a rule is that a match is a real problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// Smell categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmellKind {
    LongMethod,
    GodClass,
    FeatureEnvy,
    LargeClass,
    LongParameterList,
    DuplicateCode,
    DeadCode,
    MissingDocstring,
}

impl SmellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmellKind::LongMethod => "long_method",
            SmellKind::GodClass => "god_class",
            SmellKind::FeatureEnvy => "feature_envy",
            SmellKind::LargeClass => "large_class",
            SmellKind::LongParameterList => "long_parameter_list",
            SmellKind::DuplicateCode => "duplicate_code",
            SmellKind::DeadCode => "dead_code",
            SmellKind::MissingDocstring => "missing_docstring",
        }
    }
}

impl std::fmt::Display for SmellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive 1-indexed line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: usize,
    pub end_line: usize,
}

/// A single detected code smell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmellFinding {
    pub file_id: String,
    pub symbol_id: Option<SymbolId>,
    pub kind: SmellKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub suggestion: String,
    pub location: Location,
    pub metric_value: Option<usize>,
    pub metric_threshold: Option<usize>,
}

/// Security rule classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityClass {
    SqlInjection,
    HardcodedSecret,
    CommandInjection,
    PathTraversal,
    BufferOverflow,
    Xss,
}

impl VulnerabilityClass {
    /// Human-readable class name.
    pub fn label(&self) -> &'static str {
        match self {
            VulnerabilityClass::SqlInjection => "SQL Injection",
            VulnerabilityClass::HardcodedSecret => "Hardcoded Secret",
            VulnerabilityClass::CommandInjection => "Command Injection",
            VulnerabilityClass::PathTraversal => "Path Traversal",
            VulnerabilityClass::BufferOverflow => "Buffer Overflow",
            VulnerabilityClass::Xss => "XSS",
        }
    }
}

impl std::fmt::Display for VulnerabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single security finding on one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub kind: VulnerabilityClass,
    pub severity: Severity,
    pub line: usize,
    pub cwe_id: String,
    pub owasp_category: String,
    pub confidence: Confidence,
    pub description: String,
    pub recommendation: String,
    /// Trimmed source line; secret values are redacted.
    pub snippet: String,
}
