//! Cyclomatic complexity, line counting and maintainability index.
//!
//! Complexity is a text heuristic: start at 1 and add one for every
//! decision keyword or operator of the language:
//! - Python: if, elif, for, while, except, case, and, or
//! - C: if, for, while, do, case, ?, &&, ||
//! - COBOL: IF, EVALUATE, PERFORM UNTIL, AND, OR
//! - Assembly: conditional jumps, CALL, RET, LOOP

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analysis::{slice_lines, Language, SourceFile, Symbol, SymbolId, SymbolKind};

lazy_static! {
    static ref PYTHON_POINTS: Vec<(&'static str, Regex)> = keyword_table(&[
        ("if", r"\bif\b"),
        ("elif", r"\belif\b"),
        ("for", r"\bfor\b"),
        ("while", r"\bwhile\b"),
        ("except", r"\bexcept\b"),
        ("case", r"\bcase\b"),
        ("and", r"\band\b"),
        ("or", r"\bor\b"),
    ]);
    static ref PYTHON_COMPREHENSION_FILTER: Regex =
        Regex::new(r"[\[\(\{][^\n]*\bfor\b[^\n]*\bif\b[^\n]*[\]\)\}]").unwrap();
    static ref C_POINTS: Vec<(&'static str, Regex)> = keyword_table(&[
        ("if", r"\bif\b"),
        ("for", r"\bfor\b"),
        ("while", r"\bwhile\b"),
        ("do", r"\bdo\b"),
        ("case", r"\bcase\b"),
        ("ternary_?", r"\?"),
        ("logical_and_&&", r"&&"),
        ("logical_or_||", r"\|\|"),
    ]);
    // `END-IF` and `END-EVALUATE` close a decision rather than open one.
    static ref COBOL_POINTS: Vec<(&'static str, Regex)> = keyword_table(&[
        ("IF", r"(?:^|[^A-Z0-9_-])IF\b"),
        ("EVALUATE", r"(?:^|[^A-Z0-9_-])EVALUATE\b"),
        ("PERFORM_UNTIL", r"\bPERFORM\s+UNTIL\b"),
        ("AND", r"\bAND\b"),
        ("OR", r"\bOR\b"),
    ]);
    static ref ASM_JUMP: Regex = Regex::new(r"\bJ[A-Z]+\b").unwrap();
    static ref ASM_POINTS: Vec<(&'static str, Regex)> = keyword_table(&[
        ("CALL", r"\bCALL\b"),
        ("RET", r"\bRET\b"),
        ("LOOP", r"\bLOOP\b"),
    ]);
}

fn keyword_table(entries: &[(&'static str, &str)]) -> Vec<(&'static str, Regex)> {
    entries
        .iter()
        .map(|(name, pattern)| (*name, Regex::new(&format!("(?m){}", pattern)).unwrap()))
        .collect()
}

fn count_table(code: &str, table: &[(&'static str, Regex)], breakdown: &mut BTreeMap<String, u32>) -> u32 {
    let mut total = 0;
    for (name, re) in table {
        let count = re.find_iter(code).count() as u32;
        breakdown.insert((*name).to_string(), count);
        total += count;
    }
    total
}

/// Cyclomatic complexity of a code fragment; never below 1.
pub fn cyclomatic_complexity(code: &str, language: Language) -> u32 {
    cyclomatic_complexity_with_breakdown(code, language).0
}

/// Complexity plus the count of each decision point, keyed by name.
///
/// The breakdown always contains `base`. Python also reports
/// `comprehensions_for_if`, which is informational and not part of the
/// total.
pub fn cyclomatic_complexity_with_breakdown(
    code: &str,
    language: Language,
) -> (u32, BTreeMap<String, u32>) {
    let mut breakdown = BTreeMap::new();
    breakdown.insert("base".to_string(), 1);

    let points = match language {
        Language::Python => {
            let points = count_table(code, &PYTHON_POINTS, &mut breakdown);
            let filters = PYTHON_COMPREHENSION_FILTER.find_iter(code).count() as u32;
            breakdown.insert("comprehensions_for_if".to_string(), filters);
            points
        }
        Language::C => count_table(code, &C_POINTS, &mut breakdown),
        Language::Cobol => count_table(&code.to_uppercase(), &COBOL_POINTS, &mut breakdown),
        Language::Assembly => {
            let upper = code.to_uppercase();
            let jumps = ASM_JUMP
                .find_iter(&upper)
                .filter(|m| m.as_str() != "JMP")
                .count() as u32;
            breakdown.insert("Jxx".to_string(), jumps);
            jumps + count_table(&upper, &ASM_POINTS, &mut breakdown)
        }
    };

    ((1 + points).max(1), breakdown)
}

/// Code and comment line totals. Blank lines count as neither.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCounts {
    pub code: usize,
    pub comments: usize,
}

/// Count code and comment lines with a small per-language state machine.
pub fn count_lines(code: &str, language: Language) -> LineCounts {
    let mut counts = LineCounts::default();
    match language {
        Language::Python => {
            let mut in_docstring = false;
            for line in code.split('\n') {
                let stripped = line.trim();
                if stripped.is_empty() {
                    continue;
                }
                if stripped.contains("\"\"\"") || stripped.contains("'''") {
                    counts.comments += 1;
                    let closed_on_line = stripped.matches("\"\"\"").count() >= 2
                        || stripped.matches("'''").count() >= 2;
                    if !closed_on_line {
                        in_docstring = !in_docstring;
                    }
                } else if in_docstring || stripped.starts_with('#') {
                    counts.comments += 1;
                } else {
                    counts.code += 1;
                }
            }
        }
        Language::C => {
            let mut in_block = false;
            for line in code.split('\n') {
                let stripped = line.trim();
                if stripped.is_empty() {
                    continue;
                }
                if in_block {
                    counts.comments += 1;
                    if stripped.contains("*/") {
                        in_block = false;
                    }
                    continue;
                }
                if stripped.starts_with("//") {
                    counts.comments += 1;
                    continue;
                }
                match stripped.find("/*") {
                    Some(open) => {
                        if open == 0 {
                            counts.comments += 1;
                        } else {
                            counts.code += 1;
                        }
                        in_block = !stripped[open + 2..].contains("*/");
                    }
                    None => counts.code += 1,
                }
            }
        }
        Language::Cobol => {
            for line in code.split('\n') {
                let stripped = line.trim();
                if stripped.is_empty() {
                    continue;
                }
                let indicator = line.chars().nth(6);
                if matches!(indicator, Some('*') | Some('/')) || stripped.starts_with("*>") {
                    counts.comments += 1;
                } else {
                    counts.code += 1;
                }
            }
        }
        Language::Assembly => {
            for line in code.split('\n') {
                let stripped = line.trim();
                if stripped.is_empty() {
                    continue;
                }
                if stripped.starts_with(';') || stripped.starts_with('#') || stripped.starts_with("//") {
                    counts.comments += 1;
                } else {
                    counts.code += 1;
                }
            }
        }
    }
    counts
}

/// Maintainability index in `[0, 100]`, rounded to two decimals.
///
/// `171 - 5.2 ln(V) - 0.23 CC - 16.2 ln(LOC) + 50 comments/LOC`, with
/// `V = LOC ln(max(LOC, 2))`. Empty code scores 100.
pub fn maintainability_index(complexity: u32, lines_of_code: usize, comment_lines: usize) -> f64 {
    if lines_of_code == 0 {
        return 100.0;
    }
    let loc = lines_of_code as f64;
    let volume = loc * loc.max(2.0).ln();
    let mut mi = 171.0;
    mi -= 5.2 * volume.max(1.0).ln();
    mi -= 0.23 * f64::from(complexity.max(1));
    mi -= 16.2 * loc.max(1.0).ln();
    mi += 50.0 * (comment_lines as f64 / loc);
    let mi = mi.clamp(0.0, 100.0);
    (mi * 100.0).round() / 100.0
}

/// Rating band of a maintainability index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityRating {
    pub fn from_index(mi: f64) -> Self {
        if mi >= 85.0 {
            QualityRating::Excellent
        } else if mi >= 65.0 {
            QualityRating::Good
        } else if mi >= 50.0 {
            QualityRating::Fair
        } else {
            QualityRating::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityRating::Excellent => "excellent",
            QualityRating::Good => "good",
            QualityRating::Fair => "fair",
            QualityRating::Poor => "poor",
        }
    }
}

impl std::fmt::Display for QualityRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quality summary of a file or fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub cyclomatic_complexity: u32,
    pub complexity_breakdown: BTreeMap<String, u32>,
    pub maintainability_index: f64,
    pub lines_of_code: usize,
    pub comment_lines: usize,
    pub quality_rating: QualityRating,
}

pub fn analyze_code_quality(code: &str, language: Language) -> QualityMetrics {
    let (complexity, breakdown) = cyclomatic_complexity_with_breakdown(code, language);
    let lines = count_lines(code, language);
    let mi = maintainability_index(complexity, lines.code, lines.comments);
    QualityMetrics {
        cyclomatic_complexity: complexity,
        complexity_breakdown: breakdown,
        maintainability_index: mi,
        lines_of_code: lines.code,
        comment_lines: lines.comments,
        quality_rating: QualityRating::from_index(mi),
    }
}

/// Metrics of one symbol, computed over its own lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetrics {
    pub symbol_id: SymbolId,
    pub file_id: String,
    pub name: String,
    pub kind: SymbolKind,
    pub cyclomatic_complexity: u32,
    pub maintainability_index: f64,
    pub lines_of_code: usize,
    pub comment_lines: usize,
}

/// Metrics for every function, class and procedure of a file.
pub fn analyze_symbols(file: &SourceFile, symbols: &[Symbol]) -> Vec<SymbolMetrics> {
    let lines = file.lines();
    symbols
        .iter()
        .filter(|s| {
            matches!(
                s.kind,
                SymbolKind::Function | SymbolKind::Class | SymbolKind::Procedure
            )
        })
        .map(|symbol| {
            let code = slice_lines(&lines, symbol.line_start, symbol.line_end).join("\n");
            let complexity = cyclomatic_complexity(&code, file.language);
            let counts = count_lines(&code, file.language);
            SymbolMetrics {
                symbol_id: symbol.id,
                file_id: symbol.file_id.clone(),
                name: symbol.name.clone(),
                kind: symbol.kind,
                cyclomatic_complexity: complexity,
                maintainability_index: maintainability_index(complexity, counts.code, counts.comments),
                lines_of_code: counts.code,
                comment_lines: counts.comments,
            }
        })
        .collect()
}
