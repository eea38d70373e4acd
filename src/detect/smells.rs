//! Code smell detection over extracted symbols.
//!
//! Every check runs on its own; a symbol can trip several of them. Graph
//! and duplication results are turned into findings through
//! `from_dead_code` and `from_duplication`.

use lazy_static::lazy_static;
use regex::Regex;

use super::duplication::Duplication;
use super::types::{Location, Severity, SmellFinding, SmellKind};
use crate::analysis::{slice_lines, SourceFile, Symbol, SymbolKind};
use crate::config::SmellConfig;
use crate::graph::DeadCode;

lazy_static! {
    static ref SELF_ACCESS: Regex = Regex::new(r"\bself\.|\bthis\.").unwrap();
    static ref ATTRIBUTE_ACCESS: Regex = Regex::new(r"\b\w+\.\w+").unwrap();
}

/// Parameter names that do not count towards a long parameter list.
static RECEIVER_PARAMS: phf::Set<&'static str> = phf::phf_set! {
    "self",
    "cls",
    "void",
};

fn finding(
    symbol: &Symbol,
    kind: SmellKind,
    severity: Severity,
    title: String,
    description: String,
    suggestion: &str,
    metric: Option<(usize, usize)>,
) -> SmellFinding {
    SmellFinding {
        file_id: symbol.file_id.clone(),
        symbol_id: Some(symbol.id),
        kind,
        severity,
        title,
        description,
        suggestion: suggestion.to_string(),
        location: Location {
            start_line: symbol.line_start,
            end_line: symbol.line_end,
        },
        metric_value: metric.map(|(value, _)| value),
        metric_threshold: metric.map(|(_, threshold)| threshold),
    }
}

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Count the parameters of a signature like `name(a, b, *rest)`.
///
/// Commas nested in brackets (function pointer parameters, defaults) do not
/// split parameters. Receivers and a lone `void` are not counted.
pub fn count_parameters(signature: &str) -> usize {
    let Some(open) = signature.find('(') else {
        return 0;
    };
    let mut depth = 0usize;
    let mut params = Vec::new();
    let mut current = String::new();
    for ch in signature[open + 1..].chars() {
        match ch {
            '(' | '[' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | ']' | '}' if depth == 0 => break,
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => params.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    params.push(current);

    params
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && !RECEIVER_PARAMS.contains(*p))
        .count()
}

/// Runs the configured smell checks.
pub struct SmellDetector<'a> {
    config: &'a SmellConfig,
}

impl<'a> SmellDetector<'a> {
    pub fn new(config: &'a SmellConfig) -> Self {
        Self { config }
    }

    /// Run every enabled check against one file's symbols.
    pub fn scan_file(&self, file: &SourceFile, symbols: &[Symbol]) -> Vec<SmellFinding> {
        let lines = file.lines();
        let mut findings = Vec::new();

        for symbol in symbols {
            match symbol.kind {
                SymbolKind::Function => {
                    findings.extend(self.check_long_method(symbol));
                    findings.extend(self.check_feature_envy(symbol, &lines));
                    if self.config.detect_long_parameter_list {
                        findings.extend(self.check_long_parameter_list(symbol));
                    }
                }
                SymbolKind::Class => {
                    let god = self.check_god_class(symbol, symbols);
                    if god.is_none() && self.config.detect_large_class {
                        findings.extend(self.check_large_class(symbol));
                    }
                    findings.extend(god);
                }
                _ => {}
            }
            if self.config.detect_missing_docstring {
                findings.extend(self.check_missing_docstring(symbol, symbols));
            }
        }

        tracing::debug!(path = %file.path, smells = findings.len(), "smell scan complete");
        findings
    }

    fn check_long_method(&self, symbol: &Symbol) -> Option<SmellFinding> {
        let threshold = self.config.long_method_lines;
        let lines = symbol.span_lines();
        if lines <= threshold {
            return None;
        }
        let severity = if lines > threshold * 2 {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(finding(
            symbol,
            SmellKind::LongMethod,
            severity,
            format!("Long Method: {}", symbol.name),
            format!(
                "Method '{}' has {} lines, exceeding the recommended maximum of {} lines.",
                symbol.name, lines, threshold
            ),
            "Consider breaking this method into smaller, more focused methods. Apply Extract Method refactoring.",
            Some((lines, threshold)),
        ))
    }

    fn check_god_class(&self, class: &Symbol, symbols: &[Symbol]) -> Option<SmellFinding> {
        let method_threshold = self.config.god_class_methods;
        let line_threshold = self.config.god_class_lines;
        let methods = symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Function && s.parent == Some(class.id))
            .count();
        let lines = class.span_lines();

        let too_many_methods = methods > method_threshold;
        let too_long = lines > line_threshold;
        if !too_many_methods && !too_long {
            return None;
        }

        let mut reasons = Vec::new();
        if too_many_methods {
            reasons.push(format!("{} methods (threshold: {})", methods, method_threshold));
        }
        if too_long {
            reasons.push(format!("{} lines (threshold: {})", lines, line_threshold));
        }
        // 1.5x the method threshold, 2x the line threshold
        let severity = if methods * 2 > method_threshold * 3 || lines > line_threshold * 2 {
            Severity::Critical
        } else {
            Severity::High
        };
        let metric = if too_many_methods {
            (methods, method_threshold)
        } else {
            (lines, line_threshold)
        };

        Some(finding(
            class,
            SmellKind::GodClass,
            severity,
            format!("God Class: {}", class.name),
            format!(
                "Class '{}' has too many responsibilities: {}.",
                class.name,
                reasons.join(", ")
            ),
            "Consider splitting this class into multiple smaller classes with single responsibilities. Apply Extract Class refactoring.",
            Some(metric),
        ))
    }

    fn check_feature_envy(&self, symbol: &Symbol, lines: &[&str]) -> Option<SmellFinding> {
        let body = slice_lines(lines, symbol.line_start, symbol.line_end).join("\n");
        let own = SELF_ACCESS.find_iter(&body).count();
        let external = ATTRIBUTE_ACCESS.find_iter(&body).count().saturating_sub(own);

        if external <= self.config.feature_envy_min_external || external <= own * 2 {
            return None;
        }
        Some(finding(
            symbol,
            SmellKind::FeatureEnvy,
            Severity::Medium,
            format!("Feature Envy: {}", symbol.name),
            format!(
                "Method '{}' accesses external data ({} times) more than its own class data ({} times).",
                symbol.name, external, own
            ),
            "Consider moving this method to the class whose data it primarily uses. Apply Move Method refactoring.",
            Some((external, own * 2)),
        ))
    }

    fn check_large_class(&self, class: &Symbol) -> Option<SmellFinding> {
        let threshold = self.config.large_class_lines;
        let lines = class.span_lines();
        if lines <= threshold {
            return None;
        }
        Some(finding(
            class,
            SmellKind::LargeClass,
            Severity::Medium,
            format!("Large Class: {}", class.name),
            format!(
                "Class '{}' has {} lines, exceeding the recommended maximum of {} lines.",
                class.name, lines, threshold
            ),
            "Consider splitting this class into smaller, cohesive classes.",
            Some((lines, threshold)),
        ))
    }

    fn check_long_parameter_list(&self, symbol: &Symbol) -> Option<SmellFinding> {
        let threshold = self.config.long_parameter_list;
        let count = count_parameters(&symbol.signature);
        if count <= threshold {
            return None;
        }
        Some(finding(
            symbol,
            SmellKind::LongParameterList,
            Severity::Medium,
            format!("Long Parameter List: {}", symbol.name),
            format!(
                "Function '{}' takes {} parameters, exceeding the recommended maximum of {}.",
                symbol.name, count, threshold
            ),
            "Consider grouping related parameters into an object. Apply Introduce Parameter Object refactoring.",
            Some((count, threshold)),
        ))
    }

    /// Public top-level functions, methods and classes must be documented.
    fn check_missing_docstring(&self, symbol: &Symbol, symbols: &[Symbol]) -> Option<SmellFinding> {
        if symbol.docstring.is_some() || is_dunder(&symbol.name) {
            return None;
        }
        let parent_kind = symbol
            .parent
            .and_then(|id| symbols.iter().find(|s| s.id == id))
            .map(|s| s.kind);

        let label = match (symbol.kind, parent_kind) {
            (SymbolKind::Class, _) => "Class",
            (SymbolKind::Function, Some(SymbolKind::Class)) => "Method",
            (SymbolKind::Function, None) if !symbol.name.starts_with('_') => "Function",
            _ => return None,
        };
        Some(finding(
            symbol,
            SmellKind::MissingDocstring,
            Severity::Low,
            format!("Missing Docstring: {}", symbol.name),
            format!("{} '{}' has no documentation.", label, symbol.name),
            "Add a docstring describing its purpose, parameters and return value.",
            None,
        ))
    }
}

/// Turn an uncalled function into a finding.
pub fn from_dead_code(dead: &DeadCode) -> SmellFinding {
    let start = dead.line_start.unwrap_or(0);
    SmellFinding {
        file_id: dead.file.clone().unwrap_or_default(),
        symbol_id: dead.symbol_id,
        kind: SmellKind::DeadCode,
        severity: dead.severity,
        title: format!("Dead Code: {}", dead.name),
        description: format!(
            "Function '{}' is never called within the analyzed code.",
            dead.name
        ),
        suggestion: "Remove the function if it is no longer used, or register it as an entry point."
            .to_string(),
        location: Location {
            start_line: start,
            end_line: dead.line_end.unwrap_or(start),
        },
        metric_value: Some(dead.calls),
        metric_threshold: None,
    }
}

/// Turn a duplicated block pair into a finding on the first block.
pub fn from_duplication(dup: &Duplication) -> SmellFinding {
    let severity = if dup.similarity >= 0.95 {
        Severity::High
    } else {
        Severity::Medium
    };
    SmellFinding {
        file_id: dup.file1_id.clone(),
        symbol_id: None,
        kind: SmellKind::DuplicateCode,
        severity,
        title: format!("Duplicate Code: {}:{}", dup.file1_id, dup.start_line1),
        description: format!(
            "Lines {}-{} are {:.0}% similar to {} lines {}-{}.",
            dup.start_line1,
            dup.end_line1,
            dup.similarity * 100.0,
            dup.file2_id,
            dup.start_line2,
            dup.end_line2
        ),
        suggestion: "Extract the shared logic into a common function or module.".to_string(),
        location: Location {
            start_line: dup.start_line1,
            end_line: dup.end_line1,
        },
        metric_value: Some(dup.duplicated_lines),
        metric_threshold: None,
    }
}
