//! Output formatting for scan reports.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: the full `ScanReport` plus a summary block, for programmatic use

use std::collections::BTreeMap;
use std::io::Write;

use colored::*;
use serde::{Deserialize, Serialize};

use crate::analysis::Symbol;
use crate::detect::{ScanReport, Severity};
use crate::error::ScanStatus;

/// Number of symbols listed in the pretty complexity section.
const TOP_COMPLEX_SYMBOLS: usize = 10;

// =============================================================================
// JSON Format
// =============================================================================

/// Finding counts of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub files_scanned: usize,
    pub symbols: usize,
    pub dead_code: usize,
    pub cycles: usize,
    pub duplications: usize,
    pub smells: usize,
    pub security_issues: usize,
    pub stage_errors: usize,
    /// Findings per severity name, covering smells, security issues and cycles.
    pub by_severity: BTreeMap<String, usize>,
    /// Mean maintainability index over scanned files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_maintainability: Option<f64>,
}

impl Summary {
    pub fn from_report(report: &ScanReport) -> Self {
        let mut by_severity = BTreeMap::new();
        for severity in report.severities() {
            *by_severity.entry(severity.as_str().to_string()).or_insert(0) += 1;
        }

        let files = &report.metrics.files;
        let average_maintainability = if files.is_empty() {
            None
        } else {
            let total: f64 = files.values().map(|m| m.maintainability_index).sum();
            Some(total / files.len() as f64)
        };

        Summary {
            files_scanned: report.files_scanned,
            symbols: report.symbol_count(),
            dead_code: report.dead_code.len(),
            cycles: report.cycles.len(),
            duplications: report.duplications.len(),
            smells: report.smells.len(),
            security_issues: report.security_issue_count(),
            stage_errors: report.stage_errors.len(),
            by_severity,
            average_maintainability,
        }
    }
}

/// Top-level JSON document.
#[derive(Serialize)]
pub struct JsonReport<'a> {
    pub version: &'static str,
    pub path: &'a str,
    pub summary: Summary,
    #[serde(flatten)]
    pub report: &'a ScanReport,
}

/// Render a report as pretty-printed JSON.
pub fn render_json(path: &str, report: &ScanReport) -> serde_json::Result<String> {
    let doc = JsonReport {
        version: env!("CARGO_PKG_VERSION"),
        path,
        summary: Summary::from_report(report),
        report,
    };
    serde_json::to_string_pretty(&doc)
}

/// Write a report in JSON format.
pub fn write_json<W: Write>(out: &mut W, path: &str, report: &ScanReport) -> anyhow::Result<()> {
    let json = render_json(path, report)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

/// Write the symbols of one file in JSON format.
pub fn write_symbols_json<W: Write>(out: &mut W, symbols: &[Symbol]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(symbols)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write a report in pretty (human-readable) format.
pub fn write_pretty<W: Write>(out: &mut W, path: &str, report: &ScanReport) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "codeintel".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Scanning: ".dimmed(), path)?;

    let summary = Summary::from_report(report);
    write_status(out, report.status, &summary)?;
    writeln!(out)?;

    match report.status {
        ScanStatus::NoFiles => {
            writeln!(out, "  {}", "No supported source files found.".yellow())?;
            return Ok(());
        }
        ScanStatus::NoSourceCode => {
            writeln!(out, "  {}", "Files were found but none contain code.".yellow())?;
            return Ok(());
        }
        _ => {}
    }

    write_smells(out, report)?;
    write_security(out, report)?;
    write_dead_code(out, report)?;
    write_cycles(out, report)?;
    write_duplications(out, report)?;
    write_complexity(out, report)?;
    write_stage_errors(out, report)?;
    write_final_status(out, &summary)?;
    writeln!(out)
}

fn write_status<W: Write>(out: &mut W, status: ScanStatus, summary: &Summary) -> std::io::Result<()> {
    let label = match status {
        ScanStatus::Completed => "✓ COMPLETED".green(),
        ScanStatus::Cancelled => "✗ CANCELLED".red(),
        ScanStatus::NoFiles | ScanStatus::NoSourceCode => status.as_str().yellow(),
    };
    write!(out, "  {}", label)?;
    write!(
        out,
        "  Files: {}  Symbols: {}",
        summary.files_scanned, summary.symbols
    )?;
    if let Some(mi) = summary.average_maintainability {
        write!(out, "  MI: ")?;
        write_colored_mi(out, mi)?;
    }
    writeln!(out)
}

fn write_colored_mi<W: Write>(out: &mut W, mi: f64) -> std::io::Result<()> {
    let text = format!("{:.1}", mi);
    match mi {
        m if m >= 85.0 => write!(out, "{}", text.green().bold()),
        m if m >= 65.0 => write!(out, "{}", text.green()),
        m if m >= 50.0 => write!(out, "{}", text.yellow()),
        _ => write!(out, "{}", text.red()),
    }
}

fn write_severity_tag<W: Write>(out: &mut W, severity: Severity) -> std::io::Result<()> {
    match severity {
        Severity::Critical => write!(out, "    {} ", "CRIT".red().bold()),
        Severity::High => write!(out, "    {} ", "HIGH".red()),
        Severity::Medium => write!(out, "    {} ", "MED ".yellow()),
        Severity::Low => write!(out, "    {} ", "LOW ".blue()),
    }
}

fn write_location<W: Write>(out: &mut W, file: &str, line: usize) -> std::io::Result<()> {
    write!(out, "{}", file.blue())?;
    if line > 0 {
        write!(out, "{}", format!(":{}", line).dimmed())?;
    }
    Ok(())
}

fn write_smells<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    if report.smells.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {} ({}):", "Smells".bold(), report.smells.len())?;
    writeln!(out)?;

    let mut smells: Vec<_> = report.smells.iter().collect();
    smells.sort_by(|a, b| b.severity.cmp(&a.severity));
    for smell in smells {
        write_severity_tag(out, smell.severity)?;
        write!(out, "{:<20}", smell.kind.as_str().dimmed())?;
        write_location(out, &smell.file_id, smell.location.start_line)?;
        writeln!(out)?;
        writeln!(out, "            {}", smell.title)?;
        writeln!(out, "            {}", smell.suggestion.dimmed())?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_security<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    let count = report.security_issue_count();
    if count == 0 {
        return Ok(());
    }
    writeln!(out, "  {} ({}):", "Security".bold(), count)?;
    writeln!(out)?;

    for (file, issues) in &report.security_issues {
        for issue in issues {
            write_severity_tag(out, issue.severity)?;
            write!(out, "{:<20}", issue.cwe_id.dimmed())?;
            write_location(out, file, issue.line)?;
            writeln!(out)?;
            writeln!(out, "            {}", issue.description)?;
            writeln!(out, "            {}", issue.snippet.dimmed())?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn write_dead_code<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    if report.dead_code.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {} ({}):", "Dead code".bold(), report.dead_code.len())?;
    for dead in &report.dead_code {
        write!(out, "    {:<30}", dead.name)?;
        match &dead.file {
            Some(file) => write_location(out, file, dead.line_start.unwrap_or(0))?,
            None => write!(out, "{}", "(unknown file)".dimmed())?,
        }
        writeln!(out)?;
    }
    writeln!(out)
}

fn write_cycles<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    if report.cycles.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {} ({}):", "Cycles".bold(), report.cycles.len())?;
    for cycle in &report.cycles {
        write_severity_tag(out, cycle.severity)?;
        writeln!(out, "{}", cycle.nodes.join(" -> "))?;
    }
    writeln!(out)
}

fn write_duplications<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    if report.duplications.is_empty() {
        return Ok(());
    }
    writeln!(
        out,
        "  {} ({}):",
        "Duplications".bold(),
        report.duplications.len()
    )?;
    for dup in &report.duplications {
        writeln!(
            out,
            "    {}:{}-{}  ~  {}:{}-{}  {}",
            dup.file1_id.blue(),
            dup.start_line1,
            dup.end_line1,
            dup.file2_id.blue(),
            dup.start_line2,
            dup.end_line2,
            format!("({:.0}%)", dup.similarity * 100.0).dimmed()
        )?;
    }
    writeln!(out)
}

fn write_complexity<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    let mut symbols: Vec<_> = report
        .metrics
        .symbols
        .iter()
        .filter(|m| m.cyclomatic_complexity > 1)
        .collect();
    if symbols.is_empty() {
        return Ok(());
    }
    symbols.sort_by(|a, b| b.cyclomatic_complexity.cmp(&a.cyclomatic_complexity));

    writeln!(out, "  {}", "Most complex:".bold())?;
    for m in symbols.into_iter().take(TOP_COMPLEX_SYMBOLS) {
        writeln!(
            out,
            "    {:<30} {:>3} cc  {:>5.1} mi  {}",
            m.name,
            m.cyclomatic_complexity,
            m.maintainability_index,
            m.file_id.dimmed()
        )?;
    }
    writeln!(out)
}

fn write_stage_errors<W: Write>(out: &mut W, report: &ScanReport) -> std::io::Result<()> {
    if report.stage_errors.is_empty() {
        return Ok(());
    }
    writeln!(out, "  {}", "Stage errors:".red().bold())?;
    for err in &report.stage_errors {
        writeln!(out, "    {:<14}{}", err.stage.as_str(), err.message)?;
    }
    writeln!(out)
}

fn write_final_status<W: Write>(out: &mut W, summary: &Summary) -> std::io::Result<()> {
    write!(out, "  {}", "Findings:".dimmed())?;
    if summary.by_severity.is_empty() {
        return writeln!(out, " {}", "none".green());
    }
    for severity in [Severity::Critical, Severity::High, Severity::Medium, Severity::Low] {
        if let Some(count) = summary.by_severity.get(severity.as_str()) {
            write!(out, "  {} {}", count, severity.as_str())?;
        }
    }
    writeln!(out)
}

/// Write the symbols of one file as an indented outline.
pub fn write_symbols_pretty<W: Write>(
    out: &mut W,
    path: &str,
    symbols: &[Symbol],
) -> std::io::Result<()> {
    writeln!(out, "  {} ({} symbols)", path.blue(), symbols.len())?;
    for symbol in symbols {
        let indent = if symbol.parent.is_some() { "      " } else { "    " };
        writeln!(
            out,
            "{}{:<10} {:<30} {}",
            indent,
            symbol.kind.as_str().dimmed(),
            symbol.name,
            format!("{}-{}", symbol.line_start, symbol.line_end).dimmed()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Language, SourceFile};
    use crate::config::ScanConfig;
    use crate::detect::Runner;

    fn sample_report() -> ScanReport {
        let files = vec![SourceFile::new(
            "svc.py",
            Language::Python,
            "def main():\n    run()\n\ndef run():\n    cursor.execute(f\"SELECT * FROM t WHERE id={x}\")\n",
        )];
        Runner::new(&ScanConfig::default()).run(&files)
    }

    #[test]
    fn test_summary_counts_severities() {
        let report = sample_report();
        let summary = Summary::from_report(&report);
        assert_eq!(summary.files_scanned, 1);
        assert_eq!(summary.symbols, 2);
        assert_eq!(summary.security_issues, 1);
        assert_eq!(summary.by_severity.get("critical"), Some(&1));
        assert!(summary.average_maintainability.is_some());
    }

    #[test]
    fn test_json_flattens_report() {
        let report = sample_report();
        let json = render_json("svc", &report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["path"], "svc");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["summary"]["security_issues"], 1);
        assert!(value["security_issues"]["svc.py"].is_array());
        assert!(value["metrics"]["files"]["svc.py"].is_object());
    }

    #[test]
    fn test_pretty_lists_sections() {
        colored::control::set_override(false);
        let report = sample_report();
        let mut buf = Vec::new();
        write_pretty(&mut buf, "svc", &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("COMPLETED"));
        assert!(text.contains("Security (1):"));
        assert!(text.contains("svc.py:5"));
        assert!(text.contains("1 critical"));
    }

    #[test]
    fn test_pretty_no_files() {
        colored::control::set_override(false);
        let report = Runner::new(&ScanConfig::default()).run(&[]);
        let mut buf = Vec::new();
        write_pretty(&mut buf, ".", &report).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("no_files"));
        assert!(!text.contains("Findings:"));
    }
}
