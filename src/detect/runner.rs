//! Full-scan runner that orchestrates all stages.
//!
//! Symbol extraction runs first; the remaining stages only read its output
//! and run concurrently. A stage that fails is recorded in
//! `ScanReport::stage_errors` and leaves the other stages untouched.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::complexity::{analyze_code_quality, analyze_symbols, QualityMetrics, SymbolMetrics};
use super::duplication::{Duplication, DuplicationDetector};
use super::security::SecurityScanner;
use super::smells::{from_dead_code, from_duplication, SmellDetector};
use super::types::{SecurityIssue, Severity, SmellFinding};
use crate::analysis::{get_analyzer_for, AnalysisContext, Dependency, FileSymbols, SourceFile, Symbol};
use crate::config::ScanConfig;
use crate::error::{Result, ScanError, ScanStatus, Stage, StageError};
use crate::graph::{
    find_cycles, find_dead_code, CallGraph, CallGraphBuilder, Cycle, DeadCode, DependencyGraph,
};

/// Per-symbol and per-file quality numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanMetrics {
    pub symbols: Vec<SymbolMetrics>,
    pub files: IndexMap<String, QualityMetrics>,
}

/// Everything one scan produced.
///
/// A report is always built whole from a single scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub status: ScanStatus,
    pub files_scanned: usize,
    pub symbols: IndexMap<String, Vec<Symbol>>,
    pub call_graph: Option<CallGraph>,
    pub dead_code: Vec<DeadCode>,
    pub cycles: Vec<Cycle>,
    pub duplications: Vec<Duplication>,
    pub smells: Vec<SmellFinding>,
    pub security_issues: IndexMap<String, Vec<SecurityIssue>>,
    pub metrics: ScanMetrics,
    pub dependencies: Vec<Dependency>,
    pub dependency_graph: DependencyGraph,
    pub stage_errors: Vec<StageError>,
}

impl ScanReport {
    fn with_status(status: ScanStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Severities of every finding that carries one.
    pub fn severities(&self) -> impl Iterator<Item = Severity> + '_ {
        self.smells
            .iter()
            .map(|s| s.severity)
            .chain(self.security_issues.values().flatten().map(|i| i.severity))
            .chain(self.cycles.iter().map(|c| c.severity))
    }

    /// Number of findings at or above `threshold`.
    pub fn count_at_or_above(&self, threshold: Severity) -> usize {
        self.severities().filter(|s| *s >= threshold).count()
    }

    pub fn security_issue_count(&self) -> usize {
        self.security_issues.values().map(Vec::len).sum()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.values().map(Vec::len).sum()
    }
}

type GraphOutput = (CallGraph, Vec<DeadCode>, Vec<Cycle>);

/// Run a stage, turning a panic inside it into a stage error.
fn run_stage<T, F>(stage: Stage, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    tracing::debug!(%stage, "stage started");
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stage panicked".to_string());
            Err(ScanError::Stage { stage, message })
        }
    }
}

/// Executes a full scan over a set of files.
pub struct Runner<'a> {
    config: &'a ScanConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Runner<'a> {
    /// Create a new runner.
    pub fn new(config: &'a ScanConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Stop between files and stages once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn context<P: AsRef<Path>>(&self, base_dir: P) -> AnalysisContext {
        let ctx = AnalysisContext::new(base_dir, &self.config.streaming);
        match &self.cancel {
            Some(flag) => ctx.with_cancel(Arc::clone(flag)),
            None => ctx,
        }
    }

    /// Load `paths` relative to `base_dir` and scan them.
    pub fn scan_paths<P: AsRef<Path>>(&self, base_dir: P, paths: &[PathBuf]) -> ScanReport {
        let files = self.context(base_dir).load_files(paths);
        self.run(&files)
    }

    /// Scan in-memory files, extracting symbols first.
    pub fn run(&self, files: &[SourceFile]) -> ScanReport {
        if let Some(report) = self.precheck(files) {
            return report;
        }
        let extracted = self.context(".").extract_all(files);
        self.run_stages(files, extracted)
    }

    /// Scan files whose symbols were extracted earlier.
    pub fn run_with_symbols(&self, extracted: Vec<FileSymbols>) -> ScanReport {
        let files: Vec<SourceFile> = extracted.iter().map(|f| f.file.clone()).collect();
        if let Some(report) = self.precheck(&files) {
            return report;
        }
        self.run_stages(&files, extracted)
    }

    fn precheck(&self, files: &[SourceFile]) -> Option<ScanReport> {
        if files.is_empty() {
            tracing::info!("no supported files to scan");
            return Some(ScanReport::with_status(ScanStatus::NoFiles));
        }
        if files.iter().all(|f| f.content.trim().is_empty()) {
            tracing::info!(files = files.len(), "no source code in any file");
            let mut report = ScanReport::with_status(ScanStatus::NoSourceCode);
            report.files_scanned = files.len();
            return Some(report);
        }
        None
    }

    fn run_stages(&self, files: &[SourceFile], extracted: Vec<FileSymbols>) -> ScanReport {
        let mut report = ScanReport {
            files_scanned: files.len(),
            ..Default::default()
        };
        for entry in &extracted {
            report
                .symbols
                .insert(entry.file.path.clone(), entry.symbols.clone());
        }
        report.dependencies = files
            .iter()
            .filter_map(|f| get_analyzer_for(f.language).map(|a| a.extract_dependencies(f)))
            .flatten()
            .collect();
        report.dependency_graph = DependencyGraph::build(files, &report.dependencies);
        tracing::info!(
            files = files.len(),
            symbols = report.symbol_count(),
            "symbol extraction complete"
        );

        if self.is_cancelled() {
            report.status = ScanStatus::Cancelled;
            return report;
        }

        let stages = &self.config.stages;
        let ((graph, duplication), ((smells, metrics), security)) = rayon::join(
            || {
                rayon::join(
                    || run_stage(Stage::CallGraph, || self.graph_stage(&extracted, stages.call_graph)),
                    || run_stage(Stage::Duplication, || self.duplication_stage(files, stages.duplication)),
                )
            },
            || {
                rayon::join(
                    || {
                        rayon::join(
                            || run_stage(Stage::Smells, || self.smell_stage(&extracted, stages.smells)),
                            || run_stage(Stage::Complexity, || self.complexity_stage(&extracted, stages.complexity)),
                        )
                    },
                    || run_stage(Stage::Security, || self.security_stage(files, stages.security)),
                )
            },
        );

        let mut record = |err: ScanError| {
            tracing::warn!(error = %err, "stage failed");
            report.stage_errors.push(StageError::from(&err));
        };

        let graph = graph.map_err(&mut record).ok().flatten();
        let duplications = duplication.map_err(&mut record).ok().unwrap_or_default();
        let mut smells = smells.map_err(&mut record).ok();
        let metrics = metrics.map_err(&mut record).ok().unwrap_or_default();
        let security = security.map_err(&mut record).ok().unwrap_or_default();

        if let Some((call_graph, dead_code, cycles)) = graph {
            if let Some(smells) = smells.as_mut() {
                smells.extend(dead_code.iter().map(from_dead_code));
            }
            report.call_graph = Some(call_graph);
            report.dead_code = dead_code;
            report.cycles = cycles;
        }
        if let Some(smells) = smells.as_mut() {
            smells.extend(duplications.iter().map(from_duplication));
        }
        report.duplications = duplications;
        report.smells = smells.unwrap_or_default();
        report.metrics = metrics;
        report.security_issues = security;

        report.status = if self.is_cancelled() {
            ScanStatus::Cancelled
        } else {
            ScanStatus::Completed
        };
        tracing::info!(
            status = %report.status,
            smells = report.smells.len(),
            security_issues = report.security_issue_count(),
            duplications = report.duplications.len(),
            stage_errors = report.stage_errors.len(),
            "scan complete"
        );
        report
    }

    fn graph_stage(&self, extracted: &[FileSymbols], enabled: bool) -> Result<Option<GraphOutput>> {
        if !enabled {
            return Ok(None);
        }
        let graph = CallGraphBuilder::new(&self.config.graph).build(extracted);
        let dead = find_dead_code(&graph, &self.config.graph.entry_points);
        let cycles = find_cycles(&graph);
        Ok(Some((graph, dead, cycles)))
    }

    fn duplication_stage(&self, files: &[SourceFile], enabled: bool) -> Result<Vec<Duplication>> {
        if !enabled || self.is_cancelled() {
            return Ok(Vec::new());
        }
        Ok(DuplicationDetector::new(&self.config.duplication).find_duplicates(files))
    }

    fn smell_stage(&self, extracted: &[FileSymbols], enabled: bool) -> Result<Vec<SmellFinding>> {
        let mut findings = Vec::new();
        if !enabled {
            return Ok(findings);
        }
        let detector = SmellDetector::new(&self.config.smells);
        for entry in extracted {
            if self.is_cancelled() {
                break;
            }
            findings.extend(detector.scan_file(&entry.file, &entry.symbols));
        }
        Ok(findings)
    }

    fn complexity_stage(&self, extracted: &[FileSymbols], enabled: bool) -> Result<ScanMetrics> {
        let mut metrics = ScanMetrics::default();
        if !enabled {
            return Ok(metrics);
        }
        for entry in extracted {
            if self.is_cancelled() {
                break;
            }
            metrics.symbols.extend(analyze_symbols(&entry.file, &entry.symbols));
            metrics.files.insert(
                entry.file.path.clone(),
                analyze_code_quality(&entry.file.content, entry.file.language),
            );
        }
        Ok(metrics)
    }

    fn security_stage(
        &self,
        files: &[SourceFile],
        enabled: bool,
    ) -> Result<IndexMap<String, Vec<SecurityIssue>>> {
        let mut issues = IndexMap::new();
        if !enabled {
            return Ok(issues);
        }
        let scanner = SecurityScanner::new();
        for file in files {
            if self.is_cancelled() {
                break;
            }
            let found = scanner.scan_file(file);
            if !found.is_empty() {
                issues.insert(file.path.clone(), found);
            }
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Language;
    use crate::detect::SmellKind;

    fn sample_files() -> Vec<SourceFile> {
        vec![
            SourceFile::new(
                "app.py",
                Language::Python,
                "def main():\n    helper()\n\ndef helper():\n    return 1\n\ndef unused():\n    return 2\n",
            ),
            SourceFile::new(
                "util.c",
                Language::C,
                "#include <string.h>\nvoid copy(char *dst, char *src) {\n    strcpy(dst, src);\n}\n",
            ),
        ]
    }

    #[test]
    fn test_empty_input_is_no_files() {
        let config = ScanConfig::default();
        let report = Runner::new(&config).run(&[]);
        assert_eq!(report.status, ScanStatus::NoFiles);
    }

    #[test]
    fn test_blank_files_are_no_source_code() {
        let config = ScanConfig::default();
        let files = vec![SourceFile::new("a.py", Language::Python, "  \n\n")];
        let report = Runner::new(&config).run(&files);
        assert_eq!(report.status, ScanStatus::NoSourceCode);
        assert_eq!(report.files_scanned, 1);
    }

    #[test]
    fn test_full_scan_populates_every_stage() {
        let config = ScanConfig::default();
        let report = Runner::new(&config).run(&sample_files());

        assert_eq!(report.status, ScanStatus::Completed);
        assert!(report.stage_errors.is_empty());
        assert_eq!(report.symbols["app.py"].len(), 3);

        let dead: Vec<_> = report.dead_code.iter().map(|d| d.name.as_str()).collect();
        assert!(dead.contains(&"unused"));
        assert!(!dead.contains(&"helper"));
        assert!(!dead.contains(&"main"));
        assert!(report
            .smells
            .iter()
            .any(|s| s.kind == SmellKind::DeadCode && s.title == "Dead Code: unused"));

        assert_eq!(report.security_issues["util.c"].len(), 1);
        assert!(report.metrics.files.contains_key("app.py"));
        assert_eq!(report.metrics.symbols.len(), 4);
        assert_eq!(report.dependencies.len(), 1);
        assert_eq!(report.dependency_graph.total_files, 2);
        assert_eq!(report.dependency_graph.total_dependencies, 1);
    }

    #[test]
    fn test_disabled_stages_are_empty() {
        let mut config = ScanConfig::default();
        config.stages.call_graph = false;
        config.stages.security = false;
        let report = Runner::new(&config).run(&sample_files());
        assert!(report.call_graph.is_none());
        assert!(report.dead_code.is_empty());
        assert!(report.security_issues.is_empty());
        assert!(!report.metrics.symbols.is_empty());
    }

    #[test]
    fn test_cancelled_before_stages() {
        let config = ScanConfig::default();
        let flag = Arc::new(AtomicBool::new(true));
        let report = Runner::new(&config).with_cancel(flag).run(&sample_files());
        assert_eq!(report.status, ScanStatus::Cancelled);
        assert!(report.smells.is_empty());
    }

    #[test]
    fn test_panicking_stage_is_isolated() {
        let result: Result<()> = run_stage(Stage::Duplication, || panic!("window overflow"));
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "duplication stage failed: window overflow");
    }

    #[test]
    fn test_fail_on_counts() {
        let config = ScanConfig::default();
        let report = Runner::new(&config).run(&sample_files());
        assert!(report.count_at_or_above(Severity::Critical) >= 1);
        assert!(report.count_at_or_above(Severity::Low) >= report.count_at_or_above(Severity::High));
    }
}
