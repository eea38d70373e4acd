//! Tests for report output formats and CLI exit codes.

use std::fs;
use std::path::Path;

use clap::Parser;
use codeintel::cli::{self, Cli, Commands, EXIT_ERROR, EXIT_FAILED, EXIT_SUCCESS};
use codeintel::config::ScanConfig;
use codeintel::detect::Runner;
use codeintel::report::{self, Summary};
use codeintel::{Language, SourceFile};
use serde_json::Value;
use tempfile::TempDir;

fn report_with_findings() -> codeintel::ScanReport {
    let files = vec![
        SourceFile::new(
            "svc.py",
            Language::Python,
            "def main():\n    \"\"\"Entry.\"\"\"\n    query(1)\n\ndef query(uid):\n    cursor.execute(\"SELECT * FROM users WHERE id=\" + uid)\n\ndef unused():\n    return 0\n",
        ),
        SourceFile::new(
            "io.c",
            Language::C,
            "void read_line(char *buf) {\n    gets(buf);\n}\n",
        ),
    ];
    Runner::new(&ScanConfig::default()).run(&files)
}

fn run_cli(args: &[&str]) -> i32 {
    let cli = Cli::parse_from(args);
    match &cli.command {
        Commands::Scan(a) => cli::run_scan(a).unwrap(),
        Commands::Symbols(a) => cli::run_symbols(a).unwrap(),
        Commands::Init(a) => cli::run_init(a).unwrap(),
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    fs::write(root.join(rel), content).unwrap();
}

#[test]
fn test_json_report_structure() {
    let report = report_with_findings();
    let json = report::render_json("repo", &report).unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(value["path"], "repo");
    assert_eq!(value["status"], "completed");
    assert_eq!(value["files_scanned"], 2);

    for key in [
        "symbols",
        "call_graph",
        "dead_code",
        "cycles",
        "duplications",
        "smells",
        "security_issues",
        "metrics",
        "dependencies",
        "dependency_graph",
        "stage_errors",
    ] {
        assert!(value.get(key).is_some(), "missing {}", key);
    }

    let sql = &value["security_issues"]["svc.py"][0];
    assert_eq!(sql["kind"], "sql_injection");
    assert_eq!(sql["severity"], "critical");
    assert_eq!(sql["cwe_id"], "CWE-89");

    let gets = &value["security_issues"]["io.c"][0];
    assert_eq!(gets["kind"], "buffer_overflow");
    assert_eq!(gets["line"], 2);

    let smell_kinds: Vec<&str> = value["smells"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["kind"].as_str())
        .collect();
    assert!(smell_kinds.contains(&"dead_code"));
}

#[test]
fn test_summary_matches_report() {
    let report = report_with_findings();
    let summary = Summary::from_report(&report);
    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.security_issues, report.security_issue_count());
    assert_eq!(summary.smells, report.smells.len());
    let total: usize = summary.by_severity.values().sum();
    assert_eq!(total, report.severities().count());
}

#[test]
fn test_json_round_trips_into_report() {
    let report = report_with_findings();
    let json = serde_json::to_string(&report).unwrap();
    let back: codeintel::ScanReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.status, report.status);
    assert_eq!(back.smells, report.smells);
    assert_eq!(back.security_issues, report.security_issues);
}

#[test]
fn test_scan_exit_codes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "clean.py", "def main():\n    \"\"\"Entry.\"\"\"\n    return 1\n");
    let out = root.join("report.json");
    let root_str = root.to_str().unwrap();
    let out_str = out.to_str().unwrap();

    let code = run_cli(&[
        "codeintel", "scan", root_str, "--format", "json", "--output", out_str, "--fail-on", "low",
    ]);
    assert_eq!(code, EXIT_SUCCESS);
    let value: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(value["summary"]["files_scanned"], 1);

    write(root, "bad.c", "void f(char *b) {\n    gets(b);\n}\n");
    let code = run_cli(&[
        "codeintel", "scan", root_str, "--format", "json", "--output", out_str, "--fail-on", "critical",
    ]);
    assert_eq!(code, EXIT_FAILED);

    let missing = root.join("does-not-exist");
    let code = run_cli(&["codeintel", "scan", missing.to_str().unwrap()]);
    assert_eq!(code, EXIT_ERROR);
}

#[test]
fn test_init_writes_loadable_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("codeintel.yaml");
    let path_str = path.to_str().unwrap();

    assert_eq!(run_cli(&["codeintel", "init", "--output", path_str]), EXIT_SUCCESS);
    let config = ScanConfig::parse_file(&path).unwrap();
    assert_eq!(config.version, "1");
    assert_eq!(config.smells.long_method_lines, 50);

    assert_eq!(run_cli(&["codeintel", "init", "--output", path_str]), EXIT_ERROR);
    assert_eq!(
        run_cli(&["codeintel", "init", "--output", path_str, "--force"]),
        EXIT_SUCCESS
    );
}
