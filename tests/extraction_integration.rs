//! Integration tests for symbol extraction and call graph assembly.
//!
//! These tests load real files from disk through `AnalysisContext` and check
//! the facts each language analyzer produces.

use std::fs;

use codeintel::analysis::{get_analyzer, registered_extensions, DependencyKind};
use codeintel::config::{GraphConfig, NodeKeying, ScanConfig, StreamingConfig};
use codeintel::detect::Runner;
use codeintel::graph::{find_cycles, find_dead_code};
use codeintel::{AnalysisContext, CallGraphBuilder, ScanError, SymbolKind};
use tempfile::TempDir;

fn context(dir: &TempDir) -> AnalysisContext {
    AnalysisContext::new(dir.path(), &StreamingConfig::default())
}

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

// =============================================================================
// Dispatcher
// =============================================================================

#[test]
fn test_extension_dispatch() {
    codeintel::init();
    for ext in ["py", "c", "h", "asm", "s", "cbl", "cob", "PY"] {
        assert!(get_analyzer(ext).is_some(), "no analyzer for {}", ext);
    }
    assert!(get_analyzer("rs").is_none());
    assert!(registered_extensions().contains(&"py"));
}

#[test]
fn test_unsupported_and_missing_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "notes.md", "# not code\n");
    let ctx = context(&dir);

    assert!(ctx.load_file("notes.md").unwrap().is_none());
    let err = ctx.load_file("missing.py").unwrap_err();
    assert!(matches!(err, ScanError::Io { .. }));
}

// =============================================================================
// Per-language extraction
// =============================================================================

#[test]
fn test_python_classes_and_methods() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "pkg/shapes.py",
        r#"import math
from typing import List

class Circle:
    """A circle."""

    def __init__(self, r):
        self.r = r

    def area(self):
        return math.pi * self.r ** 2

def total(shapes: List[Circle]):
    return sum(s.area() for s in shapes)
"#,
    );
    let ctx = context(&dir);
    let file = ctx.load_file("pkg/shapes.py").unwrap().unwrap();
    assert_eq!(file.path, "pkg/shapes.py");

    let symbols = ctx.extract_file(&file).unwrap();
    let circle = symbols.iter().find(|s| s.name == "Circle").unwrap();
    assert_eq!(circle.kind, SymbolKind::Class);
    assert_eq!(circle.docstring.as_deref(), Some("A circle."));

    let area = symbols.iter().find(|s| s.name == "area").unwrap();
    assert_eq!(area.kind, SymbolKind::Function);
    assert_eq!(area.parent, Some(circle.id));

    let total = symbols.iter().find(|s| s.name == "total").unwrap();
    assert_eq!(total.parent, None);
    assert_eq!(total.line_start, 13);

    let analyzer = get_analyzer("py").unwrap();
    let deps: Vec<_> = analyzer
        .extract_dependencies(&file)
        .into_iter()
        .map(|d| d.target)
        .collect();
    assert_eq!(deps, vec!["math", "typing"]);
}

#[test]
fn test_c_functions_and_includes() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "src/math.c",
        r#"#include <stdlib.h>
#include "math.h"

/** Squares a value. */
int square(int x) {
    return x * x;
}

int sum_squares(int a, int b) {
    return square(a) + square(b);
}
"#,
    );
    let ctx = context(&dir);
    let file = ctx.load_file("src/math.c").unwrap().unwrap();
    let symbols = ctx.extract_file(&file).unwrap();

    let square = symbols.iter().find(|s| s.name == "square").unwrap();
    assert_eq!(square.kind, SymbolKind::Function);
    assert_eq!((square.line_start, square.line_end), (5, 7));
    assert!(square.docstring.as_deref().unwrap_or("").contains("Squares a value."));

    let analyzer = get_analyzer("c").unwrap();
    let calls = analyzer.extract_calls(&file, &symbols).unwrap();
    assert_eq!(calls.len(), 2);
    assert!(calls
        .iter()
        .all(|c| c.caller_name == "sum_squares" && c.callee_name == "square" && !c.is_external));

    let deps = analyzer.extract_dependencies(&file);
    assert_eq!(deps[0].kind, DependencyKind::SystemInclude);
    assert_eq!(deps[1].kind, DependencyKind::LocalInclude);
}

#[test]
fn test_broken_file_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    write(&dir, "ok.py", "def fine():\n    return 1\n");
    write(&dir, "broken.py", "def broken(:\n    pass\n");
    let ctx = context(&dir);

    let files = ctx.load_files(&["ok.py".into(), "broken.py".into()]);
    assert_eq!(files.len(), 2);
    let extracted = ctx.extract_all(&files);
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].file.path, "ok.py");

    let report = Runner::new(&ScanConfig::default()).run(&files);
    assert_eq!(report.files_scanned, 2);
    assert!(report.symbols.contains_key("ok.py"));
    assert!(!report.symbols.contains_key("broken.py"));
}

#[test]
fn test_large_file_is_streamed_in_batches() {
    let dir = TempDir::new().unwrap();
    let source: String = (0..30)
        .map(|i| format!("def f{}():\n    return {}\n\n", i, i))
        .collect();
    write(&dir, "many.py", &source);

    let streaming = StreamingConfig {
        line_threshold: 10,
        batch_size: 7,
    };
    let ctx = AnalysisContext::new(dir.path(), &streaming);
    let file = ctx.load_file("many.py").unwrap().unwrap();
    let streamed = ctx.extract_file(&file).unwrap();

    let direct = get_analyzer("py").unwrap().extract_symbols(&file).unwrap();
    assert_eq!(streamed, direct);
    assert_eq!(streamed.len(), 30);
}

// =============================================================================
// Call graph across files
// =============================================================================

#[test]
fn test_cross_file_graph_under_both_keyings() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a.py", "def main():\n    shared()\n\ndef shared():\n    return 1\n");
    write(&dir, "b.py", "def shared():\n    return 2\n\ndef stray():\n    return 3\n");
    let ctx = context(&dir);
    let files = ctx.load_files(&["a.py".into(), "b.py".into()]);
    let extracted = ctx.extract_all(&files);

    let bare = CallGraphBuilder::new(&GraphConfig::default()).build(&extracted);
    assert_eq!(bare.total_functions, 3);
    let dead: Vec<_> = find_dead_code(&bare, &[])
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(dead, vec!["stray"]);

    let qualified_config = GraphConfig {
        node_keying: NodeKeying::FileQualified,
        ..Default::default()
    };
    let qualified = CallGraphBuilder::new(&qualified_config).build(&extracted);
    assert_eq!(qualified.total_functions, 4);
    assert!(qualified
        .node("a.py::shared")
        .unwrap()
        .called_by
        .contains("a.py::main"));
    let mut dead: Vec<_> = find_dead_code(&qualified, &[])
        .into_iter()
        .map(|d| d.file.unwrap_or_default() + "::" + &d.name)
        .collect();
    dead.sort();
    assert_eq!(dead, vec!["b.py::shared", "b.py::stray"]);

    let extra = vec!["stray".to_string()];
    assert!(find_dead_code(&bare, &extra).is_empty());
    assert!(find_cycles(&bare).is_empty());
}

#[test]
fn test_cobol_and_assembly_graphs() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "batch.cbl",
        "       IDENTIFICATION DIVISION.
       PROGRAM-ID. BATCH.
       PROCEDURE DIVISION.
       MAIN-PARAGRAPH.
           PERFORM STEP-ONE.
           STOP RUN.
       STEP-ONE.
           PERFORM STEP-TWO.
       STEP-TWO.
           PERFORM STEP-ONE.
       UNUSED-PARA.
           DISPLAY \"X\".
",
    );
    write(
        &dir,
        "boot.asm",
        "section .text
_start:
    call init_hw
    ret
init_hw:
    ret
spare:
    ret
",
    );
    let ctx = context(&dir);
    let files = ctx.load_files(&["batch.cbl".into(), "boot.asm".into()]);
    let extracted = ctx.extract_all(&files);
    let graph = CallGraphBuilder::new(&GraphConfig::default()).build(&extracted);

    let procedures: Vec<_> = extracted[0]
        .symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Procedure)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(
        procedures,
        vec!["MAIN-PARAGRAPH", "STEP-ONE", "STEP-TWO", "UNUSED-PARA"]
    );

    let mut dead: Vec<_> = find_dead_code(&graph, &[])
        .into_iter()
        .map(|d| d.name)
        .collect();
    dead.sort();
    assert_eq!(dead, vec!["UNUSED-PARA", "spare"]);

    let cycles = find_cycles(&graph);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].length, 2);
}
