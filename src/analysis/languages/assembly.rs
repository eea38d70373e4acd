//! Line-based assembly analyzer.
//!
//! Accepts GAS, NASM and MASM flavoured sources. There is no grammar; every
//! rule works on a single comment-stripped line.

use std::collections::HashMap;

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;

use crate::analysis::traits::{leading_comment_block, normalize_tokens};
use crate::analysis::{
    finalize_symbols, CallEdge, Dependency, DependencyKind, Language, LanguageAnalyzer,
    SourceFile, Symbol, SymbolKind,
};

/// Registers that show up as indirect call targets and are never symbols.
static REGISTERS: phf::Set<&'static str> = phf_set! {
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "eax", "ebx",
};

lazy_static! {
    static ref LABEL: Regex = Regex::new(r"^([._a-zA-Z][._a-zA-Z0-9]*):").unwrap();
    static ref SECTION: Regex =
        Regex::new(r"^(?:section\s+)?\.(text|data|bss|rodata)(?:\s|$)").unwrap();
    static ref GLOBAL: Regex =
        Regex::new(r"^\.?(?:globl|global)\s+([._a-zA-Z][._a-zA-Z0-9]*)").unwrap();
    static ref EXTERN: Regex = Regex::new(r"^\.?extern\s+([._a-zA-Z][._a-zA-Z0-9]*)").unwrap();
    static ref DIRECT_CALL: Regex =
        Regex::new(r"(?i)\b(?:call|callq|jsr|bl|jal)\s+([A-Za-z_]\w*)").unwrap();
    static ref INDIRECT_CALL: Regex = Regex::new(r"(?i)\bcallq?\s+\*%([a-z]+)").unwrap();
    static ref INCLUDES: Vec<Regex> = vec![
        Regex::new(r#"(?i)\.include\s+["']([^"']+)["']"#).unwrap(),
        Regex::new(r#"(?i)%include\s+["']([^"']+)["']"#).unwrap(),
        Regex::new(r"(?i)^\s*include\s+([a-zA-Z0-9_./]+)").unwrap(),
    ];
    static ref TOKEN: Regex =
        Regex::new(r"\b[a-zA-Z_]\w*\b|0x[0-9a-fA-F]+|\b\d+\b|[\[\](),+\-*]").unwrap();
}

/// Cut a line at its first `;`, `#` or `//` comment marker.
fn strip_comment(line: &str) -> &str {
    let mut cut = line.len();
    for marker in [";", "#", "//"] {
        if let Some(pos) = line.find(marker) {
            cut = cut.min(pos);
        }
    }
    &line[..cut]
}

fn is_local_label(name: &str) -> bool {
    name.starts_with('L') || name.starts_with(".L")
}

/// Assembly language analyzer.
pub struct AssemblyAnalyzer;

impl AssemblyAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AssemblyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extend functions and sections to the line before the next boundary.
fn assign_spans(symbols: &mut [Symbol], last_line: usize) {
    let function_bounds: Vec<usize> = symbols
        .iter()
        .filter(|s| matches!(s.kind, SymbolKind::Function | SymbolKind::Section))
        .map(|s| s.line_start)
        .collect();
    let section_bounds: Vec<usize> = symbols
        .iter()
        .filter(|s| s.kind == SymbolKind::Section)
        .map(|s| s.line_start)
        .collect();

    let next_after = |bounds: &[usize], line: usize| {
        bounds
            .iter()
            .copied()
            .filter(|&b| b > line)
            .min()
            .map(|b| b - 1)
            .unwrap_or(last_line)
    };

    for symbol in symbols.iter_mut() {
        let end = match symbol.kind {
            SymbolKind::Function => next_after(&function_bounds, symbol.line_start),
            SymbolKind::Section => next_after(&section_bounds, symbol.line_start),
            _ => continue,
        };
        symbol.line_end = end.max(symbol.line_start);
    }
}

impl LanguageAnalyzer for AssemblyAnalyzer {
    fn language(&self) -> Language {
        Language::Assembly
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["asm", "s"]
    }

    fn extract_symbols(&self, file: &SourceFile) -> anyhow::Result<Vec<Symbol>> {
        let mut symbols = Vec::new();
        let mut last_line = 0;

        for (idx, raw) in file.content.lines().enumerate() {
            let line_num = idx + 1;
            last_line = line_num;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = LABEL.captures(line) {
                let name = &caps[1];
                let kind = if is_local_label(name) {
                    SymbolKind::Label
                } else {
                    SymbolKind::Function
                };
                symbols.push(Symbol::new(
                    &file.path,
                    name,
                    kind,
                    line_num,
                    line_num,
                    format!("{}:", name),
                ));
            }

            if let Some(caps) = SECTION.captures(line) {
                let name = &caps[1];
                symbols.push(Symbol::new(
                    &file.path,
                    name,
                    SymbolKind::Section,
                    line_num,
                    line_num,
                    format!(".{}", name),
                ));
            }

            if let Some(caps) = GLOBAL.captures(line) {
                let name = &caps[1];
                symbols.push(Symbol::new(
                    &file.path,
                    name,
                    SymbolKind::Global,
                    line_num,
                    line_num,
                    format!(".global {}", name),
                ));
            } else if let Some(caps) = EXTERN.captures(line) {
                let name = &caps[1];
                symbols.push(Symbol::new(
                    &file.path,
                    name,
                    SymbolKind::Global,
                    line_num,
                    line_num,
                    format!(".extern {}", name),
                ));
            }
        }

        assign_spans(&mut symbols, last_line);
        for symbol in symbols.iter_mut() {
            symbol.docstring = self.extract_docstring(&file.content, symbol);
        }
        finalize_symbols(&mut symbols);
        Ok(symbols)
    }

    fn extract_calls(&self, file: &SourceFile, symbols: &[Symbol]) -> anyhow::Result<Vec<CallEdge>> {
        // Scope changes only on function headers and section directives.
        let mut headers: HashMap<usize, &Symbol> = HashMap::new();
        for symbol in symbols {
            if matches!(symbol.kind, SymbolKind::Function | SymbolKind::Section) {
                headers.entry(symbol.line_start).or_insert(symbol);
            }
        }

        let mut edges = Vec::new();
        let mut scope: Option<&Symbol> = None;
        for (idx, raw) in file.content.lines().enumerate() {
            let line_num = idx + 1;
            if let Some(&header) = headers.get(&line_num) {
                scope = (header.kind == SymbolKind::Function).then_some(header);
            }
            let Some(caller) = scope else {
                continue;
            };

            let line = strip_comment(raw);
            let direct = DIRECT_CALL.captures_iter(line).map(|c| c.get(1));
            let indirect = INDIRECT_CALL.captures_iter(line).map(|c| c.get(1));
            for callee in direct.chain(indirect).flatten() {
                let callee = callee.as_str();
                if REGISTERS.contains(callee.to_ascii_lowercase().as_str()) || callee == caller.name {
                    continue;
                }
                edges.push(CallEdge::resolve(caller, callee, line_num, symbols));
            }
        }
        Ok(edges)
    }

    fn tokenize(&self, code: &str) -> Vec<String> {
        let stripped: Vec<&str> = code.lines().map(strip_comment).collect();
        let stripped = stripped.join("\n");
        normalize_tokens(TOKEN.find_iter(&stripped).map(|m| m.as_str()))
    }

    fn min_block_lines(&self, _default: usize) -> usize {
        8
    }

    fn extract_docstring(&self, source: &str, symbol: &Symbol) -> Option<String> {
        leading_comment_block(source, symbol.line_start, |line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix(';')
                .or_else(|| trimmed.strip_prefix("//"))
                .map(|rest| rest.trim_start_matches(';').trim().to_string())
        })
    }

    fn extract_dependencies(&self, file: &SourceFile) -> Vec<Dependency> {
        let mut deps = Vec::new();
        for (idx, raw) in file.content.lines().enumerate() {
            // `;` may start a comment, but `#` and `//` never appear before an include.
            let line = raw.split(';').next().unwrap_or("");
            if let Some(caps) = INCLUDES.iter().find_map(|re| re.captures(line)) {
                deps.push(Dependency {
                    file_id: file.path.clone(),
                    target: caps[1].to_string(),
                    kind: DependencyKind::Include,
                    line: idx + 1,
                });
            }
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"; Program entry
section .text
global _start

; Writes the greeting.
; Clobbers rax.
print_msg:
    mov rax, 1
    call write_out      ; system write
    ret

_start:
    call print_msg
.Lloop:
    call *%rax
    call *%rbp
    jmp .Lloop

.data
msg: db "hi", 0
"#;

    fn asm_file(source: &str) -> SourceFile {
        SourceFile::new("boot.asm", Language::Assembly, source)
    }

    #[test]
    fn test_extract_symbols() {
        let symbols = AssemblyAnalyzer::new().extract_symbols(&asm_file(SAMPLE)).unwrap();

        let text = symbols.iter().find(|s| s.name == "text").unwrap();
        assert_eq!(text.kind, SymbolKind::Section);
        assert_eq!(text.signature, ".text");
        assert_eq!((text.line_start, text.line_end), (2, 18));

        let global = symbols
            .iter()
            .find(|s| s.name == "_start" && s.kind == SymbolKind::Global)
            .unwrap();
        assert_eq!(global.signature, ".global _start");

        let print_msg = symbols.iter().find(|s| s.name == "print_msg").unwrap();
        assert_eq!(print_msg.kind, SymbolKind::Function);
        assert_eq!(print_msg.signature, "print_msg:");
        assert_eq!((print_msg.line_start, print_msg.line_end), (7, 11));
        assert_eq!(print_msg.docstring.as_deref(), Some("Writes the greeting.\nClobbers rax."));
        assert_eq!(print_msg.parent, Some(text.id));

        let start = symbols
            .iter()
            .find(|s| s.name == "_start" && s.kind == SymbolKind::Function)
            .unwrap();
        assert_eq!((start.line_start, start.line_end), (12, 18));

        let local = symbols.iter().find(|s| s.name == ".Lloop").unwrap();
        assert_eq!(local.kind, SymbolKind::Label);
        assert_eq!(local.parent, Some(start.id));

        let msg = symbols.iter().find(|s| s.name == "msg").unwrap();
        assert_eq!((msg.line_start, msg.line_end), (20, 20));
    }

    #[test]
    fn test_calls_follow_current_label() {
        let analyzer = AssemblyAnalyzer::new();
        let file = asm_file(SAMPLE);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let calls = analyzer.extract_calls(&file, &symbols).unwrap();

        let pairs: Vec<_> = calls
            .iter()
            .map(|c| (c.caller_name.as_str(), c.callee_name.as_str(), c.is_external))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("print_msg", "write_out", true),
                ("_start", "print_msg", false),
                ("_start", "rbp", true),
            ]
        );
        assert_eq!(calls[1].line, 13);
    }

    #[test]
    fn test_calls_in_long_chain_and_section_reset() {
        let mut source = String::from("section .text\n");
        for i in 0..300 {
            source.push_str(&format!("step_{}:\n    call step_{}\n    ret\n", i, i + 1));
        }
        source.push_str("section .data\n    call orphan_target\n");

        let analyzer = AssemblyAnalyzer::new();
        let file = asm_file(&source);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let calls = analyzer.extract_calls(&file, &symbols).unwrap();

        assert_eq!(calls.len(), 300);
        assert!(calls.iter().all(|c| c.callee_name != "orphan_target"));
        assert_eq!(calls[0].caller_name, "step_0");
        assert_eq!(calls[0].line, 3);
        assert_eq!(calls[299].caller_name, "step_299");
        assert_eq!(calls[299].callee_name, "step_300");
        assert!(calls[299].is_external);
        assert!(!calls[298].is_external);
    }

    #[test]
    fn test_tokenize_drops_comments() {
        let tokens = AssemblyAnalyzer::new().tokenize("mov rax, 0x10 ; load\n# note\nadd rbx, 42\n");
        assert_eq!(tokens, vec!["mov", "rax", "0x10", "add", "rbx", "42"]);
    }

    #[test]
    fn test_includes() {
        let source = ".include \"macros.inc\"\n%include 'defs.asm'\ninclude io.inc\nmov eax, 1\n";
        let deps = AssemblyAnalyzer::new().extract_dependencies(&asm_file(source));
        let targets: Vec<_> = deps.iter().map(|d| d.target.as_str()).collect();
        assert_eq!(targets, vec!["macros.inc", "defs.asm", "io.inc"]);
        assert!(deps.iter().all(|d| d.kind == DependencyKind::Include));
    }
}
