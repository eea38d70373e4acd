//! Line-based COBOL analyzer.
//!
//! Handles fixed format (sequence area, indicator column) and free format
//! sources. All matching is done on uppercased lines.

use lazy_static::lazy_static;
use phf::phf_set;
use regex::Regex;

use crate::analysis::traits::{leading_comment_block, normalize_tokens};
use crate::analysis::{
    finalize_symbols, CallEdge, Dependency, DependencyKind, Language, LanguageAnalyzer,
    SourceFile, Symbol, SymbolKind,
};

/// Header names that look like paragraphs or sections but are not procedures.
static NOT_PROCEDURES: phf::Set<&'static str> = phf_set! {
    "IDENTIFICATION", "ENVIRONMENT", "DATA", "PROCEDURE", "WORKING-STORAGE",
    "LINKAGE", "FILE", "SCREEN", "INPUT-OUTPUT", "FILE-CONTROL", "CONFIGURATION",
    "LOCAL-STORAGE", "EXIT", "GOBACK", "CONTINUE",
};

/// PERFORM operands that are loop keywords, not procedure names.
static PERFORM_KEYWORDS: phf::Set<&'static str> = phf_set! {
    "VARYING", "UNTIL", "TIMES", "THRU", "THROUGH",
};

/// Structural words that carry no duplication signal.
static NOISE_WORDS: phf::Set<&'static str> = phf_set! {
    "DIVISION", "SECTION", "PROCEDURE", "DATA", "WORKING-STORAGE", "FILE",
    "IDENTIFICATION", "ENVIRONMENT", "CONFIGURATION",
};

lazy_static! {
    static ref PROGRAM_ID: Regex = Regex::new(r"^PROGRAM-ID\.\s+([A-Z0-9\-]+)").unwrap();
    static ref SECTION: Regex = Regex::new(r"^([A-Z][A-Z0-9\-]*)\s+SECTION\.").unwrap();
    static ref PARAGRAPH: Regex = Regex::new(r"^([A-Z0-9][A-Z0-9\-]*)\.(?:\s|$)").unwrap();
    static ref LEVEL_01: Regex = Regex::new(r"^01\s+([A-Z0-9][A-Z0-9\-]+)").unwrap();
    static ref PERFORM: Regex = Regex::new(r"\bPERFORM\s+([A-Z0-9\-_]+)").unwrap();
    static ref CALL: Regex = Regex::new(r#"\bCALL\s+['"]([A-Z0-9\-_]+)['"]"#).unwrap();
    static ref COPY: Vec<Regex> = vec![
        Regex::new(r#"\bCOPY\s+["']([^"']+)["']"#).unwrap(),
        Regex::new(r"\bCOPY\s+([A-Z0-9\-_]+)\.").unwrap(),
        Regex::new(r"\bCOPY\s+([A-Z0-9\-_]+)\s+IN\s+").unwrap(),
        Regex::new(r"\bCOPY\s+([A-Z0-9\-_]+)\s+REPLACING").unwrap(),
    ];
    static ref TOKEN: Regex = Regex::new(r"(?i)\b[A-Z0-9\-]+\b|\d+|[().,;]").unwrap();
}

/// Whether a raw line starts with a numeric sequence area.
fn has_sequence_area(line: &str) -> bool {
    line.len() > 6 && line.as_bytes()[..6].iter().all(u8::is_ascii_digit)
}

/// Comment text of a line, or `None` if the line is code or blank.
pub(crate) fn comment_text(line: &str) -> Option<&str> {
    let bytes = line.as_bytes();
    let fixed_prefix = bytes.len() > 6
        && bytes[..6].iter().all(|b| b.is_ascii_digit() || *b == b' ');
    if fixed_prefix && matches!(bytes[6], b'*' | b'/') {
        return Some(line[7..].trim());
    }
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("*>") {
        return Some(rest.trim());
    }
    trimmed.strip_prefix('*').map(|rest| rest.trim_start_matches('*').trim())
}

/// Uppercased code text of a line with the sequence area and any inline
/// `*>` comment removed. Comment lines yield `None`.
pub(crate) fn code_text(line: &str) -> Option<String> {
    if comment_text(line).is_some() {
        return None;
    }
    let body = if has_sequence_area(line) { &line[6..] } else { line };
    let body = body.split("*>").next().unwrap_or("");
    Some(body.trim().to_uppercase())
}

#[derive(Clone, Copy, PartialEq)]
enum Header {
    Program,
    Section,
    Paragraph,
    Variable,
}

/// COBOL language analyzer.
pub struct CobolAnalyzer;

impl CobolAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn classify(line: &str) -> Option<(Header, String)> {
        if let Some(caps) = PROGRAM_ID.captures(line) {
            return Some((Header::Program, caps[1].to_string()));
        }
        if let Some(caps) = SECTION.captures(line) {
            let name = &caps[1];
            return (!NOT_PROCEDURES.contains(name)).then(|| (Header::Section, name.to_string()));
        }
        if let Some(caps) = PARAGRAPH.captures(line) {
            let name = &caps[1];
            // Scope terminators such as END-IF. stand alone on a line too.
            let is_statement = NOT_PROCEDURES.contains(name) || name.starts_with("END-");
            return (!is_statement).then(|| (Header::Paragraph, name.to_string()));
        }
        LEVEL_01
            .captures(line)
            .map(|caps| (Header::Variable, caps[1].to_string()))
    }
}

impl Default for CobolAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Line before the first boundary after `line`, or `last_line`.
fn end_before(bounds: &[usize], line: usize, last_line: usize) -> usize {
    bounds
        .iter()
        .copied()
        .find(|&b| b > line)
        .map(|b| b - 1)
        .unwrap_or(last_line)
}

impl LanguageAnalyzer for CobolAnalyzer {
    fn language(&self) -> Language {
        Language::Cobol
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["cbl", "cob", "cpy"]
    }

    fn extract_symbols(&self, file: &SourceFile) -> anyhow::Result<Vec<Symbol>> {
        let mut headers: Vec<(Header, String, usize, String)> = Vec::new();
        let mut last_line = 0;

        for (idx, raw) in file.content.lines().enumerate() {
            last_line = idx + 1;
            let Some(line) = code_text(raw) else {
                continue;
            };
            if line.is_empty() {
                continue;
            }
            if let Some((header, name)) = Self::classify(&line) {
                headers.push((header, name, idx + 1, line));
            }
        }

        let lines_of = |wanted: &[Header]| -> Vec<usize> {
            headers
                .iter()
                .filter(|(h, ..)| wanted.contains(h))
                .map(|(_, _, line, _)| *line)
                .collect()
        };
        let programs = lines_of(&[Header::Program]);
        let sections = lines_of(&[Header::Program, Header::Section]);
        let procedures = lines_of(&[Header::Program, Header::Section, Header::Paragraph]);

        let mut symbols: Vec<Symbol> = headers
            .iter()
            .map(|(header, name, line, text)| {
                let (kind, end, signature) = match header {
                    Header::Program => (
                        SymbolKind::Program,
                        end_before(&programs, *line, last_line),
                        format!("PROGRAM-ID. {}", name),
                    ),
                    Header::Section => (
                        SymbolKind::Procedure,
                        end_before(&sections, *line, last_line),
                        format!("{} SECTION.", name),
                    ),
                    Header::Paragraph => (
                        SymbolKind::Procedure,
                        end_before(&procedures, *line, last_line),
                        format!("{}.", name),
                    ),
                    Header::Variable => (SymbolKind::Variable, *line, text.clone()),
                };
                Symbol::new(&file.path, name.as_str(), kind, *line, end, signature)
            })
            .collect();

        for symbol in symbols.iter_mut() {
            symbol.docstring = self.extract_docstring(&file.content, symbol);
        }
        finalize_symbols(&mut symbols);
        Ok(symbols)
    }

    fn extract_calls(&self, file: &SourceFile, symbols: &[Symbol]) -> anyhow::Result<Vec<CallEdge>> {
        let mut procedures: Vec<&Symbol> = symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Procedure)
            .collect();
        procedures.sort_by_key(|s| s.line_start);
        let programs: Vec<&Symbol> = symbols
            .iter()
            .filter(|s| s.kind == SymbolKind::Program)
            .collect();

        let mut edges = Vec::new();
        for (idx, raw) in file.content.lines().enumerate() {
            let line_num = idx + 1;
            let Some(line) = code_text(raw) else {
                continue;
            };

            let current = procedures
                .iter()
                .rev()
                .find(|p| p.line_start <= line_num && line_num <= p.line_end)
                .copied();

            if let Some(caller) = current {
                for caps in PERFORM.captures_iter(&line) {
                    let callee = &caps[1];
                    if PERFORM_KEYWORDS.contains(callee)
                        || callee.chars().all(|c| c.is_ascii_digit())
                        || callee == caller.name
                    {
                        continue;
                    }
                    edges.push(CallEdge::resolve(caller, callee, line_num, symbols));
                }
            }

            // CALL outside a paragraph belongs to the enclosing program.
            let owner = current.or_else(|| {
                programs
                    .iter()
                    .rev()
                    .find(|p| p.line_start <= line_num && line_num <= p.line_end)
                    .copied()
            });
            if let Some(caller) = owner {
                for caps in CALL.captures_iter(&line) {
                    edges.push(CallEdge::external(caller, &caps[1], line_num));
                }
            }
        }
        Ok(edges)
    }

    fn tokenize(&self, code: &str) -> Vec<String> {
        let code: Vec<String> = code.lines().filter_map(code_text).collect();
        let code = code.join("\n");
        normalize_tokens(
            TOKEN
                .find_iter(&code)
                .map(|m| m.as_str())
                .filter(|t| !NOISE_WORDS.contains(*t)),
        )
    }

    fn min_block_lines(&self, _default: usize) -> usize {
        10
    }

    fn extract_docstring(&self, source: &str, symbol: &Symbol) -> Option<String> {
        leading_comment_block(source, symbol.line_start, |line| {
            comment_text(line).map(str::to_string)
        })
    }

    fn extract_dependencies(&self, file: &SourceFile) -> Vec<Dependency> {
        let mut deps = Vec::new();
        for (idx, raw) in file.content.lines().enumerate() {
            let Some(line) = code_text(raw) else {
                continue;
            };
            if let Some(caps) = COPY.iter().find_map(|re| re.captures(&line)) {
                deps.push(Dependency {
                    file_id: file.path.clone(),
                    target: caps[1].to_string(),
                    kind: DependencyKind::Copybook,
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

    const SAMPLE: &str = "\
       IDENTIFICATION DIVISION.
       PROGRAM-ID. PAYROLL.
       DATA DIVISION.
       WORKING-STORAGE SECTION.
       01 WS-TOTAL PIC 9(5).
           COPY EMPREC.
       PROCEDURE DIVISION.
      * Entry point of the run.
       MAIN-PARAGRAPH.
           PERFORM compute-pay.
           PERFORM VARYING I FROM 1 BY 1 UNTIL I > 3
              DISPLAY I
           END-PERFORM.
           PERFORM MAIN-PARAGRAPH.
           CALL 'AUDITLOG'.
           STOP RUN.
       COMPUTE-PAY.
           ADD 1 TO WS-TOTAL.
           EXIT.
";

    fn cobol_file(source: &str) -> SourceFile {
        SourceFile::new("PAYROLL.cbl", Language::Cobol, source)
    }

    #[test]
    fn test_extract_symbols() {
        let symbols = CobolAnalyzer::new().extract_symbols(&cobol_file(SAMPLE)).unwrap();
        let names: Vec<_> = symbols.iter().map(|s| (s.name.as_str(), s.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("PAYROLL", SymbolKind::Program),
                ("WS-TOTAL", SymbolKind::Variable),
                ("MAIN-PARAGRAPH", SymbolKind::Procedure),
                ("COMPUTE-PAY", SymbolKind::Procedure),
            ]
        );

        let program = &symbols[0];
        assert_eq!(program.signature, "PROGRAM-ID. PAYROLL");
        assert_eq!((program.line_start, program.line_end), (2, 19));

        let main = &symbols[2];
        assert_eq!(main.signature, "MAIN-PARAGRAPH.");
        assert_eq!((main.line_start, main.line_end), (9, 16));
        assert_eq!(main.docstring.as_deref(), Some("Entry point of the run."));
        assert_eq!(main.parent, Some(program.id));

        assert_eq!(symbols[1].signature, "01 WS-TOTAL PIC 9(5).");
        assert_eq!(symbols[3].line_end, 19);
    }

    #[test]
    fn test_perform_and_call() {
        let analyzer = CobolAnalyzer::new();
        let file = cobol_file(SAMPLE);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let calls = analyzer.extract_calls(&file, &symbols).unwrap();

        let pairs: Vec<_> = calls
            .iter()
            .map(|c| (c.caller_name.as_str(), c.callee_name.as_str(), c.is_external))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("MAIN-PARAGRAPH", "COMPUTE-PAY", false),
                ("MAIN-PARAGRAPH", "AUDITLOG", true),
            ]
        );
    }

    #[test]
    fn test_paragraph_header_with_trailing_statement() {
        let source = "       PROCEDURE DIVISION.\n       MAIN-PARA. PERFORM WORK-PARA.\n           STOP RUN.\n       WORK-PARA. DISPLAY X.\n           END-IF. EXIT.\n";
        let analyzer = CobolAnalyzer::new();
        let file = cobol_file(source);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let names: Vec<_> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["MAIN-PARA", "WORK-PARA"]);
        assert_eq!(symbols[0].signature, "MAIN-PARA.");
        assert_eq!((symbols[0].line_start, symbols[0].line_end), (2, 3));

        let calls = analyzer.extract_calls(&file, &symbols).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].caller_name, "MAIN-PARA");
        assert_eq!(calls[0].callee_name, "WORK-PARA");
        assert!(!calls[0].is_external);
    }

    #[test]
    fn test_call_outside_paragraph_belongs_to_program() {
        let source = "       PROGRAM-ID. BATCH.\n       PROCEDURE DIVISION.\n           CALL \"SUBPROG\".\n";
        let analyzer = CobolAnalyzer::new();
        let file = cobol_file(source);
        let symbols = analyzer.extract_symbols(&file).unwrap();
        let calls = analyzer.extract_calls(&file, &symbols).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].caller_name, "BATCH");
        assert_eq!(calls[0].callee_name, "SUBPROG");
    }

    #[test]
    fn test_sequence_area_and_comments() {
        assert_eq!(comment_text("000100* A NOTE"), Some("A NOTE"));
        assert_eq!(comment_text("       *> free form"), Some("free form"));
        assert_eq!(comment_text("           MOVE 1 TO X."), None);
        assert_eq!(code_text("000200 MAIN-LOOP."), Some("MAIN-LOOP.".to_string()));
        assert_eq!(
            code_text("    move a to b *> trailing").as_deref(),
            Some("MOVE A TO B")
        );
    }

    #[test]
    fn test_tokenize_skips_noise_and_comments() {
        let tokens = CobolAnalyzer::new()
            .tokenize("       PROCEDURE DIVISION.\n      * gone\n           MOVE WS-A TO WS-B.\n");
        assert_eq!(tokens, vec!["move", "ws-a", "to", "ws-b"]);
    }

    #[test]
    fn test_copybooks() {
        let deps = CobolAnalyzer::new().extract_dependencies(&cobol_file(SAMPLE));
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].target, "EMPREC");
        assert_eq!(deps[0].line, 6);
        assert_eq!(deps[0].kind, DependencyKind::Copybook);
    }
}
