//! Line-oriented security rule scanning.
//!
//! Rules are grouped by vulnerability class. Each rule names the languages
//! it applies to (an empty list means every language); the tables are
//! compiled once and never mutated.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use super::types::{Confidence, SecurityIssue, Severity, VulnerabilityClass};
use crate::analysis::SourceFile;

const ANY: &[&str] = &[];
const PYTHON: &[&str] = &["python"];
const PYTHON_JS: &[&str] = &["python", "javascript"];
const C_FAMILY: &[&str] = &["c", "cpp"];
const COBOL: &[&str] = &["cobol"];
const ASSEMBLY: &[&str] = &["assembly"];
const WEB: &[&str] = &["javascript", "typescript"];

/// A single pattern of a rule class.
struct Rule {
    pattern: Regex,
    description: &'static str,
    languages: &'static [&'static str],
}

impl Rule {
    fn applies_to(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.contains(&language)
    }
}

/// All rules of one vulnerability class plus the metadata every finding
/// of that class carries.
struct RuleSet {
    class: VulnerabilityClass,
    severity: Severity,
    confidence: Confidence,
    cwe: &'static str,
    owasp: &'static str,
    recommendation: &'static str,
    /// Languages the class is checked for at all; empty means every one.
    languages: &'static [&'static str],
    rules: Vec<Rule>,
}

fn rules(
    entries: &[(&'static str, &'static str, &'static [&'static str])],
    case_insensitive: bool,
) -> Vec<Rule> {
    entries
        .iter()
        .map(|(pattern, description, languages)| Rule {
            pattern: RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .unwrap(),
            description: *description,
            languages: *languages,
        })
        .collect()
}

static RULE_SETS: Lazy<Vec<RuleSet>> = Lazy::new(|| {
    vec![
        RuleSet {
            class: VulnerabilityClass::SqlInjection,
            severity: Severity::Critical,
            confidence: Confidence::High,
            cwe: "CWE-89",
            owasp: "A03:2021 - Injection",
            recommendation: "Use parameterized queries or prepared statements. Never concatenate user input into SQL strings.",
            languages: ANY,
            rules: rules(
                &[
                    (r#"(execute|cursor\.execute|executemany)\s*\(\s*["'].*%s.*["']"#, "Python SQL string formatting", PYTHON),
                    (r"(execute|cursor\.execute|executemany)\s*\(\s*.*\+\s*", "Python SQL string concatenation", PYTHON),
                    (r#"(execute|cursor\.execute|executemany)\s*\(\s*f["']"#, "Python SQL f-string", PYTHON),
                    (r"sprintf\s*\([^)]*\b(SELECT|INSERT|UPDATE|DELETE|DROP|ALTER)\b", "C SQL injection via sprintf", C_FAMILY),
                    (r"strcat\s*\([^)]*\b(SELECT|INSERT|UPDATE|DELETE|DROP|ALTER)\b", "C SQL injection via strcat", C_FAMILY),
                    (r"EXEC\s+SQL.*:(\w+)", "COBOL dynamic SQL variable", COBOL),
                    (r"STRING\s+.*\bSELECT\b.*INTO", "COBOL SQL string concatenation", COBOL),
                    (r"EXEC\s+SQL\s+PREPARE.*FROM\s+:(\w+)", "COBOL prepared statement with variable", COBOL),
                ],
                true,
            ),
        },
        RuleSet {
            class: VulnerabilityClass::HardcodedSecret,
            severity: Severity::High,
            confidence: Confidence::Medium,
            cwe: "CWE-798",
            owasp: "A07:2021 - Identification and Authentication Failures",
            recommendation: "Store secrets in environment variables or secure vaults (e.g., AWS Secrets Manager, HashiCorp Vault).",
            languages: ANY,
            rules: rules(
                &[
                    (r#"["']([A-Za-z0-9_-]{40,})["']"#, "API Key", ANY),
                    (r#"api[_-]?key\s*=\s*["']([^"']+)["']"#, "API Key assignment", ANY),
                    (r#"password\s*=\s*["']([^"']{8,})["']"#, "Hardcoded password", ANY),
                    (r#"passwd\s*=\s*["']([^"']{8,})["']"#, "Hardcoded password", ANY),
                    (r#"pwd\s*=\s*["']([^"']{8,})["']"#, "Hardcoded password", ANY),
                    (r"AKIA[0-9A-Z]{16}", "AWS Access Key", ANY),
                    (r#"aws_secret_access_key\s*=\s*["']([^"']+)["']"#, "AWS Secret Key", ANY),
                    (r"(postgresql|mysql|mongodb)://[^:]+:([^@]+)@", "Database password in connection string", ANY),
                    (r"-----BEGIN (RSA |DSA )?PRIVATE KEY-----", "Private key", ANY),
                    (r#"token\s*=\s*["']([A-Za-z0-9_-]{30,})["']"#, "Hardcoded token", ANY),
                    (r"bearer\s+[A-Za-z0-9_-]{30,}", "Bearer token", ANY),
                    (r#"(PASSWORD|PASSWD|PWD)\s+PIC\s+X.*VALUE\s+['"]([^'"]{8,})"#, "COBOL hardcoded password", COBOL),
                    (r#"(API-KEY|APIKEY|TOKEN)\s+PIC\s+X.*VALUE\s+['"]([^'"]{20,})"#, "COBOL hardcoded API key", COBOL),
                    (r#"(password|passwd|pwd).*db\s+['"]([^'"]{8,})"#, "Assembly hardcoded password in .data", ASSEMBLY),
                    (r#"(api_key|apikey|token).*db\s+['"]([^'"]{20,})"#, "Assembly hardcoded API key", ASSEMBLY),
                ],
                true,
            ),
        },
        RuleSet {
            class: VulnerabilityClass::CommandInjection,
            severity: Severity::Critical,
            confidence: Confidence::Medium,
            cwe: "CWE-78",
            owasp: "A03:2021 - Injection",
            recommendation: "Avoid shell=True. Use subprocess with argument lists. Validate and sanitize all user input. For execve(), ensure arguments are properly validated.",
            languages: ANY,
            rules: rules(
                &[
                    (r"os\.system\s*\(.*\+", "os.system with string concatenation", PYTHON),
                    (r#"os\.system\s*\(\s*f["']"#, "os.system with f-string", PYTHON),
                    (r"subprocess\.(call|run|Popen)\s*\(.*shell\s*=\s*True", "subprocess with shell=True", PYTHON),
                    (r"exec\s*\(", "exec() with dynamic code", PYTHON),
                    (r"eval\s*\(", "eval() with dynamic code", PYTHON_JS),
                    (r"system\s*\(", "C system() call", C_FAMILY),
                    (r"popen\s*\(", "C popen() call", C_FAMILY),
                    (r"execve?\s*\([^)]*argv", "execve() with potentially unsafe input", C_FAMILY),
                    (r#"CALL\s+['"]SYSTEM['"]\s+USING"#, "COBOL CALL SYSTEM with parameter", COBOL),
                    (r#"CALL\s+['"]CBL_EXEC_RUN_CMD['"].*USING"#, "COBOL execute command with parameter", COBOL),
                    (r"int\s+0x80.*eax.*0xb", "Assembly execve syscall (potential command injection)", ASSEMBLY),
                    (r"syscall.*__NR_execve", "Assembly execve syscall (potential command injection)", ASSEMBLY),
                ],
                true,
            ),
        },
        RuleSet {
            class: VulnerabilityClass::PathTraversal,
            severity: Severity::High,
            confidence: Confidence::Medium,
            cwe: "CWE-22",
            owasp: "A01:2021 - Broken Access Control",
            recommendation: "Validate file paths. Use os.path.abspath() and check if path starts with allowed directory. In C, use realpath() and validate paths.",
            languages: ANY,
            rules: rules(
                &[
                    (r"(fopen|open|fread|fwrite|remove|unlink)\s*\([^)]*\.\.", "File operation with path traversal (../)", C_FAMILY),
                    (r"open\s*\(.*\+", "File open with concatenation (potential path traversal)", PYTHON),
                    (r"(OPEN|READ|WRITE)\s+(INPUT|OUTPUT)\s+\w+.*\.\.", "COBOL file operation with path traversal (../)", COBOL),
                    (r"SELECT\s+\w+\s+ASSIGN.*STRING\s+.*\+", "COBOL dynamic file path (potential traversal)", COBOL),
                    (r"int\s+0x80.*eax.*(0x5|0x3|0x4).*ebx.*\.\.", "Assembly file syscall with path traversal", ASSEMBLY),
                ],
                true,
            ),
        },
        RuleSet {
            class: VulnerabilityClass::BufferOverflow,
            severity: Severity::Critical,
            confidence: Confidence::Medium,
            cwe: "CWE-120",
            owasp: "A03:2021 - Injection",
            recommendation: "Use safe string functions (strncpy, snprintf, fgets). Always check buffer bounds. In Assembly, validate all memory operations.",
            languages: &["c", "cpp", "assembly", "cobol"],
            rules: rules(
                &[
                    (r"gets\s*\(", "Unsafe gets() - buffer overflow risk", C_FAMILY),
                    (r"strcpy\s*\(", "Unsafe strcpy() - no bounds checking", C_FAMILY),
                    (r"strcat\s*\(", "Unsafe strcat() - no bounds checking", C_FAMILY),
                    (r"sprintf\s*\(", "Unsafe sprintf() - use snprintf instead", C_FAMILY),
                    (r"scanf\s*\([^)]*%s", "Unsafe scanf with %s - buffer overflow risk", C_FAMILY),
                    (r"rep\s+movs[bwd]", "Assembly unchecked memory copy (rep movs)", ASSEMBLY),
                    (r"(push|pop)\s+.*esp.*add.*esp", "Assembly manual stack manipulation (potential overflow)", ASSEMBLY),
                    (r"STRING\s+.*DELIMITED.*INTO\s+\w+\s+ON\s+OVERFLOW", "COBOL STRING operation without overflow handling", COBOL),
                ],
                true,
            ),
        },
        RuleSet {
            class: VulnerabilityClass::Xss,
            severity: Severity::High,
            confidence: Confidence::Medium,
            cwe: "CWE-79",
            owasp: "A03:2021 - Injection",
            recommendation: "Always escape user input before rendering in HTML. Use templating engines with auto-escaping.",
            languages: &["python", "javascript", "typescript"],
            rules: rules(
                &[
                    (r"(render_template|render_to_string)\s*\(.*\{.*\}", "Template rendering with unsafe variables", PYTHON),
                    (r"innerHTML\s*=", "Direct innerHTML assignment", WEB),
                    (r"document\.write\s*\(", "document.write (XSS risk)", WEB),
                    (r"eval\s*\(.*request\.", "eval with user input", WEB),
                    (r"\.html\s*\(.*\+", "jQuery .html() with concatenation", WEB),
                    (r"dangerouslySetInnerHTML", "React dangerouslySetInnerHTML", WEB),
                ],
                false,
            ),
        },
    ]
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

/// ORM query-builder calls and debug formatting that look like SQL or HTML
/// building but are not.
static ORM_SAFE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"\.query\(",
        r"\.filter\(",
        r"\.filter_by\(",
        r"mapped_column\(",
        r"relationship\(",
        r"Mapped\[",
        r"__repr__",
        r"__str__",
        r#"f["']<.*>.*["']"#,
    ])
});

static C_PREPROCESSOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#\s*(include|define|if|endif|pragma|undef)").unwrap());

static ASM_DIRECTIVES: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile_all(&[
        r"^\s*%include",
        r"^\s*\.include",
        r"^\s*INCLUDE",
        r"^\s*\.data",
        r"^\s*\.text",
        r"^\s*\.bss",
    ])
});

static COBOL_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:\s*\*|.{6}\*)").unwrap());

static SECRET_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']([A-Za-z0-9_-]{12,})["']"#).unwrap());

/// Substrings of a lowercased line that mark a secret match as a sample
/// value or an indirection.
const SECRET_FALSE_POSITIVES: &[&str] = &[
    "example",
    "test",
    "dummy",
    "placeholder",
    "xxx",
    "sample",
    "default",
    "todo",
    "fixme",
    "your_",
    "<your",
    "secret_key",
    "os.environ",
    "getenv",
];

/// Replace quoted secret-looking values with a fixed marker.
pub fn redact_secrets(line: &str) -> String {
    SECRET_VALUE
        .replace_all(line, "\"***REDACTED***\"")
        .into_owned()
}

fn is_directive(line: &str, language: &str) -> bool {
    match language {
        "c" | "cpp" => C_PREPROCESSOR.is_match(line),
        "assembly" => ASM_DIRECTIVES.iter().any(|re| re.is_match(line)),
        _ => false,
    }
}

/// Whether `line` is a whole-line comment in `language`.
fn is_comment_line(line: &str, language: &str) -> bool {
    let trimmed = line.trim_start();
    let block_comment = trimmed.starts_with("/*")
        || trimmed == "*"
        || trimmed.starts_with("* ")
        || trimmed.starts_with("*/");
    match language {
        "python" => trimmed.starts_with('#'),
        "c" | "cpp" | "javascript" | "typescript" => trimmed.starts_with("//") || block_comment,
        "assembly" => trimmed.starts_with(';') || trimmed.starts_with("//"),
        "cobol" => COBOL_COMMENT.is_match(line),
        _ => false,
    }
}

fn is_orm_safe(line: &str) -> bool {
    ORM_SAFE.iter().any(|re| re.is_match(line))
}

fn is_comment_leading(line: &str) -> bool {
    let trimmed = line.trim();
    ["#", "//", "/*", "*"].iter().any(|p| trimmed.starts_with(p))
}

fn is_sample_secret(line: &str) -> bool {
    let lower = line.to_lowercase();
    SECRET_FALSE_POSITIVES.iter().any(|fp| lower.contains(fp))
}

fn describe(class: VulnerabilityClass, description: &str) -> String {
    match class {
        VulnerabilityClass::SqlInjection => format!("Potential SQL injection: {}", description),
        VulnerabilityClass::HardcodedSecret => format!("Hardcoded {} detected", description),
        VulnerabilityClass::CommandInjection => {
            format!("Potential command injection: {}", description)
        }
        VulnerabilityClass::Xss => format!("Potential XSS: {}", description),
        VulnerabilityClass::PathTraversal | VulnerabilityClass::BufferOverflow => {
            description.to_string()
        }
    }
}

/// Scans file content against the rule tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityScanner;

impl SecurityScanner {
    pub fn new() -> Self {
        Self
    }

    /// Scan a file using its detected language.
    pub fn scan_file(&self, file: &SourceFile) -> Vec<SecurityIssue> {
        self.scan(&file.content, file.language.as_str())
    }

    /// Scan content tagged with a lowercase language name.
    ///
    /// Tags outside the engine's own languages (`cpp`, `javascript`,
    /// `typescript`) select the rules written for them. Findings are unique
    /// by class, line and description.
    pub fn scan(&self, content: &str, language_tag: &str) -> Vec<SecurityIssue> {
        let language = language_tag.trim().to_lowercase();
        let lines: Vec<&str> = content.split('\n').collect();
        let skipped: Vec<bool> = lines
            .iter()
            .map(|line| is_comment_line(line, &language) || is_directive(line, &language))
            .collect();

        let mut issues = Vec::new();
        for set in RULE_SETS.iter() {
            if !set.languages.is_empty() && !set.languages.contains(&language.as_str()) {
                continue;
            }
            self.scan_class(set, &lines, &skipped, &language, &mut issues);
        }

        let mut seen = HashSet::new();
        issues.retain(|issue: &SecurityIssue| {
            seen.insert((issue.kind, issue.line, issue.description.clone()))
        });
        issues
    }

    fn scan_class(
        &self,
        set: &RuleSet,
        lines: &[&str],
        skipped: &[bool],
        language: &str,
        out: &mut Vec<SecurityIssue>,
    ) {
        let is_secret = set.class == VulnerabilityClass::HardcodedSecret;
        let skip_orm = matches!(set.class, VulnerabilityClass::SqlInjection | VulnerabilityClass::Xss);

        for (idx, line) in lines.iter().enumerate() {
            if skipped[idx] || (is_secret && is_comment_leading(line)) {
                continue;
            }
            if skip_orm && is_orm_safe(line) {
                continue;
            }

            for rule in set.rules.iter().filter(|r| r.applies_to(language)) {
                if !rule.pattern.is_match(line) {
                    continue;
                }
                if is_secret && is_sample_secret(line) {
                    continue;
                }
                let snippet = if is_secret {
                    redact_secrets(line.trim())
                } else {
                    line.trim().to_string()
                };
                out.push(SecurityIssue {
                    kind: set.class,
                    severity: set.severity,
                    line: idx + 1,
                    cwe_id: set.cwe.to_string(),
                    owasp_category: set.owasp.to_string(),
                    confidence: set.confidence,
                    description: describe(set.class, rule.description),
                    recommendation: set.recommendation.to_string(),
                    snippet,
                });
            }
        }
    }
}
