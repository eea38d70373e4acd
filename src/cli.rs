//! Command-line interface for codeintel.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use walkdir::WalkDir;

use crate::analysis::{get_analyzer_for, registered_extensions, AnalysisContext};
use crate::config::{NodeKeying, ScanConfig, DEFAULT_CONFIG_FILE, SKIPPED_DIRS};
use crate::detect::{Runner, Severity};
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Multi-language static analysis for Python, C, assembly and COBOL.
///
/// Extracts symbols and call graphs, then reports dead code, call cycles,
/// near-duplicate blocks, code smells, complexity metrics and likely
/// security issues.
#[derive(Parser)]
#[command(name = "codeintel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run every analysis stage over a file or directory
    #[command(visible_alias = "analyze")]
    Scan(ScanArgs),
    /// Print the symbols extracted from one file
    Symbols(SymbolsArgs),
    /// Write a default configuration file
    Init(InitArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Path to scan (file or directory)
    pub path: PathBuf,

    /// Path to configuration YAML (default: ./codeintel.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Exit with 1 when any finding is at or above this severity
    #[arg(long, value_name = "SEVERITY")]
    pub fail_on: Option<Severity>,

    /// Key call graph nodes by file and name instead of bare name
    #[arg(long)]
    pub file_qualified: bool,
}

/// Arguments for the symbols command.
#[derive(Parser)]
pub struct SymbolsArgs {
    /// Source file to inspect
    pub file: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "pretty")]
    pub format: OutputFormat,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Load the configuration named on the command line, or the default file
/// in the current directory, or built-in defaults.
fn load_config(explicit: Option<&Path>) -> anyhow::Result<ScanConfig> {
    if let Some(path) = explicit {
        return ScanConfig::parse_file(path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    let default = Path::new(DEFAULT_CONFIG_FILE);
    if default.exists() {
        tracing::debug!(path = %default.display(), "using config from working directory");
        return ScanConfig::parse_file(default)
            .with_context(|| format!("loading config {}", default.display()));
    }
    Ok(ScanConfig::default())
}

fn is_skipped_dir(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

/// Collect supported source files under `root`, relative to `root`.
///
/// Skips the standard tool and build directories and any path matching the
/// configured exclusion globs. Output is sorted for reproducible scans.
pub fn collect_files(root: &Path, config: &ScanConfig) -> anyhow::Result<Vec<PathBuf>> {
    let extensions = registered_extensions();
    let excluded = config.exclusion_matcher();

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let skipped = e.depth() > 0
                && e.file_type().is_dir()
                && is_skipped_dir(&e.file_name().to_string_lossy());
            !skipped
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !extensions.contains(&ext.as_str()) {
            tracing::trace!(path = %path.display(), "unsupported extension");
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        if excluded.is_match(&relative) {
            tracing::debug!(path = %relative.display(), "excluded by config");
            continue;
        }
        files.push(relative);
    }
    files.sort();
    Ok(files)
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            colored::control::set_override(false);
            let file = File::create(path)
                .with_context(|| format!("creating output file {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

/// Run the scan command.
pub fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    let mut config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };
    if args.file_qualified {
        config.graph.node_keying = NodeKeying::FileQualified;
    }

    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };

    let (base_dir, files) = if metadata.is_dir() {
        let files = collect_files(&args.path, &config)?;
        (args.path.clone(), files)
    } else {
        let base = args
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let name = args
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| args.path.clone());
        (base, vec![name])
    };
    tracing::info!(path = %args.path.display(), files = files.len(), "collected files");

    let report = Runner::new(&config).scan_paths(&base_dir, &files);

    let path_str = args.path.to_string_lossy().to_string();
    let mut out = open_output(args.output.as_deref())?;
    match args.format {
        OutputFormat::Json => report::write_json(&mut out, &path_str, &report)?,
        OutputFormat::Pretty => report::write_pretty(&mut out, &path_str, &report)?,
    }
    out.flush()?;

    match args.fail_on {
        Some(threshold) if report.count_at_or_above(threshold) > 0 => Ok(EXIT_FAILED),
        _ => Ok(EXIT_SUCCESS),
    }
}

/// Run the symbols command.
pub fn run_symbols(args: &SymbolsArgs) -> anyhow::Result<i32> {
    let base = args.file.parent().unwrap_or_else(|| Path::new(""));
    let ctx = AnalysisContext::new(base, &ScanConfig::default().streaming);
    let name = args
        .file
        .file_name()
        .map(Path::new)
        .unwrap_or(args.file.as_path());

    let file = match ctx.load_file(name) {
        Ok(Some(file)) => file,
        Ok(None) => {
            eprintln!("Error: unsupported file type: {}", args.file.display());
            return Ok(EXIT_ERROR);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    let Some(analyzer) = get_analyzer_for(file.language) else {
        eprintln!("Error: no analyzer for {}", file.language);
        return Ok(EXIT_ERROR);
    };
    let symbols = analyzer
        .extract_symbols(&file)
        .with_context(|| format!("extracting symbols from {}", args.file.display()))?;

    let mut out = io::stdout().lock();
    match args.format {
        OutputFormat::Json => report::write_symbols_json(&mut out, &symbols)?,
        OutputFormat::Pretty => {
            report::write_symbols_pretty(&mut out, &args.file.to_string_lossy(), &symbols)?
        }
    }
    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Use --force to overwrite it");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, ScanConfig::default_yaml()) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to tune thresholds and exclusions", args.output.display());
    println!("  2. Run: codeintel scan . --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_skips_dirs_and_unsupported() {
        crate::analysis::register_analyzers();
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::write(root.join("src/app.py"), "def f():\n    pass\n").unwrap();
        fs::write(root.join("src/lib.c"), "int g(void) { return 0; }\n").unwrap();
        fs::write(root.join("node_modules/pkg/x.py"), "x = 1\n").unwrap();
        fs::write(root.join("__pycache__/y.py"), "y = 1\n").unwrap();
        fs::write(root.join("README.md"), "# readme\n").unwrap();

        let files = collect_files(root, &ScanConfig::default()).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("src/app.py"), PathBuf::from("src/lib.c")]
        );
    }

    #[test]
    fn test_collect_files_honours_exclusions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("main.py"), "def main():\n    pass\n").unwrap();
        fs::write(root.join("vendor/dep.py"), "def dep():\n    pass\n").unwrap();

        let config = ScanConfig {
            excluded_paths: vec!["vendor/**".to_string()],
            ..Default::default()
        };
        let files = collect_files(root, &config).unwrap();
        assert_eq!(files, vec![PathBuf::from("main.py")]);
    }

    #[test]
    fn test_cli_parses_fail_on() {
        let cli = Cli::parse_from(["codeintel", "scan", ".", "--fail-on", "high", "--format", "json"]);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.fail_on, Some(Severity::High));
                assert_eq!(args.format, OutputFormat::Json);
                assert!(!args.file_qualified);
            }
            _ => panic!("expected scan"),
        }
    }
}
