//! Scan configuration.
//!
//! Loaded once (usually from `codeintel.yaml`) and handed to every stage by
//! reference. Every section is optional; missing keys fall back to the
//! defaults documented on each field.

use std::fs;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// File name looked up by the CLI when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "codeintel.yaml";

/// Directories never descended into while collecting files.
pub const SKIPPED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    "build",
    "dist",
];

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanConfig {
    #[serde(default)]
    pub version: String,
    /// Glob patterns for paths to exclude (e.g. `"**/vendor/**"`).
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub duplication: DuplicationConfig,
    #[serde(default)]
    pub smells: SmellConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub stages: StageToggles,
    /// Compiled `excluded_paths`, built on first use.
    #[serde(skip)]
    pub(crate) exclusions: OnceCell<GlobSet>,
}

impl ScanConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ScanConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject thresholds that would make a stage meaningless.
    pub fn validate(&self) -> Result<()> {
        let dup = &self.duplication;
        if !(0.0..=1.0).contains(&dup.similarity_threshold) {
            return Err(ScanError::Config(format!(
                "duplication.similarity_threshold must be within [0, 1], got {}",
                dup.similarity_threshold
            )));
        }
        if dup.min_block_lines == 0 {
            return Err(ScanError::Config(
                "duplication.min_block_lines must be at least 1".to_string(),
            ));
        }
        if self.streaming.batch_size == 0 {
            return Err(ScanError::Config(
                "streaming.batch_size must be at least 1".to_string(),
            ));
        }
        for pattern in &self.excluded_paths {
            Glob::new(pattern).map_err(|e| {
                ScanError::Config(format!("invalid excluded_paths glob {:?}: {}", pattern, e))
            })?;
        }
        Ok(())
    }

    /// Matcher for `excluded_paths`, compiled once per config.
    ///
    /// Invalid patterns are skipped here; `validate` reports them. Edits to
    /// `excluded_paths` after the first call are not picked up.
    pub fn exclusion_matcher(&self) -> &GlobSet {
        self.exclusions.get_or_init(|| {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.excluded_paths {
                if let Ok(glob) = Glob::new(pattern) {
                    builder.add(glob);
                }
            }
            builder.build().unwrap_or_else(|_| GlobSet::empty())
        })
    }

    /// Check if a path should be excluded based on `excluded_paths`.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }
        self.exclusion_matcher().is_match(path)
    }

    /// Render the defaults as YAML, used by `codeintel init`.
    pub fn default_yaml() -> String {
        let config = ScanConfig {
            version: "1".to_string(),
            ..Default::default()
        };
        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

/// Near-duplicate detection parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DuplicationConfig {
    /// Window size in lines for languages without their own minimum (default: 6).
    pub min_block_lines: usize,
    /// Blocks with fewer tokens are discarded (default: 50).
    pub min_tokens: usize,
    /// Estimated Jaccard similarity needed to report a pair (default: 0.8).
    pub similarity_threshold: f64,
}

impl Default for DuplicationConfig {
    fn default() -> Self {
        Self {
            min_block_lines: 6,
            min_tokens: 50,
            similarity_threshold: 0.8,
        }
    }
}

/// Code smell thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmellConfig {
    /// Line span above which a function is a long method (default: 50).
    pub long_method_lines: usize,
    /// Method count above which a class is a god class (default: 20).
    pub god_class_methods: usize,
    /// Line span above which a class is a god class (default: 500).
    pub god_class_lines: usize,
    /// Line span above which a class is large (default: 300).
    pub large_class_lines: usize,
    /// Parameter count above which a signature is too long (default: 5).
    pub long_parameter_list: usize,
    /// External references needed before feature envy is considered (default: 5).
    pub feature_envy_min_external: usize,
    pub detect_large_class: bool,
    pub detect_long_parameter_list: bool,
    pub detect_missing_docstring: bool,
}

impl Default for SmellConfig {
    fn default() -> Self {
        Self {
            long_method_lines: 50,
            god_class_methods: 20,
            god_class_lines: 500,
            large_class_lines: 300,
            long_parameter_list: 5,
            feature_envy_min_external: 5,
            detect_large_class: true,
            detect_long_parameter_list: true,
            detect_missing_docstring: true,
        }
    }
}

/// How call graph nodes are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKeying {
    /// One node per bare symbol name; same-named functions in different
    /// files share a node.
    #[default]
    BareName,
    /// Internal nodes are keyed by `file::name`.
    FileQualified,
}

/// Call graph options.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GraphConfig {
    pub node_keying: NodeKeying,
    /// Names exempt from dead code reporting in addition to the built-in list.
    pub entry_points: Vec<String>,
}

/// Large-file handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Files with more lines than this are delivered in batches (default: 100 000).
    pub line_threshold: usize,
    /// Symbols per batch (default: 1 000).
    pub batch_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            line_threshold: 100_000,
            batch_size: 1_000,
        }
    }
}

/// Per-stage switches. All stages run by default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StageToggles {
    pub call_graph: bool,
    pub duplication: bool,
    pub smells: bool,
    pub complexity: bool,
    pub security: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            call_graph: true,
            duplication: true,
            smells: true,
            complexity: true,
            security: true,
        }
    }
}
