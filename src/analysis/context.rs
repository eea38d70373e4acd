//! Batch symbol extraction over many files.
//!
//! The AnalysisContext provides:
//! - Loading files from disk with paths relative to a base directory
//! - Per-file error isolation (a file that fails to parse is logged and skipped)
//! - Streaming delivery for very large files
//! - Cooperative cancellation between files

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::analysis::streaming::{should_stream, SymbolStream};
use crate::analysis::{get_analyzer_for, Language, SourceFile, Symbol};
use crate::config::StreamingConfig;
use crate::error::{Result, ScanError};

/// A file together with the symbols extracted from it.
#[derive(Debug, Clone)]
pub struct FileSymbols {
    pub file: SourceFile,
    pub symbols: Vec<Symbol>,
}

/// Analysis context for a set of files.
pub struct AnalysisContext {
    /// Base directory for relative path resolution.
    base_dir: PathBuf,
    streaming: StreamingConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl AnalysisContext {
    /// Create a new analysis context.
    pub fn new<P: AsRef<Path>>(base_dir: P, streaming: &StreamingConfig) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            streaming: streaming.clone(),
            cancel: None,
        }
    }

    /// Stop between files once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Get the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Read a file into a `SourceFile` whose id is its path relative to the
    /// base directory.
    ///
    /// Returns `Ok(None)` for files of an unknown language. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<Option<SourceFile>> {
        let path = path.as_ref();
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };

        let Some(language) = Language::from_path(&abs_path) else {
            tracing::trace!(path = %abs_path.display(), "unsupported extension");
            return Ok(None);
        };

        let bytes = fs::read(&abs_path).map_err(|source| ScanError::Io {
            path: abs_path.clone(),
            source,
        })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let rel_path = abs_path
            .strip_prefix(&self.base_dir)
            .unwrap_or(&abs_path)
            .to_string_lossy()
            .replace('\\', "/");
        Ok(Some(SourceFile::new(rel_path, language, content)))
    }

    /// Load many files, logging and skipping the ones that cannot be read.
    ///
    /// Results are sorted by path for deterministic ordering.
    pub fn load_files(&self, paths: &[PathBuf]) -> Vec<SourceFile> {
        let mut files = Vec::new();
        for path in paths {
            if self.is_cancelled() {
                break;
            }
            match self.load_file(path) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "skipping unreadable file"),
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Hand the symbols of one file to `on_batch`, at most
    /// `streaming.batch_size` at a time once the file is large.
    ///
    /// Small files arrive as a single batch. The consumer owns each batch and
    /// may persist and drop it, so it never needs the whole result at once.
    /// Returns the number of symbols delivered.
    pub fn extract_file_batches<F>(&self, file: &SourceFile, mut on_batch: F) -> anyhow::Result<usize>
    where
        F: FnMut(Vec<Symbol>) -> anyhow::Result<()>,
    {
        let analyzer = get_analyzer_for(file.language)
            .ok_or_else(|| ScanError::UnsupportedLanguage(file.language.to_string()))?;

        if !should_stream(&file.content, &self.streaming) {
            let symbols = analyzer.extract_symbols(file)?;
            let count = symbols.len();
            on_batch(symbols)?;
            return Ok(count);
        }

        let mut stream = SymbolStream::new(analyzer, file, self.streaming.batch_size);
        let mut count = 0;
        for batch in stream.by_ref() {
            tracing::debug!(path = %file.path, batch = batch.len(), "received symbol batch");
            count += batch.len();
            on_batch(batch)?;
        }
        match stream.take_error() {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Extract all symbols of one file into memory.
    ///
    /// The full list is collected even when the file is delivered in batches;
    /// use `extract_file_batches` to keep only one batch alive.
    pub fn extract_file(&self, file: &SourceFile) -> anyhow::Result<Vec<Symbol>> {
        let mut symbols = Vec::new();
        self.extract_file_batches(file, |batch| {
            symbols.extend(batch);
            Ok(())
        })?;
        Ok(symbols)
    }

    /// Extract symbols from every file, sequentially and in input order.
    ///
    /// A file that fails to parse is logged with its error and left out of
    /// the result; the remaining files are still processed.
    pub fn extract_all(&self, files: &[SourceFile]) -> Vec<FileSymbols> {
        let mut extracted = Vec::with_capacity(files.len());
        for file in files {
            if self.is_cancelled() {
                tracing::info!(done = extracted.len(), "symbol extraction cancelled");
                break;
            }
            match self.extract_file(file) {
                Ok(symbols) => {
                    tracing::debug!(path = %file.path, symbols = symbols.len(), "extracted symbols");
                    extracted.push(FileSymbols {
                        file: file.clone(),
                        symbols,
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %file.path, error = %e, "failed to extract symbols, skipping file");
                }
            }
        }
        extracted
    }
}
