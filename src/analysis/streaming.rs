//! Bounded-batch symbol delivery for very large files.
//!
//! Extraction still parses the whole file in one go; what is bounded is how
//! many symbols a consumer holds at once. Each batch is moved out of the
//! extracted list so it can be persisted and dropped.

use std::collections::VecDeque;

use crate::analysis::{LanguageAnalyzer, SourceFile, Symbol};
use crate::config::StreamingConfig;

/// Whether a file is large enough to be delivered in batches.
pub fn should_stream(content: &str, config: &StreamingConfig) -> bool {
    content.lines().count() > config.line_threshold
}

/// Iterator over symbol batches of a single file.
///
/// Extraction runs lazily on the first call to `next`. A failed extraction
/// is available through `take_error` and ends the stream.
pub struct SymbolStream<'a> {
    analyzer: &'a dyn LanguageAnalyzer,
    file: &'a SourceFile,
    batch_size: usize,
    pending: Option<VecDeque<Symbol>>,
    error: Option<anyhow::Error>,
}

impl<'a> SymbolStream<'a> {
    pub fn new(analyzer: &'a dyn LanguageAnalyzer, file: &'a SourceFile, batch_size: usize) -> Self {
        Self {
            analyzer,
            file,
            batch_size: batch_size.max(1),
            pending: None,
            error: None,
        }
    }

    /// The extraction error, if extraction failed.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn load(&mut self) -> &mut VecDeque<Symbol> {
        if self.pending.is_none() {
            let symbols = match self.analyzer.extract_symbols(self.file) {
                Ok(symbols) => symbols,
                Err(e) => {
                    self.error = Some(e);
                    Vec::new()
                }
            };
            tracing::debug!(
                path = %self.file.path,
                symbols = symbols.len(),
                batch_size = self.batch_size,
                "streaming symbols"
            );
            self.pending = Some(symbols.into());
        }
        self.pending.get_or_insert_with(VecDeque::new)
    }
}

impl Iterator for SymbolStream<'_> {
    type Item = Vec<Symbol>;

    fn next(&mut self) -> Option<Self::Item> {
        let batch_size = self.batch_size;
        let pending = self.load();
        if pending.is_empty() {
            return None;
        }
        let take = batch_size.min(pending.len());
        Some(pending.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{get_analyzer_for, Language};

    fn many_functions(count: usize) -> String {
        (0..count)
            .map(|i| format!("def f{}():\n    return {}\n", i, i))
            .collect()
    }

    #[test]
    fn test_should_stream_threshold() {
        let config = StreamingConfig {
            line_threshold: 3,
            batch_size: 10,
        };
        assert!(!should_stream("a\nb\nc\n", &config));
        assert!(should_stream("a\nb\nc\nd\n", &config));
    }

    #[test]
    fn test_batches_cover_every_symbol_in_order() {
        let file = SourceFile::new("big.py", Language::Python, many_functions(25));
        let analyzer = get_analyzer_for(Language::Python).unwrap();
        let expected = analyzer.extract_symbols(&file).unwrap();

        let batches: Vec<Vec<Symbol>> = SymbolStream::new(analyzer, &file, 10).collect();
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10, 5]);
        let flattened: Vec<Symbol> = batches.into_iter().flatten().collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn test_parse_error_ends_stream() {
        let file = SourceFile::new("bad.py", Language::Python, "def broken(:\n");
        let analyzer = get_analyzer_for(Language::Python).unwrap();
        let mut stream = SymbolStream::new(analyzer, &file, 10);
        assert!(stream.next().is_none());
        assert!(stream.take_error().is_some());
    }
}
