//! Near-duplicate block detection with MinHash and LSH banding.
//!
//! Each file is cut into overlapping windows of lines. A window's token set
//! is summarised by a 128-slot MinHash; windows from different files that
//! share any of the 32 four-slot bands become candidates, and a candidate is
//! reported when the fraction of equal slots reaches the threshold.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

use crate::analysis::{get_analyzer_for, SourceFile};
use crate::config::DuplicationConfig;

/// Number of MinHash slots.
pub const NUM_HASHES: usize = 128;
/// LSH bands; `NUM_BANDS * ROWS_PER_BAND == NUM_HASHES`.
pub const NUM_BANDS: usize = 32;
pub const ROWS_PER_BAND: usize = 4;

const SNIPPET_CHARS: usize = 500;

/// A window of lines prepared for matching.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub file_id: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub tokens: Vec<String>,
    pub signature: [u64; NUM_HASHES],
}

impl CodeBlock {
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    fn key(&self) -> (&str, usize) {
        (self.file_id.as_str(), self.start_line)
    }
}

/// A pair of near-identical blocks in two files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duplication {
    pub file1_id: String,
    pub start_line1: usize,
    pub end_line1: usize,
    pub file2_id: String,
    pub start_line2: usize,
    pub end_line2: usize,
    pub similarity: f64,
    pub duplicated_lines: usize,
    pub duplicated_tokens: usize,
    pub snippet: String,
    /// Hex digest of the first block's MinHash.
    pub signature: String,
}

/// MinHash signature of a token set.
///
/// Slot `i` holds the smallest xxh3 hash of any token under seed `i`. An
/// empty set yields all `u64::MAX`.
pub fn minhash<'a>(tokens: impl IntoIterator<Item = &'a str>) -> [u64; NUM_HASHES] {
    let unique: BTreeSet<&str> = tokens.into_iter().collect();
    let mut signature = [u64::MAX; NUM_HASHES];
    for token in unique {
        for (seed, slot) in signature.iter_mut().enumerate() {
            let h = xxh3_64_with_seed(token.as_bytes(), seed as u64);
            if h < *slot {
                *slot = h;
            }
        }
    }
    signature
}

/// Estimated Jaccard similarity: the fraction of equal slots.
pub fn signature_similarity(a: &[u64; NUM_HASHES], b: &[u64; NUM_HASHES]) -> f64 {
    let equal = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    equal as f64 / NUM_HASHES as f64
}

fn band_hashes(signature: &[u64; NUM_HASHES]) -> impl Iterator<Item = (usize, u64)> + '_ {
    signature
        .chunks(ROWS_PER_BAND)
        .enumerate()
        .map(|(band, rows)| {
            let bytes: Vec<u8> = rows.iter().flat_map(|r| r.to_le_bytes()).collect();
            (band, xxh3_64(&bytes))
        })
}

fn signature_hex(signature: &[u64; NUM_HASHES]) -> String {
    let bytes: Vec<u8> = signature.iter().flat_map(|r| r.to_le_bytes()).collect();
    format!("{:016x}", xxh3_64(&bytes))
}

/// Finds near-duplicate blocks across files.
pub struct DuplicationDetector<'a> {
    config: &'a DuplicationConfig,
}

impl<'a> DuplicationDetector<'a> {
    pub fn new(config: &'a DuplicationConfig) -> Self {
        Self { config }
    }

    /// Cut a file into candidate blocks.
    ///
    /// The window is the language's minimum block size and the stride is
    /// half of it. Blank windows and windows below `min_tokens` are dropped.
    pub fn extract_blocks(&self, file: &SourceFile) -> Vec<CodeBlock> {
        let Some(analyzer) = get_analyzer_for(file.language) else {
            return Vec::new();
        };
        let window = analyzer.min_block_lines(self.config.min_block_lines).max(1);
        let stride = (window / 2).max(1);
        let lines = file.lines();
        if lines.len() < window {
            return Vec::new();
        }

        let mut blocks = Vec::new();
        for start in (0..=lines.len() - window).step_by(stride) {
            let text = lines[start..start + window].join("\n");
            if text.trim().is_empty() {
                continue;
            }
            let tokens = analyzer.tokenize(&text);
            if tokens.len() < self.config.min_tokens {
                continue;
            }
            let signature = minhash(tokens.iter().map(String::as_str));
            blocks.push(CodeBlock {
                file_id: file.path.clone(),
                start_line: start + 1,
                end_line: start + window,
                text,
                tokens,
                signature,
            });
        }
        blocks
    }

    /// Report every cross-file block pair at or above the similarity
    /// threshold, most similar first.
    pub fn find_duplicates(&self, files: &[SourceFile]) -> Vec<Duplication> {
        let blocks: Vec<CodeBlock> = files.iter().flat_map(|f| self.extract_blocks(f)).collect();
        tracing::debug!(blocks = blocks.len(), "duplication blocks extracted");

        let mut buckets: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
        for (idx, block) in blocks.iter().enumerate() {
            for band in band_hashes(&block.signature) {
                buckets.entry(band).or_default().push(idx);
            }
        }

        let mut candidates: HashSet<(usize, usize)> = HashSet::new();
        for members in buckets.values() {
            for (i, &a) in members.iter().enumerate() {
                for &b in &members[i + 1..] {
                    if blocks[a].file_id == blocks[b].file_id {
                        continue;
                    }
                    let pair = if blocks[a].key() <= blocks[b].key() {
                        (a, b)
                    } else {
                        (b, a)
                    };
                    candidates.insert(pair);
                }
            }
        }

        let mut duplicates: Vec<Duplication> = candidates
            .into_iter()
            .filter_map(|(a, b)| {
                let (first, second) = (&blocks[a], &blocks[b]);
                let similarity = signature_similarity(&first.signature, &second.signature);
                if similarity < self.config.similarity_threshold {
                    return None;
                }
                Some(Duplication {
                    file1_id: first.file_id.clone(),
                    start_line1: first.start_line,
                    end_line1: first.end_line,
                    file2_id: second.file_id.clone(),
                    start_line2: second.start_line,
                    end_line2: second.end_line,
                    similarity,
                    duplicated_lines: first.line_count().min(second.line_count()),
                    duplicated_tokens: first.tokens.len().min(second.tokens.len()),
                    snippet: first.text.chars().take(SNIPPET_CHARS).collect(),
                    signature: signature_hex(&first.signature),
                })
            })
            .collect();

        duplicates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.file1_id.cmp(&b.file1_id))
                .then(a.start_line1.cmp(&b.start_line1))
                .then_with(|| a.file2_id.cmp(&b.file2_id))
                .then(a.start_line2.cmp(&b.start_line2))
        });
        tracing::info!(pairs = duplicates.len(), "duplication scan complete");
        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Language;

    const DENSE_LINE: &str = "    total = alpha_one + beta_two + gamma_three + delta_four + epsilon_five + zeta_six + eta_seven + theta_eight";

    fn dense_block(suffix: &str) -> String {
        (0..6)
            .map(|i| format!("{} + row{}_{}\n", DENSE_LINE, i, suffix))
            .collect()
    }

    #[test]
    fn test_minhash_identity_and_disjoint() {
        let a = minhash(["alpha", "beta", "gamma"]);
        let b = minhash(["gamma", "beta", "alpha", "alpha"]);
        assert_eq!(signature_similarity(&a, &b), 1.0);

        let c = minhash(["delta", "epsilon", "zeta"]);
        assert!(signature_similarity(&a, &c) < 0.2);
    }

    #[test]
    fn test_blocks_respect_window_and_token_floor() {
        let config = DuplicationConfig::default();
        let detector = DuplicationDetector::new(&config);

        let file = SourceFile::new("a.py", Language::Python, dense_block("x"));
        let blocks = detector.extract_blocks(&file);
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start_line, blocks[0].end_line), (1, 6));
        assert!(blocks[0].tokens.len() >= 50);

        let sparse = SourceFile::new("b.py", Language::Python, "x = 1\n".repeat(12));
        assert!(detector.extract_blocks(&sparse).is_empty());
    }

    #[test]
    fn test_identical_blocks_in_two_files() {
        let config = DuplicationConfig::default();
        let files = vec![
            SourceFile::new("a.py", Language::Python, dense_block("same")),
            SourceFile::new("b.py", Language::Python, dense_block("same")),
        ];
        let dups = DuplicationDetector::new(&config).find_duplicates(&files);
        assert_eq!(dups.len(), 1);
        let dup = &dups[0];
        assert_eq!(dup.file1_id, "a.py");
        assert_eq!(dup.file2_id, "b.py");
        assert_eq!(dup.similarity, 1.0);
        assert_eq!(dup.duplicated_lines, 6);
        assert_eq!(dup.signature.len(), 16);
    }

    #[test]
    fn test_same_file_never_pairs() {
        let config = DuplicationConfig::default();
        let content = format!("{}{}", dense_block("same"), dense_block("same"));
        let files = vec![SourceFile::new("a.py", Language::Python, content)];
        assert!(DuplicationDetector::new(&config).find_duplicates(&files).is_empty());
    }

    #[test]
    fn test_lower_threshold_reports_superset() {
        let files = vec![
            SourceFile::new("a.py", Language::Python, dense_block("left")),
            SourceFile::new("b.py", Language::Python, dense_block("right")),
            SourceFile::new("c.py", Language::Python, dense_block("left")),
        ];
        let keys = |threshold: f64| -> HashSet<(String, usize, String, usize)> {
            let config = DuplicationConfig {
                similarity_threshold: threshold,
                ..Default::default()
            };
            DuplicationDetector::new(&config)
                .find_duplicates(&files)
                .into_iter()
                .map(|d| (d.file1_id, d.start_line1, d.file2_id, d.start_line2))
                .collect()
        };
        let strict = keys(0.95);
        let loose = keys(0.3);
        assert!(strict.is_subset(&loose));
        assert!(strict.contains(&("a.py".to_string(), 1, "c.py".to_string(), 1)));
    }
}
