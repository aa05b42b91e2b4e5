// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Loads (article, summary) pairs from a JSON Lines file:
//
//   {"article": "...", "highlights": "..."}
//   {"article": "...", "summary": "..."}
//
// `highlights` is the CNN/DailyMail field name; `summary` is
// accepted as an alias so other summarisation sets load unchanged.
// Extra fields (ids, urls) are ignored.
//
// A malformed line is logged and skipped rather than failing the
// whole corpus; an unreadable file is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::data::preprocessor::Preprocessor;
use crate::domain::corpus::SummaryPair;
use crate::domain::traits::CorpusSource;

/// Shape of one JSONL row on disk.
#[derive(Debug, Deserialize)]
struct RawPair {
    article: String,
    #[serde(alias = "highlights")]
    summary: String,
}

/// Reads summary pairs from a `.jsonl` file.
/// Implements the CorpusSource trait from Layer 3.
pub struct JsonlCorpusLoader {
    path: PathBuf,
    limit: Option<usize>,
}

impl JsonlCorpusLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            limit: None,
        }
    }

    /// Stop after `limit` valid pairs.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CorpusSource for JsonlCorpusLoader {
    fn load_pairs(&self) -> Result<Vec<SummaryPair>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Cannot read corpus '{}'", self.path.display()))?;

        let preprocessor = Preprocessor::new();
        let mut pairs = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in text.lines().enumerate() {
            if self.limit.is_some_and(|limit| pairs.len() >= limit) {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawPair>(line) {
                Ok(raw) => {
                    let article = preprocessor.clean(&raw.article);
                    let summary = preprocessor.clean(&raw.summary);
                    if article.is_empty() || summary.is_empty() {
                        skipped += 1;
                        continue;
                    }
                    pairs.push(SummaryPair::new(article, summary));
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        "Skipping line {} of '{}': {}",
                        line_no + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Loaded {} pairs from '{}' ({} skipped)",
            pairs.len(),
            self.path.display(),
            skipped
        );
        Ok(pairs)
    }
}
