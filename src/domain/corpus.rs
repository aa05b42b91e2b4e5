// ============================================================
// Layer 3 — Corpus Domain Types
// ============================================================
// A corpus is an ordered list of (article, reference summary)
// pairs. Once loaded it never changes: the batcher hands out
// contiguous slices of it, the evaluator reads it, nobody
// writes to it.

use serde::{Deserialize, Serialize};

/// One article together with its human-written reference summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPair {
    /// Source text the model reads
    pub article: String,

    /// Reference summary the model is trained towards / scored against
    pub summary: String,
}

impl SummaryPair {
    pub fn new(article: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            article: article.into(),
            summary: summary.into(),
        }
    }
}

/// An immutable, ordered collection of summary pairs.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pairs: Vec<SummaryPair>,
}

impl Corpus {
    pub fn new(pairs: Vec<SummaryPair>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[SummaryPair] {
        &self.pairs
    }

    /// Articles in corpus order.
    pub fn articles(&self) -> Vec<&str> {
        self.pairs.iter().map(|p| p.article.as_str()).collect()
    }

    /// Reference summaries in corpus order.
    pub fn references(&self) -> Vec<&str> {
        self.pairs.iter().map(|p| p.summary.as_str()).collect()
    }
}

impl From<Vec<SummaryPair>> for Corpus {
    fn from(pairs: Vec<SummaryPair>) -> Self {
        Self::new(pairs)
    }
}
