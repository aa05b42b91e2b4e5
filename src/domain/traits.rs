// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The experiment talks to two outside collaborators through
// traits so the loop never depends on a concrete source:
//   - where the (article, summary) pairs come from
//   - who judges semantic similarity between two texts

use anyhow::Result;

use crate::domain::corpus::SummaryPair;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
/// Any component that can supply ordered summary pairs.
///
/// Implementations:
///   - JsonlCorpusLoader → one JSON object per line on disk
pub trait CorpusSource {
    /// Load every available pair, in source order.
    fn load_pairs(&self) -> Result<Vec<SummaryPair>>;
}

// ─── SimilarityScorer ─────────────────────────────────────────────────────────
/// Scores how close two texts are in meaning, in [0, 1].
///
/// Implementations:
///   - EmbeddingScorer → greedy cosine matching of contextual
///     token embeddings from a frozen encoder
pub trait SimilarityScorer {
    fn similarity(&self, candidate: &str, reference: &str) -> Result<f64>;
}
