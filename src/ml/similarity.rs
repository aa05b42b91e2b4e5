// ============================================================
// Layer 5 — Embedding Similarity
// ============================================================
// BERTScore-style F1 between a candidate and a reference.
//
//   E_c = contextual embeddings of candidate tokens   [n, d]
//   E_r = contextual embeddings of reference tokens   [m, d]
//   P   = mean_i max_j cos(E_c[i], E_r[j])
//   R   = mean_j max_i cos(E_c[i], E_r[j])
//   F1  = 2PR / (P + R), clamped to [0, 1]
//
// The embeddings come from a frozen encoder that never trains:
// an independent pretrained model when one is given, otherwise
// a copy of the baseline. A freshly initialised baseline gives
// scores with no semantic meaning; SimilaritySource records which
// case a run used.

use anyhow::{anyhow, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::encoder::SequenceEncoder;
use crate::domain::traits::SimilarityScorer;
use crate::ml::model::{ids_tensor, Summarizer};

/// Where the similarity encoder's weights come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimilaritySource {
    /// Final checkpoint of an independent model directory
    External { dir: PathBuf },
    /// Frozen copy of a pretrained baseline
    PretrainedBaseline,
    /// Frozen copy of a randomly initialised baseline
    RandomBaseline,
}

impl SimilaritySource {
    pub fn is_semantic(&self) -> bool {
        !matches!(self, SimilaritySource::RandomBaseline)
    }
}

pub struct EmbeddingScorer<B: Backend> {
    model: Summarizer<B>,
    encoder: SequenceEncoder,
    device: B::Device,
}

impl<B: Backend> EmbeddingScorer<B> {
    /// `model` should be an inference view (`valid()`) so dropout is off.
    pub fn new(model: Summarizer<B>, encoder: SequenceEncoder, device: B::Device) -> Self {
        Self {
            model,
            encoder,
            device,
        }
    }

    /// One unit-length embedding per token of `text`.
    fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>> {
        let mut ids = self.encoder.tokenize(text)?;
        ids.truncate(self.model.max_positions());
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let hidden = self.model.encode(ids_tensor::<B>(&ids, &self.device));
        let [_, len, d_model] = hidden.dims();
        let flat = hidden
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("Cannot read embeddings: {e:?}"))?;

        Ok((0..len)
            .map(|i| normalize(&flat[i * d_model..(i + 1) * d_model]))
            .collect())
    }
}

impl<B: Backend> SimilarityScorer for EmbeddingScorer<B> {
    fn similarity(&self, candidate: &str, reference: &str) -> Result<f64> {
        let cand = self.embed(candidate)?;
        let refs = self.embed(reference)?;
        Ok(greedy_match_f1(&cand, &refs))
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

/// Greedy cosine matching over unit vectors. 0.0 when either side is empty.
pub fn greedy_match_f1(cand: &[Vec<f32>], refs: &[Vec<f32>]) -> f64 {
    if cand.is_empty() || refs.is_empty() {
        return 0.0;
    }

    let best = |from: &[Vec<f32>], to: &[Vec<f32>]| -> f64 {
        from.iter()
            .map(|a| to.iter().map(|b| dot(a, b)).fold(f64::NEG_INFINITY, f64::max))
            .sum::<f64>()
            / from.len() as f64
    };

    let precision = best(cand, refs);
    let recall = best(refs, cand);
    if precision + recall <= 0.0 {
        return 0.0;
    }
    (2.0 * precision * recall / (precision + recall)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::TokenizerStore;
    use crate::ml::model::SummarizerConfig;
    use approx::assert_abs_diff_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn scorer() -> (tempfile::TempDir, EmbeddingScorer<TestBackend>) {
        let dir = tempfile::tempdir().unwrap();
        let texts = vec!["officials confirmed the bridge will reopen next week".to_string()];
        let tok = TokenizerStore::new(dir.path()).load_or_build(&texts, 64).unwrap();
        let encoder = SequenceEncoder::new(tok, 16, 8).unwrap();
        let device = Default::default();
        let model = SummarizerConfig::new(encoder.vocab_size(), 17)
            .with_d_model(16)
            .with_num_heads(2)
            .with_encoder_layers(1)
            .with_decoder_layers(1)
            .with_d_ff(32)
            .with_dropout(0.0)
            .init(&device);
        (dir, EmbeddingScorer::new(model, encoder, device))
    }

    #[test]
    fn test_identical_texts_score_one() {
        let (_dir, s) = scorer();
        let score = s
            .similarity("the bridge will reopen", "the bridge will reopen")
            .unwrap();
        assert_abs_diff_eq!(score, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_scores_are_bounded() {
        let (_dir, s) = scorer();
        let score = s.similarity("officials confirmed", "reopen next week").unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_empty_side_scores_zero() {
        let (_dir, s) = scorer();
        assert_eq!(s.similarity("", "the bridge").unwrap(), 0.0);
    }

    #[test]
    fn test_greedy_match_on_orthogonal_vectors() {
        let a = vec![vec![1.0, 0.0]];
        let b = vec![vec![0.0, 1.0]];
        assert_eq!(greedy_match_f1(&a, &b), 0.0);
        assert_abs_diff_eq!(greedy_match_f1(&a, &a), 1.0);
    }

    #[test]
    fn test_only_random_baseline_is_not_semantic() {
        assert!(SimilaritySource::External { dir: "enc".into() }.is_semantic());
        assert!(SimilaritySource::PretrainedBaseline.is_semantic());
        assert!(!SimilaritySource::RandomBaseline.is_semantic());

        let json = serde_json::to_string(&SimilaritySource::RandomBaseline).unwrap();
        assert_eq!(json, r#"{"kind":"random_baseline"}"#);
    }
}
