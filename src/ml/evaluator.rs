// ============================================================
// Layer 5 — Metric Engine
// ============================================================
// Scores generated summaries against references, pair by pair,
// and reduces each metric to (mean, population std).
//
//   bleu        lexical n-gram overlap          [0, 1]
//   rouge_l     LCS F1                          [0, 1]
//   bert_score  embedding similarity F1         [0, 1]
//   perplexity  exp(mean NLL of the reference   (0, ∞)
//               given the article), current model
//
// Inputs are parallel slices (articles, generated, references);
// mismatched lengths are rejected before anything is scored.

use std::collections::BTreeMap;

use anyhow::Result;
use burn::prelude::*;

use crate::data::encoder::SequenceEncoder;
use crate::domain::error::ApeError;
use crate::domain::history::{Metric, MetricRecord, MetricStat};
use crate::domain::traits::SimilarityScorer;
use crate::ml::model::{ids_tensor, labels_tensor, Summarizer};
use crate::ml::text_metrics::{bleu, rouge_l};

/// Per-pair values for every metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricScores {
    values: BTreeMap<Metric, Vec<f64>>,
}

impl MetricScores {
    #[cfg(test)]
    pub fn values(&self, metric: Metric) -> &[f64] {
        self.values.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }

    fn push(&mut self, metric: Metric, value: f64) {
        self.values.entry(metric).or_default().push(value);
    }

    /// Mean and population std per metric. Empty for N = 0.
    pub fn summarize(&self) -> BTreeMap<Metric, MetricStat> {
        self.values
            .iter()
            .filter_map(|(&m, values)| MetricStat::from_values(values).map(|s| (m, s)))
            .collect()
    }

    pub fn into_record(self, iteration: usize) -> Result<MetricRecord, ApeError> {
        MetricRecord::new(iteration, self.summarize())
    }
}

/// Metric computation bound to the model being evaluated.
pub struct MetricEngine<'a, B: Backend, S> {
    model: &'a Summarizer<B>,
    encoder: &'a SequenceEncoder,
    device: &'a B::Device,
    similarity: &'a S,
}

impl<'a, B: Backend, S: SimilarityScorer> MetricEngine<'a, B, S> {
    pub fn new(
        model: &'a Summarizer<B>,
        encoder: &'a SequenceEncoder,
        device: &'a B::Device,
        similarity: &'a S,
    ) -> Self {
        Self {
            model,
            encoder,
            device,
            similarity,
        }
    }

    pub fn score<G, R>(&self, articles: &[&str], generated: &[G], references: &[R]) -> Result<MetricScores>
    where
        G: AsRef<str>,
        R: AsRef<str>,
    {
        if articles.len() != generated.len() || generated.len() != references.len() {
            return Err(ApeError::LengthMismatch {
                articles: articles.len(),
                generated: generated.len(),
                references: references.len(),
            }
            .into());
        }

        let mut scores = MetricScores::default();
        for ((article, cand), reference) in articles.iter().zip(generated).zip(references) {
            let (cand, reference) = (cand.as_ref(), reference.as_ref());
            scores.push(Metric::Bleu, bleu(cand, reference));
            scores.push(Metric::RougeL, rouge_l(cand, reference));
            scores.push(Metric::BertScore, self.similarity.similarity(cand, reference)?);
            scores.push(Metric::Perplexity, self.perplexity(article, reference)?);
        }
        Ok(scores)
    }

    /// exp of the mean token NLL of `reference` given `article`.
    pub fn perplexity(&self, article: &str, reference: &str) -> Result<f64> {
        let input = self.encoder.encode_article(article)?;
        let (decoder_input, labels) = self.encoder.encode_target(reference)?;
        let loss = self.model.forward_loss(
            ids_tensor::<B>(&input, self.device),
            ids_tensor::<B>(&decoder_input, self.device),
            labels_tensor::<B>(&labels, self.device),
        );
        let nll: f64 = loss.into_scalar().elem();
        Ok(nll.exp())
    }
}
