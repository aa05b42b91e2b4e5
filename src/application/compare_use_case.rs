// ============================================================
// Layer 2 — CompareUseCase
// ============================================================
// Scores the baseline and final checkpoints of a finished run on
// the same held-out pairs and records the per-metric deltas.
//
//   Step 1: Rebuild configs + tokenizer from the run dir   (Layer 6)
//   Step 2: Load the held-out pairs                         (Layer 4)
//   Step 3: Load both checkpoints                           (Layer 6)
//   Step 4: Generate + score with each                      (Layer 5)
//   Step 5: Write comparison.json                           (Layer 6)
//
// Decoding settings and the similarity encoder are rebuilt from
// run_config.json, so both checkpoints are scored as during the run.

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::application::run_use_case::similarity_scorer;
use crate::data::{encoder::SequenceEncoder, loader::JsonlCorpusLoader};
use crate::domain::{
    corpus::Corpus,
    error::ApeError,
    history::{Metric, MetricStat},
    traits::CorpusSource,
};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointTag},
    history_store::HistoryStore,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    evaluator::MetricEngine,
    generator::Generator,
    model::Summarizer,
    InferBackend,
};

#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub run_dir: PathBuf,
    pub test_file: PathBuf,
    pub test_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub baseline: MetricStat,
    pub adapted: MetricStat,
    /// adapted.mean - baseline.mean
    pub delta: f64,
    pub improved: bool,
}

impl MetricComparison {
    pub fn new(metric: Metric, baseline: MetricStat, adapted: MetricStat) -> Self {
        let delta = adapted.mean - baseline.mean;
        let improved = if metric.higher_is_better() {
            delta > 0.0
        } else {
            delta < 0.0
        };
        Self {
            baseline,
            adapted,
            delta,
            improved,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub test_pairs: usize,
    pub metrics: BTreeMap<String, MetricComparison>,
}

pub struct CompareUseCase {
    config: CompareConfig,
}

impl CompareUseCase {
    pub fn new(config: CompareConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Comparison> {
        self.execute_on::<InferBackend>(Default::default())
    }

    pub fn execute_on<B: Backend>(&self, device: B::Device) -> Result<Comparison> {
        let cfg = &self.config;

        // ── Step 1: Configs + tokenizer ───────────────────────────────────────
        let ckpt = CheckpointManager::new(&cfg.run_dir);
        let run_cfg = ckpt.load_run_config()?;
        let model_cfg = ckpt.load_model_config()?;
        let tokenizer = TokenizerStore::new(&cfg.run_dir).load()?;
        let encoder = SequenceEncoder::new(
            tokenizer,
            run_cfg.max_input_len.min(model_cfg.max_positions),
            run_cfg.max_target_len.min(model_cfg.max_positions),
        )?;

        // ── Step 2: Held-out pairs ────────────────────────────────────────────
        let pairs = JsonlCorpusLoader::new(&cfg.test_file)
            .with_limit(cfg.test_limit)
            .load_pairs()?;
        if pairs.is_empty() {
            return Err(ApeError::EmptyCorpus("evaluation".into()).into());
        }
        let test = Corpus::new(pairs);
        tracing::info!("Comparing checkpoints on {} held-out pairs", test.len());

        // ── Step 3: Checkpoints ───────────────────────────────────────────────
        let baseline: Summarizer<B> =
            ckpt.load_model(model_cfg.init::<B>(&device), CheckpointTag::Baseline, &device)?;
        let adapted: Summarizer<B> =
            ckpt.load_model(model_cfg.init::<B>(&device), CheckpointTag::Final, &device)?;

        // ── Step 4: Score both ────────────────────────────────────────────────
        let max_gen_len = run_cfg.max_gen_len.min(model_cfg.max_positions.saturating_sub(1)).max(1);
        let generator = Generator::new(run_cfg.decoding, max_gen_len);
        let scorer = similarity_scorer(&run_cfg.similarity_source(), &baseline, &encoder, &device)?;

        let score = |model: &Summarizer<B>| -> Result<BTreeMap<Metric, MetricStat>> {
            let articles = test.articles();
            let references = test.references();
            let generated = generator.generate(model, &encoder, &device, &articles)?;
            let scores = MetricEngine::new(model, &encoder, &device, &scorer)
                .score(&articles, &generated, &references)?;
            Ok(scores.into_record(0)?.stats().clone())
        };
        let before = score(&baseline)?;
        let after = score(&adapted)?;

        let metrics = Metric::ALL
            .iter()
            .map(|&m| {
                (
                    m.key().to_string(),
                    MetricComparison::new(m, before[&m], after[&m]),
                )
            })
            .collect();
        let comparison = Comparison {
            test_pairs: test.len(),
            metrics,
        };

        // ── Step 5: Persist ───────────────────────────────────────────────────
        let path = HistoryStore::new(&cfg.run_dir).save_comparison(&comparison)?;
        tracing::info!("Comparison written to '{}'", path.display());
        Ok(comparison)
    }
}
