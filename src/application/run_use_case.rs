// ============================================================
// Layer 2 — RunUseCase
// ============================================================
// Orchestrates one full APE experiment in order:
//
//   Step 1: Preflight: validate config, probe run dir   (Layer 6)
//   Step 2: Load + split the corpus                      (Layer 4)
//   Step 3: Tokenizer + model (pretrained or fresh)      (Layer 6/5)
//   Step 4: Baseline checkpoint, iteration 0 evaluation  (Layer 5/6)
//   Step 5: Per batch: perturb → generate → score → log  (Layer 5/6)
//   Step 6: Final checkpoint, history, samples, plots    (Layer 6)
//
// Nothing touches model parameters before Step 1 passes.

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::AdamConfig,
    tensor::backend::{AutodiffBackend, Backend},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{
    batcher::IterationBatcher,
    encoder::SequenceEncoder,
    loader::JsonlCorpusLoader,
    splitter::split_holdout,
};
use crate::domain::{
    corpus::Corpus,
    error::ApeError,
    history::{History, MetricRecord, QualitativeSample},
    traits::{CorpusSource, SimilarityScorer},
};
use crate::infra::{
    checkpoint::{CheckpointManager, CheckpointTag},
    history_store::HistoryStore,
    metrics::MetricsLogger,
    reporter::Reporter,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    context::RunContext,
    evaluator::MetricEngine,
    generator::{Decoding, Generator},
    grad_ops::param_fingerprint,
    loss_scale::{LossScaler, Precision, DEFAULT_SCALE_GROWTH_INTERVAL},
    model::{Summarizer, SummarizerConfig},
    similarity::{EmbeddingScorer, SimilaritySource},
    trainer::{PerturbSettings, PerturbationReport, Perturber},
    RunBackend,
};

// ─── Run Configuration ───────────────────────────────────────────────────────
// Every knob of an experiment. Saved as run_config.json so the
// `compare` command can rebuild the same generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub train_file: PathBuf,
    pub test_file: Option<PathBuf>,
    pub run_dir: PathBuf,
    pub pretrained: Option<PathBuf>,
    /// Run directory whose final checkpoint embeds texts for bert_score
    #[serde(default)]
    pub similarity_model: Option<PathBuf>,
    pub train_limit: usize,
    pub test_limit: usize,
    pub iterations: usize,
    pub epochs: usize,
    pub accum_steps: usize,
    pub lr: f64,
    pub max_grad_norm: f64,
    pub max_input_len: usize,
    pub max_target_len: usize,
    pub max_gen_len: usize,
    pub precision: Precision,
    pub scale_growth_interval: usize,
    pub decoding: Decoding,
    pub seed: u64,
    pub qualitative_samples: usize,
    pub vocab_size: usize,
    pub d_model: usize,
    pub num_heads: usize,
    pub encoder_layers: usize,
    pub decoder_layers: usize,
    pub d_ff: usize,
    pub dropout: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_file: PathBuf::from("data/train.jsonl"),
            test_file: None,
            run_dir: PathBuf::from("runs/ape"),
            pretrained: None,
            similarity_model: None,
            train_limit: 4000,
            test_limit: 300,
            iterations: 15,
            epochs: 1,
            accum_steps: 4,
            lr: 1e-5,
            max_grad_norm: 1.0,
            max_input_len: 512,
            max_target_len: 128,
            max_gen_len: 128,
            precision: Precision::Fp16,
            scale_growth_interval: DEFAULT_SCALE_GROWTH_INTERVAL,
            decoding: Decoding::Greedy,
            seed: 42,
            qualitative_samples: 3,
            vocab_size: 16000,
            d_model: 256,
            num_heads: 8,
            encoder_layers: 3,
            decoder_layers: 3,
            d_ff: 1024,
            dropout: 0.1,
        }
    }
}

impl RunConfig {
    /// Reject settings that would fail mid-run.
    pub fn validate(&self) -> Result<(), ApeError> {
        let checks = [
            (self.iterations == 0, "iterations must be at least 1"),
            (self.epochs == 0, "epochs must be at least 1"),
            (self.accum_steps == 0, "accum_steps must be at least 1"),
            (!(self.lr.is_finite() && self.lr > 0.0), "learning rate must be positive"),
            (
                !(self.max_grad_norm.is_finite() && self.max_grad_norm > 0.0),
                "max_grad_norm must be positive",
            ),
            (self.max_input_len == 0, "max_input_len must be at least 1"),
            (self.max_target_len == 0, "max_target_len must be at least 1"),
            (self.max_gen_len == 0, "max_gen_len must be at least 1"),
            (self.train_limit == 0, "train_limit must be at least 1"),
            (self.test_limit == 0, "test_limit must be at least 1"),
            (self.vocab_size <= 4, "vocab_size must leave room beyond the 4 special tokens"),
            (self.num_heads == 0, "num_heads must be at least 1"),
            (
                self.num_heads > 0 && self.d_model % self.num_heads != 0,
                "d_model must be divisible by num_heads",
            ),
            (!(0.0..1.0).contains(&self.dropout), "dropout must be in [0, 1)"),
        ];
        if let Some((_, msg)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(ApeError::InvalidConfig(msg.to_string()));
        }

        if let Decoding::Sampled { temperature, .. } = self.decoding {
            if !(temperature.is_finite() && temperature > 0.0) {
                return Err(ApeError::InvalidConfig("temperature must be positive".into()));
            }
        }
        Ok(())
    }

    /// Encoder behind the embedding-similarity metric.
    pub fn similarity_source(&self) -> SimilaritySource {
        match (&self.similarity_model, &self.pretrained) {
            (Some(dir), _) => SimilaritySource::External { dir: dir.clone() },
            (None, Some(_)) => SimilaritySource::PretrainedBaseline,
            (None, None) => SimilaritySource::RandomBaseline,
        }
    }

    /// Positions the model needs: the longest of input, target and
    /// generated output (+1 for the leading [BOS]).
    pub fn max_positions(&self) -> usize {
        self.max_input_len
            .max(self.max_target_len)
            .max(self.max_gen_len + 1)
    }
}

/// What a finished run hands back to the CLI.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub history: History,
    pub reports: Vec<PerturbationReport>,
    pub baseline_fingerprint: f64,
    pub final_fingerprint: f64,
    pub plot_files: Vec<PathBuf>,
}

// ─── RunUseCase ──────────────────────────────────────────────────────────────
pub struct RunUseCase {
    config: RunConfig,
}

impl RunUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<RunOutcome> {
        self.execute_on::<RunBackend>(Default::default())
    }

    /// Full experiment on backend `B`.
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<RunOutcome> {
        let cfg = &self.config;

        // ── Step 1: Preflight ─────────────────────────────────────────────────
        let ckpt = self.preflight()?;

        // ── Step 2: Corpus ────────────────────────────────────────────────────
        let (train, test) = load_splits(cfg)?;
        tracing::info!("Corpus ready: {} training pairs, {} held out", train.len(), test.len());

        // ── Step 3: Tokenizer + model ─────────────────────────────────────────
        B::seed(cfg.seed);
        let (encoder, model_cfg, model) = prepare_model::<B>(cfg, &train, &device)?;
        ckpt.save_run_config(cfg)?;
        ckpt.save_model_config(&model_cfg)?;

        let max_gen_len = cfg.max_gen_len.min(model_cfg.max_positions.saturating_sub(1)).max(1);
        if max_gen_len < cfg.max_gen_len {
            tracing::warn!("max_gen_len clamped to {} by the model's position table", max_gen_len);
        }
        let ctx = RunContext::<B>::new(device.clone(), encoder, max_gen_len);

        run_iterations(cfg, &ckpt, &ctx, model, &train, &test)
    }

    /// Validate config, model sources and run directory before any
    /// model work.
    pub fn preflight(&self) -> Result<CheckpointManager> {
        let cfg = &self.config;
        cfg.validate()?;

        let sources = [("pretrained", &cfg.pretrained), ("similarity", &cfg.similarity_model)];
        for (role, dir) in sources {
            if let Some(dir) = dir {
                if !CheckpointManager::new(dir).has_model(CheckpointTag::Final) {
                    return Err(ApeError::InvalidConfig(format!(
                        "{role} model directory '{}' has no final checkpoint",
                        dir.display()
                    ))
                    .into());
                }
            }
        }
        if !cfg.similarity_source().is_semantic() {
            tracing::warn!(
                "No --similarity-model or --pretrained given: bert_score embeds with a \
                 randomly initialised encoder and is not a semantic measure"
            );
        }

        let ckpt = CheckpointManager::new(&cfg.run_dir);
        ckpt.ensure_writable()?;
        Ok(ckpt)
    }
}

/// Load training and held-out pairs. With no separate test file,
/// the held-out block is the tail after the training prefix.
fn load_splits(cfg: &RunConfig) -> Result<(Corpus, Corpus)> {
    let separate_test = cfg.test_file.as_ref().filter(|t| **t != cfg.train_file);

    let (train, test) = match separate_test {
        Some(test_file) => {
            let train = JsonlCorpusLoader::new(&cfg.train_file)
                .with_limit(cfg.train_limit)
                .load_pairs()?;
            let test = JsonlCorpusLoader::new(test_file)
                .with_limit(cfg.test_limit)
                .load_pairs()?;
            (train, test)
        }
        None => {
            let pairs = JsonlCorpusLoader::new(&cfg.train_file)
                .with_limit(cfg.train_limit.saturating_add(cfg.test_limit))
                .load_pairs()?;
            split_holdout(pairs, cfg.train_limit, cfg.test_limit)
        }
    };

    if train.is_empty() {
        return Err(ApeError::EmptyCorpus("training".into()).into());
    }
    if test.is_empty() {
        return Err(ApeError::EmptyCorpus("evaluation".into()).into());
    }
    Ok((Corpus::new(train), Corpus::new(test)))
}

/// Either inherit tokenizer + weights from a pretrained directory,
/// or build a tokenizer from the training corpus and start fresh.
fn prepare_model<B: AutodiffBackend>(
    cfg: &RunConfig,
    train: &Corpus,
    device: &B::Device,
) -> Result<(SequenceEncoder, SummarizerConfig, Summarizer<B>)> {
    let run_store = TokenizerStore::new(&cfg.run_dir);

    let (tokenizer, model_cfg, model) = match &cfg.pretrained {
        Some(dir) => {
            tracing::info!("Loading pretrained model from '{}'", dir.display());
            let tokenizer = TokenizerStore::new(dir).load()?;
            run_store.save(&tokenizer)?;

            let source = CheckpointManager::new(dir);
            let model_cfg = source.load_model_config()?;
            let model = source
                .load_model(model_cfg.init::<B>(device), CheckpointTag::Final, device)
                .with_context(|| format!("'{}' has no final checkpoint", dir.display()))?;
            (tokenizer, model_cfg, model)
        }
        None => {
            tracing::warn!("No --pretrained directory: starting from a freshly initialised model");
            let texts: Vec<String> = train
                .pairs()
                .iter()
                .flat_map(|p| [p.article.clone(), p.summary.clone()])
                .collect();
            let tokenizer = run_store.load_or_build(&texts, cfg.vocab_size)?;
            let model_cfg = SummarizerConfig::new(tokenizer.get_vocab_size(true), cfg.max_positions())
                .with_d_model(cfg.d_model)
                .with_num_heads(cfg.num_heads)
                .with_encoder_layers(cfg.encoder_layers)
                .with_decoder_layers(cfg.decoder_layers)
                .with_d_ff(cfg.d_ff)
                .with_dropout(cfg.dropout);
            let model = model_cfg.init::<B>(device);
            (tokenizer, model_cfg, model)
        }
    };

    // A pretrained position table may be shorter than requested.
    let max_input_len = cfg.max_input_len.min(model_cfg.max_positions);
    let max_target_len = cfg.max_target_len.min(model_cfg.max_positions);
    if max_input_len < cfg.max_input_len || max_target_len < cfg.max_target_len {
        tracing::warn!(
            "Sequence lengths clamped to the model's {} positions",
            model_cfg.max_positions
        );
    }

    let encoder = SequenceEncoder::new(tokenizer, max_input_len, max_target_len)?;
    if encoder.vocab_size() > model_cfg.vocab_size {
        return Err(ApeError::InvalidConfig(format!(
            "tokenizer has {} tokens but the model embeds only {}",
            encoder.vocab_size(),
            model_cfg.vocab_size
        ))
        .into());
    }
    tracing::info!(
        "Model ready: vocab={}, d_model={}, {}+{} layers",
        model_cfg.vocab_size,
        model_cfg.d_model,
        model_cfg.encoder_layers,
        model_cfg.decoder_layers,
    );
    Ok((encoder, model_cfg, model))
}

/// Iteration 0 plus one perturb/evaluate round per batch.
pub fn run_iterations<B: AutodiffBackend>(
    cfg: &RunConfig,
    ckpt: &CheckpointManager,
    ctx: &RunContext<B>,
    mut model: Summarizer<B>,
    train: &Corpus,
    test: &Corpus,
) -> Result<RunOutcome> {
    let batches = IterationBatcher::new(cfg.iterations, cfg.lr).plan(train.len())?;

    // ── Step 4: Baseline ──────────────────────────────────────────────────────
    ckpt.save_model(&model, CheckpointTag::Baseline)?;
    let baseline_fingerprint = param_fingerprint(&model);

    let scorer = similarity_scorer(&cfg.similarity_source(), &model.valid(), ctx.encoder(), ctx.device())?;
    let generator = Generator::new(cfg.decoding, ctx.max_gen_len());
    let logger = MetricsLogger::new(&cfg.run_dir)?;

    let mut history = History::new();
    let mut samples = Vec::new();
    let mut record_iteration = |iteration: usize, model: &Summarizer<B>, history: &mut History| -> Result<()> {
        let record = evaluate(iteration, model, ctx, &generator, &scorer, test, cfg.qualitative_samples, &mut samples)?;
        log_record(&record);
        logger.log(&record)?;
        history.push(record)?;
        Ok(())
    };

    record_iteration(0, &model, &mut history)?;

    // ── Step 5: Perturb → evaluate, once per batch ────────────────────────────
    let optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, Summarizer<B>>();
    let scaler = LossScaler::for_precision(cfg.precision, cfg.scale_growth_interval);
    tracing::info!(
        "Precision {}: {} loss scaling from {}",
        cfg.precision,
        if scaler.is_dynamic() { "dynamic" } else { "no" },
        scaler.scale(),
    );
    let mut perturber = Perturber::new(
        optim,
        scaler,
        PerturbSettings {
            epochs: cfg.epochs,
            accum_steps: cfg.accum_steps,
            max_grad_norm: cfg.max_grad_norm,
        },
    );

    let mut reports = Vec::with_capacity(batches.len());
    for batch in &batches {
        tracing::info!(
            "Iteration {}/{}: perturbing on {} pairs {:?}",
            batch.iteration,
            batches.len(),
            batch.len(),
            batch.range
        );
        let report = perturber.perturb(&mut model, batch, batch.pairs(train), ctx)?;
        tracing::info!(
            "Iteration {}: {} examples, {} steps ({} skipped), mean_loss={:.4}, scale={}",
            batch.iteration,
            report.examples,
            report.optimizer_steps,
            report.skipped_steps,
            report.mean_loss,
            report.final_scale,
        );
        reports.push(report);

        record_iteration(batch.iteration, &model, &mut history)?;
    }

    // ── Step 6: Persist ───────────────────────────────────────────────────────
    ckpt.save_model(&model, CheckpointTag::Final)?;
    let final_fingerprint = param_fingerprint(&model);

    let store = HistoryStore::new(&cfg.run_dir);
    store.save_history(&history)?;
    store.save_samples(&samples)?;
    let plot_files = Reporter::new(&cfg.run_dir).render(&history)?;

    tracing::info!(
        "Run complete: {} iterations recorded in '{}'",
        history.len(),
        cfg.run_dir.display()
    );

    Ok(RunOutcome {
        history,
        reports,
        baseline_fingerprint,
        final_fingerprint,
        plot_files,
    })
}

/// Frozen encoder for the embedding-similarity metric. `baseline`
/// is used unless an external model directory is named.
pub fn similarity_scorer<B: Backend>(
    source: &SimilaritySource,
    baseline: &Summarizer<B>,
    encoder: &SequenceEncoder,
    device: &B::Device,
) -> Result<EmbeddingScorer<B>> {
    match source {
        SimilaritySource::External { dir } => {
            let tokenizer = TokenizerStore::new(dir).load()?;
            let source_ckpt = CheckpointManager::new(dir);
            let model_cfg = source_ckpt.load_model_config()?;
            let model = source_ckpt
                .load_model(model_cfg.init::<B>(device), CheckpointTag::Final, device)
                .with_context(|| format!("Cannot load similarity model from '{}'", dir.display()))?;
            let encoder = SequenceEncoder::new(tokenizer, model_cfg.max_positions, model_cfg.max_positions)?;
            tracing::info!("Similarity encoder loaded from '{}'", dir.display());
            Ok(EmbeddingScorer::new(model, encoder, device.clone()))
        }
        SimilaritySource::PretrainedBaseline | SimilaritySource::RandomBaseline => Ok(
            EmbeddingScorer::new(baseline.clone(), encoder.clone(), device.clone()),
        ),
    }
}

/// Generate on the held-out articles with the inference view of
/// `model` and score the result.
#[allow(clippy::too_many_arguments)]
fn evaluate<B: AutodiffBackend, S: SimilarityScorer>(
    iteration: usize,
    model: &Summarizer<B>,
    ctx: &RunContext<B>,
    generator: &Generator,
    scorer: &S,
    test: &Corpus,
    keep_samples: usize,
    samples: &mut Vec<QualitativeSample>,
) -> Result<MetricRecord> {
    let valid = model.valid();
    let articles = test.articles();
    let references = test.references();

    let generated = generator.generate(&valid, ctx.encoder(), ctx.device(), &articles)?;
    let scores = MetricEngine::new(&valid, ctx.encoder(), ctx.device(), scorer)
        .score(&articles, &generated, &references)?;

    samples.extend(
        test.pairs()
            .iter()
            .zip(&generated)
            .take(keep_samples)
            .map(|(pair, generated)| QualitativeSample {
                iteration,
                article: pair.article.clone(),
                reference: pair.summary.clone(),
                generated: generated.clone(),
            }),
    );

    Ok(scores.into_record(iteration)?)
}

fn log_record(record: &MetricRecord) {
    let line = record
        .stats()
        .iter()
        .map(|(m, s)| format!("{}={:.4}±{:.4}", m.key(), s.mean, s.std))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!("Iteration {} metrics: {}", record.iteration(), line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::Metric;
    use burn::backend::{Autodiff, NdArray};
    use std::io::Write;

    type TestBackend = Autodiff<NdArray>;

    const TOPICS: [&str; 4] = ["storm", "election", "market", "match"];

    fn write_corpus(path: &std::path::Path, n: usize) {
        let mut f = std::fs::File::create(path).unwrap();
        for i in 0..n {
            let topic = TOPICS[i % TOPICS.len()];
            let line = serde_json::json!({
                "article": format!("reports say the {topic} changed plans for city {i} on monday"),
                "highlights": format!("{topic} changed plans"),
            });
            writeln!(f, "{line}").unwrap();
        }
    }

    fn tiny_config(dir: &std::path::Path, train: usize, iterations: usize) -> RunConfig {
        RunConfig {
            train_file: dir.join("corpus.jsonl"),
            run_dir: dir.join("run"),
            train_limit: train,
            test_limit: 4,
            iterations,
            epochs: 1,
            accum_steps: 4,
            lr: 1e-3,
            max_input_len: 16,
            max_target_len: 8,
            max_gen_len: 6,
            vocab_size: 200,
            d_model: 16,
            num_heads: 2,
            encoder_layers: 1,
            decoder_layers: 1,
            d_ff: 32,
            dropout: 0.0,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_single_iteration_run_records_baseline_and_changes_the_model() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("corpus.jsonl"), 84);
        let cfg = tiny_config(dir.path(), 80, 1);

        let outcome = RunUseCase::new(cfg.clone())
            .execute_on::<TestBackend>(Default::default())
            .unwrap();

        assert_eq!(outcome.history.len(), 2);
        assert_eq!(outcome.history.iterations(), vec![0, 1]);
        assert_eq!(outcome.reports.len(), 1);
        assert_eq!(outcome.reports[0].examples, 80);
        assert_ne!(outcome.baseline_fingerprint, outcome.final_fingerprint);

        for record in outcome.history.records() {
            let bleu = record.get(Metric::Bleu).mean;
            let rouge = record.get(Metric::RougeL).mean;
            let bert = record.get(Metric::BertScore).mean;
            assert!((0.0..=1.0).contains(&bleu));
            assert!((0.0..=1.0).contains(&rouge));
            assert!((0.0..=1.0).contains(&bert));
            assert!(record.get(Metric::Perplexity).mean > 0.0);
        }

        let run = &cfg.run_dir;
        for file in [
            "run_config.json",
            "model_config.json",
            "tokenizer.json",
            "model_baseline.mpk",
            "model_final.mpk",
            "history.json",
            "metrics.csv",
            "samples.json",
            "plots/bleu_trend.csv",
        ] {
            assert!(run.join(file).exists(), "missing {file}");
        }
        #[cfg(feature = "plotters")]
        for m in Metric::ALL {
            let png = run.join("plots").join(format!("{}.png", m.key()));
            assert!(png.exists(), "missing {}", png.display());
        }
        let stored = HistoryStore::new(run).load_history().unwrap();
        assert_eq!(stored, outcome.history);

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(run.join("run_config.json")).unwrap()).unwrap();
        assert_eq!(saved["similarity"]["kind"], "random_baseline");
    }

    #[test]
    fn test_external_similarity_model_is_loaded_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("corpus.jsonl"), 10);
        let encoder_run = tiny_config(dir.path(), 6, 1);
        RunUseCase::new(encoder_run.clone())
            .execute_on::<TestBackend>(Default::default())
            .unwrap();

        let cfg = RunConfig {
            run_dir: dir.path().join("scored"),
            similarity_model: Some(encoder_run.run_dir.clone()),
            ..tiny_config(dir.path(), 6, 1)
        };
        let outcome = RunUseCase::new(cfg.clone())
            .execute_on::<TestBackend>(Default::default())
            .unwrap();
        for record in outcome.history.records() {
            assert!((0.0..=1.0).contains(&record.get(Metric::BertScore).mean));
        }

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(cfg.run_dir.join("run_config.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["similarity"]["kind"], "external");
        assert_eq!(CheckpointManager::new(&cfg.run_dir).load_run_config().unwrap().similarity_model, cfg.similarity_model);
    }

    #[test]
    fn test_similarity_model_without_checkpoint_fails_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            similarity_model: Some(dir.path().join("no_such_run")),
            ..tiny_config(dir.path(), 10, 1)
        };
        let err = RunUseCase::new(cfg.clone()).preflight().err().unwrap();
        assert!(err.to_string().contains("similarity model directory"));
        assert!(!cfg.run_dir.exists());
    }

    #[test]
    fn test_similarity_source_follows_available_models() {
        let base = RunConfig::default();
        assert_eq!(base.similarity_source(), SimilaritySource::RandomBaseline);
        let pretrained = RunConfig {
            pretrained: Some("runs/old".into()),
            ..base.clone()
        };
        assert_eq!(pretrained.similarity_source(), SimilaritySource::PretrainedBaseline);
        let external = RunConfig {
            similarity_model: Some("runs/enc".into()),
            ..pretrained
        };
        assert_eq!(
            external.similarity_source(),
            SimilaritySource::External { dir: "runs/enc".into() }
        );
    }

    #[test]
    fn test_history_has_k_plus_one_records() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("corpus.jsonl"), 10);
        let cfg = tiny_config(dir.path(), 6, 3);

        let outcome = RunUseCase::new(cfg)
            .execute_on::<TestBackend>(Default::default())
            .unwrap();
        assert_eq!(outcome.history.len(), 4);
        assert_eq!(outcome.reports.iter().map(|r| r.examples).sum::<usize>(), 6);
    }

    #[test]
    fn test_invalid_config_fails_before_any_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RunConfig {
            iterations: 0,
            ..tiny_config(dir.path(), 10, 1)
        };
        let err = RunUseCase::new(cfg.clone()).preflight().err().unwrap();
        assert!(err.to_string().contains("iterations"));
        assert!(!cfg.run_dir.exists());
    }

    #[test]
    fn test_empty_evaluation_split_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(&dir.path().join("corpus.jsonl"), 5);
        let cfg = tiny_config(dir.path(), 10, 1);
        let err = RunUseCase::new(cfg)
            .execute_on::<TestBackend>(Default::default())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<ApeError>(),
            Some(&ApeError::EmptyCorpus("evaluation".into()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let base = RunConfig::default();
        assert!(base.validate().is_ok());
        assert!(RunConfig { lr: 0.0, ..base.clone() }.validate().is_err());
        assert!(RunConfig { accum_steps: 0, ..base.clone() }.validate().is_err());
        assert!(RunConfig { num_heads: 3, ..base.clone() }.validate().is_err());
        assert!(RunConfig {
            decoding: Decoding::Sampled {
                temperature: 0.0,
                top_k: 10,
                seed: 1
            },
            ..base
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_max_positions_covers_generation() {
        let cfg = RunConfig {
            max_input_len: 16,
            max_target_len: 8,
            max_gen_len: 20,
            ..RunConfig::default()
        };
        assert_eq!(cfg.max_positions(), 21);
    }
}
