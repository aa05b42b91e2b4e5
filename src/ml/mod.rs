// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// Other layers hand it token ids and text, and get back text,
// scores and reports.
//
//   model.rs       — encoder-decoder transformer summarizer
//   context.rs     — device + sequence encoder shared by a run
//   loss_scale.rs  — dynamic loss scaling state machine
//   accumulator.rs — accumulate-then-step state machine
//   grad_ops.rs    — global grad norm, grad scaling, param fingerprint
//   trainer.rs     — one perturbation step over a batch
//   generator.rs   — greedy / sampled autoregressive decoding
//   text_metrics.rs — BLEU and ROUGE-L
//   similarity.rs  — embedding similarity (BERTScore-style)
//   evaluator.rs   — per-pair metrics + mean / std reduction

/// Inference backend: ndarray on the CPU by default,
/// wgpu on the accelerator with `--features wgpu`.
#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;

/// Training backend: the inference backend with autodiff on top
pub type RunBackend = burn::backend::Autodiff<InferBackend>;

pub mod model;

pub mod context;

pub mod loss_scale;

pub mod accumulator;

pub mod grad_ops;

/// Fine-tuning on one batch with accumulation, clipping and loss scaling
pub mod trainer;

/// Summary generation
pub mod generator;

pub mod text_metrics;

pub mod similarity;

/// Scores generated summaries against references
pub mod evaluator;
