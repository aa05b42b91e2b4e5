// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything the run writes to or reads from its run directory:
//
//   checkpoint.rs      — model weights (full-precision MessagePack) plus the
//                        model and run configs needed to rebuild
//                        the model later
//
//   tokenizer_store.rs — builds a word-level tokenizer from the
//                        training corpus or copies a pretrained
//                        one, so every phase uses the same ids
//
//   metrics.rs         — one CSV row per iteration as the run goes
//
//   history_store.rs   — history.json, samples.json and
//                        comparison.json
//
//   reporter.rs        — per-metric trend plots (mean ± std,
//                        baseline line, polynomial trend)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Per-iteration metrics CSV logger
pub mod metrics;

/// JSON persistence for history, samples and comparisons
pub mod history_store;

/// Trend plots for every metric
pub mod reporter;
