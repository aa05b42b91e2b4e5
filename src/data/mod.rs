// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between a JSONL file on disk and token id
// sequences ready for the model.
//
//   corpus.jsonl
//       │
//       ▼
//   JsonlCorpusLoader → reads pairs, cleans text
//       │
//       ▼
//   split_holdout     → ordered training prefix + held-out block
//       │
//       ▼
//   IterationBatcher  → K contiguous per-iteration batches
//       │
//       ▼
//   SequenceEncoder   → token ids, truncation, BOS/EOS framing

/// Reads summary pairs from JSON Lines files
pub mod loader;

/// Cleans raw text and defines the shared word-splitting rule
pub mod preprocessor;

/// Ordered train / held-out split
pub mod splitter;

/// Partitions the training corpus into per-iteration batches
pub mod batcher;

/// Tokenisation, truncation and sequence framing
pub mod encoder;
