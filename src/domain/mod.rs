// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits describing the APE
// experiment: the corpus of (article, summary) pairs, the metric
// records produced each iteration and the history they form.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, traits and errors
//
// Everything in here can be unit tested without a device.

// Articles paired with their reference summaries
pub mod corpus;

// Metric names, per-iteration records and the run history
pub mod history;

// Typed validation errors shared by every layer
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
