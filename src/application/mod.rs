// ============================================================
// Layer 2 — Application Layer
// ============================================================
// One use case per CLI command. Each owns its config, calls into
// the data, ml and infra layers in a fixed order, and returns a
// plain result for the CLI to print.
//
//   run_use_case.rs     — the full APE experiment
//   compare_use_case.rs — baseline vs final checkpoint on a test set
//   plot_use_case.rs    — re-render plots from history.json

/// Full APE experiment: baseline, K perturb/evaluate rounds, report
pub mod run_use_case;

/// Baseline vs adapted checkpoint comparison
pub mod compare_use_case;

/// Trend plots from a saved history
pub mod plot_use_case;
