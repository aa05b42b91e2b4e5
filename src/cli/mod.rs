// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// clap and hands everything else to Layer 2 (application).
//
// Three commands are supported:
//   1. `run`     — the full APE fine-tune/evaluate experiment
//   2. `compare` — baseline vs final checkpoint on a test set
//   3. `plot`    — re-render trend plots of a finished run

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, CompareArgs, PlotArgs, RunArgs};

use crate::domain::history::{History, Metric};

#[derive(Parser, Debug)]
#[command(
    name = "ape",
    version,
    about = "Adjacent Possible Exploration: fine-tune a summarizer on K batches and track its metrics."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route to the matching use case; the CLI never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Run(args) => run_experiment(args),
            Commands::Compare(args) => run_compare(args),
            Commands::Plot(args) => run_plot(args),
        }
    }
}

fn run_experiment(args: RunArgs) -> Result<()> {
    use crate::application::run_use_case::RunUseCase;

    let use_case = RunUseCase::new(args.into());
    let outcome = use_case.execute()?;

    let steps: usize = outcome.reports.iter().map(|r| r.optimizer_steps).sum();
    let skipped: usize = outcome.reports.iter().map(|r| r.skipped_steps).sum();
    println!(
        "\nAPE finished: {} iterations, {} optimizer steps ({} skipped on overflow)",
        outcome.history.len().saturating_sub(1),
        steps,
        skipped,
    );
    println!(
        "Parameter fingerprint: {:.4} -> {:.4}",
        outcome.baseline_fingerprint, outcome.final_fingerprint
    );
    print_history_table(&outcome.history);
    for path in &outcome.plot_files {
        println!("  wrote {}", path.display());
    }
    Ok(())
}

fn run_compare(args: CompareArgs) -> Result<()> {
    use crate::application::compare_use_case::CompareUseCase;

    let comparison = CompareUseCase::new(args.into()).execute()?;
    println!("\nCheckpoint comparison on {} pairs", comparison.test_pairs);
    println!("{:<12} {:>10} {:>10} {:>10}", "metric", "baseline", "final", "delta");
    for metric in Metric::ALL {
        if let Some(c) = comparison.metrics.get(metric.key()) {
            println!(
                "{:<12} {:>10.4} {:>10.4} {:>+10.4} {}",
                metric.label(),
                c.baseline.mean,
                c.adapted.mean,
                c.delta,
                if c.improved { "improved" } else { "" },
            );
        }
    }
    Ok(())
}

fn run_plot(args: PlotArgs) -> Result<()> {
    use crate::application::plot_use_case::PlotUseCase;

    let files = PlotUseCase::new(args.run_dir).execute()?;
    for path in files {
        println!("wrote {}", path.display());
    }
    Ok(())
}

/// Baseline vs last-iteration mean for every metric.
fn print_history_table(history: &History) {
    let Some(last) = history.last() else {
        return;
    };
    println!("{:<12} {:>10} {:>10} {:>10}", "metric", "baseline", "final", "delta");
    for metric in Metric::ALL {
        let Some(base) = history.baseline(metric) else {
            continue;
        };
        let end = last.get(metric);
        println!(
            "{:<12} {:>10.4} {:>10.4} {:>+10.4}",
            metric.label(),
            base.mean,
            end.mean,
            end.mean - base.mean
        );
    }
}
