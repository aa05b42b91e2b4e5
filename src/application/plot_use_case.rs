// ============================================================
// Layer 2 — PlotUseCase
// ============================================================
// Re-renders the trend plots of a finished run from its
// history.json, without touching the model.

use anyhow::Result;
use std::path::PathBuf;

use crate::infra::{history_store::HistoryStore, reporter::Reporter};

pub struct PlotUseCase {
    run_dir: PathBuf,
}

impl PlotUseCase {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
        }
    }

    pub fn execute(&self) -> Result<Vec<PathBuf>> {
        let history = HistoryStore::new(&self.run_dir).load_history()?;
        tracing::info!("Loaded history with {} iterations", history.len());
        Reporter::new(&self.run_dir).render(&history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::history::{History, Metric, MetricRecord, MetricStat};

    #[test]
    fn test_replots_saved_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = History::new();
        for i in 0..3 {
            let stats = Metric::ALL
                .iter()
                .map(|&m| (m, MetricStat::new(i as f64, 0.0)))
                .collect();
            history.push(MetricRecord::new(i, stats).unwrap()).unwrap();
        }
        HistoryStore::new(dir.path()).save_history(&history).unwrap();

        let files = PlotUseCase::new(dir.path()).execute().unwrap();
        assert!(files.len() >= Metric::ALL.len());
        assert!(dir.path().join("plots/perplexity_trend.csv").exists());
    }

    #[test]
    fn test_missing_history_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PlotUseCase::new(dir.path()).execute().is_err());
    }
}
