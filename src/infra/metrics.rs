// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per APE iteration as the run progresses,
// so a crashed run still leaves its trajectory behind.
//
// Output file: <run_dir>/metrics.csv
//
// Example CSV output:
//   iteration,bleu_mean,bleu_std,rouge_l_mean,rouge_l_std,...
//   0,0.012000,0.020000,0.081000,0.050000,...
//   1,0.019000,0.023000,0.094000,0.048000,...
//
// Iteration 0 is the baseline. The file is truncated when the
// logger is created: one file per run.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::history::{Metric, MetricRecord};

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the CSV with its header row.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "{}", Self::header())?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    fn header() -> String {
        let mut cols = vec!["iteration".to_string()];
        for m in Metric::ALL {
            cols.push(format!("{}_mean", m.key()));
            cols.push(format!("{}_std", m.key()));
        }
        cols.join(",")
    }

    /// Append one iteration's record.
    pub fn log(&self, record: &MetricRecord) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        let mut row = record.iteration().to_string();
        for m in Metric::ALL {
            let stat = record.get(m);
            row.push_str(&format!(",{:.6},{:.6}", stat.mean, stat.std));
        }
        writeln!(f, "{row}")?;

        tracing::debug!("Logged iteration {} metrics", record.iteration());
        Ok(())
    }

    #[cfg(test)]
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
