// ============================================================
// Layer 3 — Metric History
// ============================================================
// Every iteration of the experiment (0 = baseline, 1..=K = after
// each perturbation) produces one MetricRecord: a mean and a
// standard deviation for each of the four metrics. The History
// is the append-only list of those records.
//
// Invariants enforced here rather than trusted to callers:
//   - a record holds exactly one value for every Metric
//   - history indices are 0..N with no gaps or rewrites

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::ApeError;

/// The four scores computed for every generated summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Clipped n-gram precision with brevity penalty
    Bleu,
    /// Longest-common-subsequence F1
    RougeL,
    /// Contextual embedding similarity F1
    BertScore,
    /// exp(mean token NLL) of the reference under the current model
    Perplexity,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Bleu,
        Metric::RougeL,
        Metric::BertScore,
        Metric::Perplexity,
    ];

    /// Stable key used in JSON, CSV headers and plot file names.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::Bleu => "bleu",
            Metric::RougeL => "rouge_l",
            Metric::BertScore => "bert_score",
            Metric::Perplexity => "perplexity",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Bleu => "BLEU",
            Metric::RougeL => "ROUGE-L F1",
            Metric::BertScore => "BERTScore F1",
            Metric::Perplexity => "Perplexity",
        }
    }

    pub fn from_key(key: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Perplexity is the only metric where lower means better.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, Metric::Perplexity)
    }
}

/// Mean and population standard deviation of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricStat {
    pub mean: f64,
    pub std: f64,
}

impl MetricStat {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// Mean and population std (ddof = 0). `None` for an empty slice.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self::new(mean, var.sqrt()))
    }
}

/// All metric statistics for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    iteration: usize,
    stats: BTreeMap<Metric, MetricStat>,
}

impl MetricRecord {
    /// Build a record, rejecting it if any metric is missing.
    pub fn new(iteration: usize, stats: BTreeMap<Metric, MetricStat>) -> Result<Self, ApeError> {
        if let Some(missing) = Metric::ALL.iter().find(|m| !stats.contains_key(m)) {
            return Err(ApeError::IncompleteRecord {
                iteration,
                metric: missing.key().to_string(),
            });
        }
        Ok(Self { iteration, stats })
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn get(&self, metric: Metric) -> MetricStat {
        // Presence of every metric is checked in `new`.
        self.stats[&metric]
    }

    pub fn stats(&self) -> &BTreeMap<Metric, MetricStat> {
        &self.stats
    }
}

/// Append-only sequence of metric records, one per iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    records: Vec<MetricRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the record for the next iteration.
    pub fn push(&mut self, record: MetricRecord) -> Result<(), ApeError> {
        let expected = self.records.len();
        if record.iteration != expected {
            return Err(ApeError::HistoryGap {
                expected,
                got: record.iteration,
            });
        }
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&MetricRecord> {
        self.records.last()
    }

    pub fn iterations(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.iteration).collect()
    }

    /// The trajectory of one metric across all iterations.
    pub fn series(&self, metric: Metric) -> Vec<MetricStat> {
        self.records.iter().map(|r| r.get(metric)).collect()
    }

    /// Iteration-0 value of a metric, if the baseline has been recorded.
    pub fn baseline(&self, metric: Metric) -> Option<MetricStat> {
        self.records.first().map(|r| r.get(metric))
    }

    /// Flatten into the column layout written to `history.json`.
    pub fn to_file(&self) -> HistoryFile {
        let metrics = Metric::ALL
            .iter()
            .map(|&m| {
                let series = self.series(m);
                let trace = MetricTrace {
                    mean: series.iter().map(|s| s.mean).collect(),
                    std: series.iter().map(|s| s.std).collect(),
                };
                (m.key().to_string(), trace)
            })
            .collect();
        HistoryFile {
            iterations: self.iterations(),
            metrics,
        }
    }

    /// Rebuild (and re-validate) a history from its serialized form.
    pub fn from_file(file: &HistoryFile) -> Result<Self, ApeError> {
        let mut history = History::new();
        for (row, &iteration) in file.iterations.iter().enumerate() {
            let mut stats = BTreeMap::new();
            for (key, trace) in &file.metrics {
                let Some(metric) = Metric::from_key(key) else {
                    continue;
                };
                if let (Some(&mean), Some(&std)) = (trace.mean.get(row), trace.std.get(row)) {
                    stats.insert(metric, MetricStat::new(mean, std));
                }
            }
            history.push(MetricRecord::new(iteration, stats)?)?;
        }
        Ok(history)
    }
}

/// Serialized history: metric key → ordered mean/std sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryFile {
    pub iterations: Vec<usize>,
    pub metrics: BTreeMap<String, MetricTrace>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrace {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// A generated summary kept for qualitative inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitativeSample {
    pub iteration: usize,
    pub article: String,
    pub reference: String,
    pub generated: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn full_stats(value: f64) -> BTreeMap<Metric, MetricStat> {
        Metric::ALL
            .iter()
            .map(|&m| (m, MetricStat::new(value, value / 10.0)))
            .collect()
    }

    #[test]
    fn test_stat_uses_population_std() {
        let stat = MetricStat::from_values(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_abs_diff_eq!(stat.mean, 2.5);
        assert_abs_diff_eq!(stat.std, 1.25_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_stat_of_empty_values_is_undefined() {
        assert!(MetricStat::from_values(&[]).is_none());
    }

    #[test]
    fn test_record_requires_every_metric() {
        let mut stats = full_stats(0.5);
        stats.remove(&Metric::BertScore);
        let err = MetricRecord::new(0, stats).unwrap_err();
        assert_eq!(
            err,
            ApeError::IncompleteRecord {
                iteration: 0,
                metric: "bert_score".into()
            }
        );
    }

    #[test]
    fn test_history_rejects_gaps() {
        let mut history = History::new();
        history.push(MetricRecord::new(0, full_stats(0.1)).unwrap()).unwrap();
        let err = history
            .push(MetricRecord::new(2, full_stats(0.2)).unwrap())
            .unwrap_err();
        assert_eq!(err, ApeError::HistoryGap { expected: 1, got: 2 });
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_history_series_and_baseline() {
        let mut history = History::new();
        for i in 0..3 {
            history
                .push(MetricRecord::new(i, full_stats(i as f64)).unwrap())
                .unwrap();
        }
        assert_eq!(history.iterations(), vec![0, 1, 2]);
        let means: Vec<f64> = history.series(Metric::Bleu).iter().map(|s| s.mean).collect();
        assert_eq!(means, vec![0.0, 1.0, 2.0]);
        assert_eq!(history.baseline(Metric::RougeL).unwrap().mean, 0.0);
    }

    #[test]
    fn test_history_file_round_trip() {
        let mut history = History::new();
        for i in 0..4 {
            history
                .push(MetricRecord::new(i, full_stats(i as f64 * 0.25)).unwrap())
                .unwrap();
        }
        let file = history.to_file();
        assert_eq!(file.metrics.len(), 4);
        assert_eq!(file.metrics["perplexity"].mean.len(), 4);

        let json = serde_json::to_string(&file).unwrap();
        let parsed: HistoryFile = serde_json::from_str(&json).unwrap();
        assert_eq!(History::from_file(&parsed).unwrap(), history);
    }

    #[test]
    fn test_metric_keys_round_trip() {
        for m in Metric::ALL {
            assert_eq!(Metric::from_key(m.key()), Some(m));
        }
        assert!(!Metric::Perplexity.higher_is_better());
        assert!(Metric::Bleu.higher_is_better());
    }
}
