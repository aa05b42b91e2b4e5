// ============================================================
// Layer 4 — Iteration Batcher
// ============================================================
// Splits the ordered training corpus into K contiguous batches,
// one per APE iteration.
//
// How the split works:
//   M pairs, K iterations → base = M / K, extra = M % K
//   The first `extra` batches get base + 1 pairs, the rest get
//   base. Sizes therefore differ by at most one, the larger
//   batches come first, and together they cover 0..M exactly
//   once in order.
//
// Example with M = 10, K = 4:
//   batch 1: 0..3   batch 2: 3..6   batch 3: 6..8   batch 4: 8..10
//
// When K > M the trailing batches are empty. They still count
// as iterations (evaluated, recorded) but perturb nothing.

use std::ops::Range;

use crate::domain::corpus::{Corpus, SummaryPair};
use crate::domain::error::ApeError;

/// One iteration's slice of the training corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// 1-based iteration index (0 is reserved for the baseline)
    pub iteration: usize,

    /// Half-open range into the training corpus
    pub range: Range<usize>,

    /// Fixed learning rate shared by every batch of the run
    pub learning_rate: f64,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The pairs this batch covers.
    pub fn pairs<'a>(&self, corpus: &'a Corpus) -> &'a [SummaryPair] {
        &corpus.pairs()[self.range.clone()]
    }
}

/// Plans the contiguous per-iteration batches.
#[derive(Debug, Clone)]
pub struct IterationBatcher {
    iterations: usize,
    learning_rate: f64,
}

impl IterationBatcher {
    pub fn new(iterations: usize, learning_rate: f64) -> Self {
        Self {
            iterations,
            learning_rate,
        }
    }

    /// Partition `corpus_len` pairs into `iterations` batches.
    pub fn plan(&self, corpus_len: usize) -> Result<Vec<Batch>, ApeError> {
        if self.iterations == 0 || corpus_len == 0 {
            return Err(ApeError::InvalidBatchPlan {
                corpus_len,
                iterations: self.iterations,
            });
        }

        let base = corpus_len / self.iterations;
        let extra = corpus_len % self.iterations;

        let mut batches = Vec::with_capacity(self.iterations);
        let mut start = 0usize;
        for i in 0..self.iterations {
            let size = base + usize::from(i < extra);
            batches.push(Batch {
                iteration: i + 1,
                range: start..start + size,
                learning_rate: self.learning_rate,
            });
            start += size;
        }

        tracing::debug!(
            "Planned {} batches over {} pairs ({}-{} pairs each)",
            self.iterations,
            corpus_len,
            base,
            base + usize::from(extra > 0),
        );
        Ok(batches)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uneven_split_puts_larger_batches_first() {
        let batches = IterationBatcher::new(4, 1e-5).plan(10).unwrap();
        let ranges: Vec<_> = batches.iter().map(|b| b.range.clone()).collect();
        assert_eq!(ranges, vec![0..3, 3..6, 6..8, 8..10]);
        assert_eq!(
            batches.iter().map(|b| b.iteration).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[test]
    fn test_every_batch_carries_the_same_learning_rate() {
        let batches = IterationBatcher::new(3, 2.5e-6).plan(9).unwrap();
        assert!(batches.iter().all(|b| b.learning_rate == 2.5e-6));
    }

    #[test]
    fn test_more_iterations_than_pairs_gives_empty_tail() {
        let batches = IterationBatcher::new(5, 1e-5).plan(3).unwrap();
        assert_eq!(batches.len(), 5);
        assert_eq!(batches.iter().filter(|b| b.is_empty()).count(), 2);
    }

    #[test]
    fn test_zero_iterations_is_invalid() {
        let err = IterationBatcher::new(0, 1e-5).plan(10).unwrap_err();
        assert_eq!(
            err,
            ApeError::InvalidBatchPlan {
                corpus_len: 10,
                iterations: 0
            }
        );
    }

    #[test]
    fn test_empty_corpus_is_invalid() {
        assert!(IterationBatcher::new(3, 1e-5).plan(0).is_err());
    }

    #[test]
    fn test_pairs_slices_the_corpus() {
        let corpus = Corpus::new(
            (0..5)
                .map(|i| SummaryPair::new(format!("article {i}"), format!("summary {i}")))
                .collect(),
        );
        let batches = IterationBatcher::new(2, 1e-5).plan(corpus.len()).unwrap();
        assert_eq!(batches[0].pairs(&corpus).len(), 3);
        assert_eq!(batches[1].pairs(&corpus)[0].article, "article 3");
    }

    proptest! {
        #[test]
        fn prop_batches_cover_corpus_in_order(m in 1usize..2000, k in 1usize..64) {
            let batches = IterationBatcher::new(k, 1e-5).plan(m).unwrap();
            prop_assert_eq!(batches.len(), k);

            let floor = m / k;
            let ceil = (m + k - 1) / k;
            let mut expected_start = 0;
            for b in &batches {
                prop_assert_eq!(b.range.start, expected_start);
                prop_assert!(b.len() == floor || b.len() == ceil);
                expected_start = b.range.end;
            }
            prop_assert_eq!(expected_start, m);
            prop_assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), m);
        }
    }
}
