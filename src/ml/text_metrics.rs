//! Lexical overlap metrics between a generated summary and its reference.
//!
//! Both texts are tokenised with the same lowercased word split the
//! vocabulary is built from, so punctuation and case never decide a match.

use std::collections::HashMap;

use crate::data::preprocessor::split_words;

/// Highest n-gram order used by BLEU
pub const BLEU_MAX_ORDER: usize = 4;

/// Sentence BLEU with clipped n-gram precision and brevity penalty.
///
/// The n-gram order is capped at the hypothesis length, so a short
/// candidate that matches its reference exactly scores 1.0 instead of
/// zero for lack of 4-grams. Returns a value in [0, 1].
pub fn bleu(candidate: &str, reference: &str) -> f64 {
    let hyp = split_words(candidate);
    let refs = split_words(reference);
    if hyp.is_empty() || refs.is_empty() {
        return 0.0;
    }

    let order = BLEU_MAX_ORDER.min(hyp.len());
    let mut log_precision_sum = 0.0;
    for n in 1..=order {
        let (clipped, total) = clipped_matches(&hyp, &refs, n);
        if total == 0 || clipped == 0 {
            return 0.0;
        }
        log_precision_sum += (clipped as f64 / total as f64).ln();
    }
    let geo_mean = (log_precision_sum / order as f64).exp();

    let (hyp_len, ref_len) = (hyp.len() as f64, refs.len() as f64);
    let brevity = if hyp_len >= ref_len {
        1.0
    } else {
        (1.0 - ref_len / hyp_len).exp()
    };

    (brevity * geo_mean).clamp(0.0, 1.0)
}

/// ROUGE-L F1 from the longest common subsequence. Returns a value in [0, 1].
pub fn rouge_l(candidate: &str, reference: &str) -> f64 {
    let hyp = split_words(candidate);
    let refs = split_words(reference);
    if hyp.is_empty() || refs.is_empty() {
        return 0.0;
    }

    let lcs = lcs_length(&hyp, &refs) as f64;
    let precision = lcs / hyp.len() as f64;
    let recall = lcs / refs.len() as f64;
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

fn clipped_matches(hyp: &[String], refs: &[String], n: usize) -> (usize, usize) {
    let hyp_ngrams = ngram_counts(hyp, n);
    let ref_ngrams = ngram_counts(refs, n);
    let total = hyp_ngrams.values().sum();
    let clipped = hyp_ngrams
        .iter()
        .map(|(gram, &count)| count.min(ref_ngrams.get(gram).copied().unwrap_or(0)))
        .sum();
    (clipped, total)
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

fn lcs_length(a: &[String], b: &[String]) -> usize {
    // Two rolling rows of the DP table.
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
