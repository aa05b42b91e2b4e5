// ============================================================
// Layer 4 — Train / Held-out Splitter
// ============================================================
// Splits one ordered list of pairs into a training prefix and a
// disjoint held-out block that immediately follows it:
//
//   [ 0 .. train_limit )                      → training
//   [ train_limit .. train_limit+test_limit ) → evaluation
//
// No shuffling: the APE protocol depends on the training corpus
// keeping its original order, and a fixed held-out block makes
// every iteration score the same articles.

/// Split `items` into (train, held_out) without reordering.
pub fn split_holdout<T>(mut items: Vec<T>, train_limit: usize, test_limit: usize) -> (Vec<T>, Vec<T>) {
    let total = items.len();
    let train_end = train_limit.min(total);
    let test_end = train_end.saturating_add(test_limit).min(total);

    items.truncate(test_end);
    let held_out = items.split_off(train_end);

    tracing::debug!(
        "Corpus split: {} training, {} held out ({} unused)",
        items.len(),
        held_out.len(),
        total - test_end,
    );

    (items, held_out)
}
