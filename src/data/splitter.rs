// ============================================================
// Train/Eval Splitter
// ============================================================
// When no explicit eval file is supplied, rows are shuffled and
// a fraction is held out for evaluation.
//
// Why a FIXED seed?
//   Re-running the same training command must hold out the same
//   rows, otherwise eval losses are not comparable between runs
//   and a cached preprocessed dataset would disagree with a
//   freshly split one.
//
// Why shuffle at all?
//   Input files are often ordered (all of one topic first).
//   Without shuffling, the eval partition would only contain
//   the tail of the file.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom.
//
// Reference: rand crate documentation
//            Rust Book §8 (Vectors)

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Seed for the hold-out shuffle. Fixed on purpose: identical
/// inputs must produce identical partitions across runs.
pub const SPLIT_SEED: u64 = 42;

/// Shuffle `rows` with the fixed seed and split off an eval
/// partition of ⌊len * eval_ratio⌋ rows.
///
/// Returns `(train, eval)`. Together they contain every input row
/// exactly once.
pub fn split_eval_ratio<T>(mut rows: Vec<T>, eval_ratio: f64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    rows.shuffle(&mut rng);

    let total    = rows.len();
    let eval_len = ((total as f64) * eval_ratio) as usize;
    let eval_len = eval_len.min(total);

    // split_off(n) keeps [0..n] in `rows` and returns [n..];
    // the first eval_len shuffled rows become the eval partition
    let train = rows.split_off(eval_len);

    tracing::debug!(
        "Dataset split: {} training, {} evaluation",
        train.len(),
        rows.len(),
    );

    (train, rows)
}
