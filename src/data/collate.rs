// ============================================================
// Batch Collators
// ============================================================
// Implement Burn's Batcher trait to turn a Vec<TokenizedRow>
// into model-ready tensors.
//
// Two collators cover every task:
//
//   PaddingCollator — pads each batch to its longest row and
//                     stacks. Used for span extraction,
//                     classification, and every inference path.
//   MaskingCollator — pads, then applies BERT-style dynamic
//                     masking to the labelled positions: each
//                     epoch sees a fresh corruption of the same
//                     rows. Used for masked-LM and text-to-text
//                     training.
//
// Rows arrive with differing lengths, so padding happens here
// rather than in the adapters: the pad length is the batch
// maximum, not a global constant.
//
// How stacking works:
//   We flatten all rows into one long Vec<i32> (Burn's Int input
//   type), build a 1D tensor, then reshape to [batch, seq].
//
// Reference: Burn Book §4 (Batcher)
//            Devlin et al. (2019) §3.1 — 80/10/10 masking

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use rand::Rng;

use crate::data::dataset::{TokenizedRow, IGNORE_LABEL};

// ─── TokenBatch ───────────────────────────────────────────────────────────────
/// One stacked batch. Every task reads `input_ids` and
/// `segment_ids`; the remaining tensors are per-task targets and
/// hold zeros for tasks that do not use them.
#[derive(Debug, Clone)]
pub struct TokenBatch<B: Backend> {
    /// Token ids — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// Segment ids (0 before the first [SEP], 1 after) —
    /// shape: [batch_size, seq_len]
    pub segment_ids: Tensor<B, 2, Int>,

    /// Per-position target ids, IGNORE_LABEL where unscored —
    /// shape: [batch_size, seq_len]
    pub labels: Tensor<B, 2, Int>,

    /// Class index per row (classification) — shape: [batch_size]
    pub class_targets: Tensor<B, 1, Int>,

    /// Answer start token index per row (QA) — shape: [batch_size]
    pub span_starts: Tensor<B, 1, Int>,

    /// Answer end token index per row (QA) — shape: [batch_size]
    pub span_ends: Tensor<B, 1, Int>,
}

// ─── Padding to the batch maximum ─────────────────────────────────────────────

struct PaddedGrid {
    input_ids:   Vec<Vec<u32>>,
    segment_ids: Vec<Vec<u32>>,
    labels:      Vec<Vec<i64>>,
    seq_len:     usize,
}

fn pad_to_batch_max(items: &[TokenizedRow], pad_id: u32) -> PaddedGrid {
    let seq_len = items.iter().map(TokenizedRow::len).max().unwrap_or(1).max(1);

    let mut input_ids   = Vec::with_capacity(items.len());
    let mut segment_ids = Vec::with_capacity(items.len());
    let mut labels      = Vec::with_capacity(items.len());

    for item in items {
        let mut ids  = item.input_ids.clone();
        let mut segs = item.segment_ids.clone();
        let mut labs = item.labels.clone();
        ids.resize(seq_len, pad_id);
        segs.resize(seq_len, 0);
        labs.resize(seq_len, IGNORE_LABEL);
        input_ids.push(ids);
        segment_ids.push(segs);
        labels.push(labs);
    }

    PaddedGrid { input_ids, segment_ids, labels, seq_len }
}

/// Stack a padded grid plus the per-row targets into tensors.
fn assemble<B: Backend>(grid: PaddedGrid, items: &[TokenizedRow], device: &B::Device) -> TokenBatch<B> {
    let batch_size = items.len();
    let seq_len    = grid.seq_len;

    let ids_flat: Vec<i32> = grid
        .input_ids
        .iter()
        .flat_map(|row| row.iter().map(|&x| x as i32))
        .collect();
    let segs_flat: Vec<i32> = grid
        .segment_ids
        .iter()
        .flat_map(|row| row.iter().map(|&x| x as i32))
        .collect();
    let labels_flat: Vec<i32> = grid
        .labels
        .iter()
        .flat_map(|row| row.iter().map(|&x| x as i32))
        .collect();

    let class_targets: Vec<i32> = items
        .iter()
        .map(|s| s.class_label.unwrap_or(0) as i32)
        .collect();
    let span_starts: Vec<i32> = items
        .iter()
        .map(|s| s.answer_span.map(|(start, _)| start as i32).unwrap_or(0))
        .collect();
    let span_ends: Vec<i32> = items
        .iter()
        .map(|s| s.answer_span.map(|(_, end)| end as i32).unwrap_or(0))
        .collect();

    let input_ids = Tensor::<B, 1, Int>::from_ints(
        ids_flat.as_slice(), device
    ).reshape([batch_size, seq_len]);

    let segment_ids = Tensor::<B, 1, Int>::from_ints(
        segs_flat.as_slice(), device
    ).reshape([batch_size, seq_len]);

    let labels = Tensor::<B, 1, Int>::from_ints(
        labels_flat.as_slice(), device
    ).reshape([batch_size, seq_len]);

    let class_targets = Tensor::<B, 1, Int>::from_ints(class_targets.as_slice(), device);
    let span_starts   = Tensor::<B, 1, Int>::from_ints(span_starts.as_slice(), device);
    let span_ends     = Tensor::<B, 1, Int>::from_ints(span_ends.as_slice(), device);

    TokenBatch {
        input_ids,
        segment_ids,
        labels,
        class_targets,
        span_starts,
        span_ends,
    }
}

/// Tensors for a single inference sequence, shape [1, len].
pub(crate) fn single_sequence<B: Backend>(
    ids:      &[u32],
    segments: &[u32],
    device:   &B::Device,
) -> (Tensor<B, 2, Int>, Tensor<B, 2, Int>) {
    let len = ids.len();
    let ids_flat:  Vec<i32> = ids.iter().map(|&x| x as i32).collect();
    let segs_flat: Vec<i32> = segments.iter().map(|&x| x as i32).collect();
    let input_ids = Tensor::<B, 1, Int>::from_ints(ids_flat.as_slice(), device).reshape([1, len]);
    let segment_ids = Tensor::<B, 1, Int>::from_ints(segs_flat.as_slice(), device).reshape([1, len]);
    (input_ids, segment_ids)
}

// ─── PaddingCollator ──────────────────────────────────────────────────────────
/// Pads and stacks, nothing more. Labels pass through exactly as
/// the adapter produced them.
#[derive(Clone, Debug)]
pub struct PaddingCollator<B: Backend> {
    pub device: B::Device,
    pub pad_id: u32,
}

impl<B: Backend> PaddingCollator<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }
}

impl<B: Backend> Batcher<TokenizedRow, TokenBatch<B>> for PaddingCollator<B> {
    fn batch(&self, items: Vec<TokenizedRow>) -> TokenBatch<B> {
        let grid = pad_to_batch_max(&items, self.pad_id);
        assemble(grid, &items, &self.device)
    }
}

// ─── MaskingCollator ──────────────────────────────────────────────────────────
/// Dynamic masking. Each labelled position is independently
/// selected with `mask_probability`; a selected position keeps
/// its original id as the label and has its input corrupted:
/// 80% → [MASK], 10% → a random id, 10% → left unchanged.
/// Unselected positions are excluded from the loss.
///
/// Corruption happens at batch time, so every epoch draws a
/// fresh pattern over the same rows.
#[derive(Clone, Debug)]
pub struct MaskingCollator<B: Backend> {
    pub device:           B::Device,
    pub mask_id:          u32,
    pub pad_id:           u32,
    pub vocab_size:       usize,
    pub mask_probability: f64,
}

impl<B: Backend> MaskingCollator<B> {
    pub fn new(
        device:           B::Device,
        mask_id:          u32,
        pad_id:           u32,
        vocab_size:       usize,
        mask_probability: f64,
    ) -> Self {
        Self { device, mask_id, pad_id, vocab_size, mask_probability }
    }
}

impl<B: Backend> Batcher<TokenizedRow, TokenBatch<B>> for MaskingCollator<B> {
    fn batch(&self, items: Vec<TokenizedRow>) -> TokenBatch<B> {
        let mut grid = pad_to_batch_max(&items, self.pad_id);
        let mut rng  = rand::thread_rng();

        for row in 0..grid.input_ids.len() {
            for pos in 0..grid.seq_len {
                if grid.labels[row][pos] < 0 {
                    continue;
                }
                if rng.gen::<f64>() < self.mask_probability {
                    let roll: f64 = rng.gen();
                    if roll < 0.8 {
                        grid.input_ids[row][pos] = self.mask_id;
                    } else if roll < 0.9 {
                        grid.input_ids[row][pos] = rng.gen_range(0..self.vocab_size as u32);
                    }
                    // remaining 10%: input stays, label still scores
                } else {
                    grid.labels[row][pos] = IGNORE_LABEL;
                }
            }
        }

        assemble(grid, &items, &self.device)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::NdArray;

    fn row(ids: Vec<u32>, labels: Vec<i64>) -> TokenizedRow {
        let segs = vec![0; ids.len()];
        TokenizedRow::new(ids, segs, labels)
    }

    #[test]
    fn test_padding_collator_pads_to_batch_max() {
        let device = Default::default();
        let collator = PaddingCollator::<TestBackend>::new(device, 0);

        let batch = collator.batch(vec![
            row(vec![101, 7, 102], vec![IGNORE_LABEL, 7, IGNORE_LABEL]),
            row(vec![101, 8, 9, 10, 102], vec![IGNORE_LABEL, 8, 9, 10, IGNORE_LABEL]),
        ]);

        assert_eq!(batch.input_ids.dims(), [2, 5]);
        let ids = batch.input_ids.into_data().to_vec::<i64>().unwrap();
        assert_eq!(&ids[0..5], &[101, 7, 102, 0, 0]);

        let labels = batch.labels.into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels[3], IGNORE_LABEL);
        assert_eq!(labels[4], IGNORE_LABEL);
    }

    #[test]
    fn test_masking_collator_zero_probability_changes_nothing() {
        let device = Default::default();
        let collator = MaskingCollator::<TestBackend>::new(device, 103, 0, 200, 0.0);

        let batch = collator.batch(vec![row(vec![101, 7, 8, 102], vec![IGNORE_LABEL, 7, 8, IGNORE_LABEL])]);

        let ids = batch.input_ids.into_data().to_vec::<i64>().unwrap();
        assert_eq!(ids, vec![101, 7, 8, 102]);
        // No position selected means no position is scored
        let labels = batch.labels.into_data().to_vec::<i64>().unwrap();
        assert!(labels.iter().all(|&l| l == IGNORE_LABEL));
    }

    #[test]
    fn test_masking_collator_full_probability_scores_every_labelled_position() {
        let device = Default::default();
        let collator = MaskingCollator::<TestBackend>::new(device, 103, 0, 200, 1.0);

        let batch = collator.batch(vec![row(vec![101, 7, 8, 102], vec![IGNORE_LABEL, 7, 8, IGNORE_LABEL])]);

        // Inputs may be corrupted either way, but labels must hold
        // the original ids at every labelled position.
        let labels = batch.labels.into_data().to_vec::<i64>().unwrap();
        assert_eq!(labels, vec![IGNORE_LABEL, 7, 8, IGNORE_LABEL]);
    }

    #[test]
    fn test_per_row_targets_ride_along() {
        let device = Default::default();
        let collator = PaddingCollator::<TestBackend>::new(device, 0);

        let mut sample = row(vec![101, 7, 8, 102], vec![IGNORE_LABEL; 4]);
        sample.class_label = Some(3);
        sample.answer_span = Some((1, 2));

        let batch = collator.batch(vec![sample]);
        assert_eq!(batch.class_targets.into_data().to_vec::<i64>().unwrap(), vec![3]);
        assert_eq!(batch.span_starts.into_data().to_vec::<i64>().unwrap(), vec![1]);
        assert_eq!(batch.span_ends.into_data().to_vec::<i64>().unwrap(), vec![2]);
    }

    #[test]
    fn test_single_sequence_has_unit_batch_dimension() {
        let device = Default::default();
        let (ids, segs) = single_sequence::<TestBackend>(&[101, 7, 102], &[0, 0, 0], &device);
        assert_eq!(ids.dims(), [1, 3]);
        assert_eq!(segs.dims(), [1, 3]);
    }
}
