// ============================================================
// Training Loop
// ============================================================
// One train + validation loop shared by every task, generic over
// the head model through the BatchLoss trait.
//
// Backend split:
//   - Training runs on B (an AutodiffBackend) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - The validation collator must also target B::InnerBackend,
//     which disables dropout and autodiff overhead
//
// The caller hands in two collators instead of one for exactly
// this reason; they may also differ in kind (masking for the
// train side, plain padding for validation is a valid pairing).
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use std::sync::Arc;

use burn::{
    data::dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::config::TrainArgs;
use crate::data::collate::TokenBatch;
use crate::data::dataset::{TokenizedDataset, TokenizedRow};
use crate::domain::results::EvalResult;
use crate::error::Result;
use crate::ml::model::BatchLoss;

/// Seed for the training loader's per-epoch shuffle.
pub const SHUFFLE_SEED: u64 = 42;

/// Run the full epoch loop and hand back the trained model.
///
/// The eval partition may be empty; the validation pass then
/// reports NaN loss and the loop keeps going.
pub fn run_train<B, M, CT, CV>(
    mut model:      M,
    train_data:     TokenizedDataset,
    eval_data:      TokenizedDataset,
    train_collator: CT,
    valid_collator: CV,
    args:           &TrainArgs,
) -> Result<M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + BatchLoss<B>,
    M::InnerModule: BatchLoss<B::InnerBackend>,
    CT: Batcher<TokenizedRow, TokenBatch<B>> + Clone + Send + Sync + 'static,
    CV: Batcher<TokenizedRow, TokenBatch<B::InnerBackend>> + Clone + Send + Sync + 'static,
{
    // ── Adam optimiser ────────────────────────────────────────────────────────
    // m = β1*m + (1-β1)*g        (mean)
    // v = β2*v + (1-β2)*g²       (variance)
    // θ = θ - lr * m / (√v + ε)  (update)
    let optim_cfg = AdamConfig::new().with_epsilon(1e-8);
    let mut optim = optim_cfg.init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_loader = DataLoaderBuilder::new(train_collator)
        .batch_size(args.batch_size)
        .shuffle(SHUFFLE_SEED)
        .num_workers(1)
        .build(train_data);

    // ── Validation data loader (InnerBackend, unshuffled) ─────────────────────
    let valid_loader = DataLoaderBuilder::new(valid_collator)
        .batch_size(args.batch_size)
        .num_workers(1)
        .build(eval_data);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=args.num_train_epochs {
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let loss = model.batch_loss(batch);

            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();
            train_loss_sum += loss_val;
            train_batches  += 1;

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(args.learning_rate, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else {
            f64::NAN
        };

        // model.valid() → the head on B::InnerBackend, dropout off
        let eval = eval_pass(&model.valid(), &valid_loader);

        match eval.accuracy {
            Some(accuracy) => tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | eval_loss={:.4} | accuracy={:.1}%",
                epoch, args.num_train_epochs, avg_train_loss, eval.loss, accuracy * 100.0,
            ),
            None => tracing::info!(
                "Epoch {:>3}/{} | train_loss={:.4} | eval_loss={:.4}",
                epoch, args.num_train_epochs, avg_train_loss, eval.loss,
            ),
        }
    }

    tracing::info!("Training complete");
    Ok(model)
}

/// Average loss (and accuracy where the head reports counts) over
/// one pass of the loader. No optimiser, no gradients.
pub(crate) fn eval_pass<B, M>(model: &M, loader: &Arc<dyn DataLoader<TokenBatch<B>>>) -> EvalResult
where
    B: Backend,
    M: BatchLoss<B>,
{
    let mut loss_sum = 0.0f64;
    let mut batches  = 0usize;
    let mut correct  = 0usize;
    let mut total    = 0usize;
    let mut counted  = false;

    for batch in loader.iter() {
        let loss: f64 = model.batch_loss(batch.clone()).into_scalar().elem::<f64>();
        loss_sum += loss;
        batches  += 1;

        if let Some((batch_correct, batch_total)) = model.batch_correct(batch) {
            counted  = true;
            correct += batch_correct;
            total   += batch_total;
        }
    }

    let loss = if batches > 0 {
        (loss_sum / batches as f64) as f32
    } else {
        f32::NAN
    };
    let accuracy = if counted && total > 0 {
        Some(correct as f32 / total as f32)
    } else {
        None
    };

    EvalResult { loss, accuracy }
}

/// Standalone evaluation over a tokenised dataset.
pub fn run_eval<B, M, C>(
    model:      &M,
    eval_data:  TokenizedDataset,
    collator:   C,
    batch_size: usize,
) -> EvalResult
where
    B: Backend,
    M: BatchLoss<B>,
    C: Batcher<TokenizedRow, TokenBatch<B>> + Clone + Send + Sync + 'static,
{
    let loader = DataLoaderBuilder::new(collator)
        .batch_size(batch_size)
        .num_workers(1)
        .build(eval_data);

    let result = eval_pass(model, &loader);
    match result.accuracy {
        Some(accuracy) => tracing::info!(
            "Evaluation | loss={:.4} | accuracy={:.1}%",
            result.loss,
            accuracy * 100.0
        ),
        None => tracing::info!("Evaluation | loss={:.4}", result.loss),
    }
    result
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::collate::PaddingCollator;
    use crate::data::dataset::IGNORE_LABEL;
    use crate::ml::model::EncoderConfig;

    type TestAutodiff = burn::backend::Autodiff<burn::backend::NdArray>;
    type TestInner    = burn::backend::NdArray;

    fn tiny_config() -> EncoderConfig {
        EncoderConfig::new(16, 8, 8, 2, 1, 16, 0.0)
    }

    fn labelled_rows() -> Vec<TokenizedRow> {
        (0..4)
            .map(|i| {
                let mut row = TokenizedRow::new(
                    vec![1, 4 + i as u32, 2],
                    vec![0, 0, 0],
                    vec![IGNORE_LABEL; 3],
                );
                row.class_label = Some((i % 2) as i64);
                row
            })
            .collect()
    }

    #[test]
    fn test_one_epoch_trains_and_returns_the_model() {
        let device = Default::default();
        let model = tiny_config().init_classifier::<TestAutodiff>(2, &device);

        let args = TrainArgs {
            num_train_epochs: 1,
            batch_size:       2,
            ..Default::default()
        };

        let trained = run_train(
            model,
            TokenizedDataset::new(labelled_rows()),
            TokenizedDataset::new(labelled_rows()),
            PaddingCollator::<TestAutodiff>::new(device, 0),
            PaddingCollator::<TestInner>::new(Default::default(), 0),
            &args,
        )
        .unwrap();

        let result = run_eval(
            &trained.valid(),
            TokenizedDataset::new(labelled_rows()),
            PaddingCollator::<TestInner>::new(Default::default(), 0),
            2,
        );
        assert!(result.loss.is_finite());
        assert!(result.accuracy.is_some());
    }

    #[test]
    fn test_empty_eval_partition_reports_nan_loss() {
        let device = Default::default();
        let model = tiny_config().init_classifier::<TestInner>(2, &device);

        let result = run_eval(
            &model,
            TokenizedDataset::new(Vec::new()),
            PaddingCollator::<TestInner>::new(device, 0),
            2,
        );
        assert!(result.loss.is_nan());
        assert!(result.accuracy.is_none());
    }
}
