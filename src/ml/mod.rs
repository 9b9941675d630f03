// ============================================================
// ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code apart
// from the data collators. Task wrappers drive it; nothing in
// here knows about files or tokenizers.
//
// What's in this layer:
//
//   model.rs   — The shared transformer encoder plus one thin
//                head per task:
//                • Token / positional / segment embeddings
//                • Multi-head self-attention blocks (GELU FFN,
//                  residuals, layer norm)
//                • Masked-LM, next-sentence, span-extraction
//                  and classification heads
//                • The BatchLoss seam the trainer drives
//
//   trainer.rs — The epoch loop: forward, masked/CE loss,
//                backward, Adam step, per-epoch validation
//
//   ranking.rs — Pure score ordering for inference output
//                (top-k, multi-token candidate aggregation)
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            Devlin et al. (2019) BERT

/// Shared encoder, task heads, and loss functions
pub mod model;

/// Generic training and evaluation loops
pub mod trainer;

/// Deterministic ordering of prediction scores
pub mod ranking;
