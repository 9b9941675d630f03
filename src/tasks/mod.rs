// ============================================================
// Task Wrappers
// ============================================================
// The public face of the crate: one struct per task, each owning
// everything a call needs (tokenizer, special-token ids, model,
// device, architecture descriptor). Construct once, then call
// inference, train, eval, and save methods on it.
//
// Construction paths:
//   from_pretrained — load a saved model directory (descriptor +
//                     weights + tokenizer), refusing directories
//                     saved by a different task
//   create          — build a fresh model and tokenizer from a
//                     corpus, written to the directory up front
//
// Training always runs on an AutodiffBackend; inference goes
// through model.valid(), which drops to the inner backend and
// disables dropout. NextSentence is the exception: it is
// inference-only and generic over a plain Backend.
//
// Reference: Burn Book §6 (Import & Inference)

/// Masked-word prediction and text completion
pub mod word_prediction;

/// Input → target text generation by iterative mask infill
pub mod text_to_text;

/// Extractive question answering over a context passage
pub mod question_answering;

/// Sentence-continuation probability
pub mod next_sentence;

/// Single-text classification with named labels
pub mod text_classification;
