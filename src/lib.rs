//! # Alegre: Task Wrappers over Burn Transformers
//!
//! Alegre wraps a compact transformer encoder behind five task-level entry
//! points, so the common NLP chores take a handful of calls instead of a
//! hand-rolled training loop:
//!
//! - **WordPrediction**: fill a single `[MASK]` placeholder, or extend a text
//! - **TextToText**: sequence-to-sequence generation by iterative mask infill
//! - **QuestionAnswering**: extractive span answers over a context
//! - **NextSentence**: does sentence B plausibly follow sentence A?
//! - **TextClassification**: sequence-level labels over the pooled [CLS] state
//!
//! Every wrapper shares one data pipeline (CSV/TSV loading, a deterministic
//! evaluation split, parallel tokenisation, a preprocessed-data cache) and one
//! persistence layout (a model directory holding descriptor, weights, and
//! tokenizer), so what you learn on one task carries to the rest.
//!
//! ## Module map
//!
//! - **tasks**: the five task wrappers
//! - **data**: loader, splitter, tokenisation adapters, cache, collators
//! - **ml**: the encoder, its task heads, the training loop, output ranking
//! - **infra**: model and tokenizer persistence
//! - **config**: train/eval argument records and device selection
//! - **domain**: raw rows and task result records
//! - **error**: the crate-wide error type

#![recursion_limit = "256"]

pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod infra;
pub mod ml;
pub mod tasks;

// Re-export the types a caller touches in a typical session.
pub use config::{EvalArgs, ExecutionTarget, TrainArgs};
pub use data::loader::FileFormat;
pub use domain::results::{
    Answer, EvalResult, LabelScore, NextSentenceResult, WordPredictionResult,
};
pub use error::{Error, Result};
pub use infra::model_store::{ModelDescriptor, ModelKind};
pub use tasks::next_sentence::NextSentence;
pub use tasks::question_answering::QuestionAnswering;
pub use tasks::text_classification::TextClassification;
pub use tasks::text_to_text::TextToText;
pub use tasks::word_prediction::WordPrediction;

/// Autodiff-capable default backend for training and fine-tuning.
pub type DefaultBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Plain default backend for inference-only use.
pub type DefaultInferenceBackend = burn::backend::Wgpu;
