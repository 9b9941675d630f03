// ============================================================
// Error Taxonomy
// ============================================================
// Every fallible operation in the crate returns `crate::Result`,
// and every failure mode has a named variant. Callers can match
// on the variant instead of parsing message strings.
//
// The cache variants are deliberately split three ways:
//   CacheMiss   — nothing usable at the path (expected on first run)
//   CacheFormat — something IS there but cannot be trusted
//   CacheWrite  — the filesystem refused the save
// A caller that wants "load if possible, else rebuild" matches on
// CacheMiss only; a corrupt cache should never be silently rebuilt.
//
// Reference: Rust Book §9 (Error Handling)
//            thiserror crate documentation

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The raw dataset file could not be read or parsed,
    /// or it lacks a column the task requires.
    #[error("cannot load dataset from '{path}': {reason}")]
    DataLoad { path: PathBuf, reason: String },

    /// The tokenizer rejected the input, or the input text does
    /// not satisfy a task precondition (for example a missing
    /// [MASK] placeholder, or an answer span that aligns with
    /// no token boundary).
    #[error("tokenisation failed: {0}")]
    Tokenization(String),

    /// The preprocessed-data cache could not be written.
    #[error("cannot write preprocessed data to '{path}': {reason}")]
    CacheWrite { path: PathBuf, reason: String },

    /// A required cache partition is absent. This is the "nothing
    /// cached yet" case, not a corruption case.
    #[error("preprocessed-data cache at '{path}' has no '{partition}' partition")]
    CacheMiss { path: PathBuf, partition: String },

    /// The cache exists but is not in a usable state: legacy
    /// single-file layout, a missing or corrupt manifest, or an
    /// undecodable row.
    #[error("preprocessed-data cache at '{path}' is not usable: {reason}")]
    CacheFormat { path: PathBuf, reason: String },

    /// An operation was invoked before its sub-model was attached.
    /// The message names the call that would fix it.
    #[error("'{operation}' called before initialisation; call '{required}' first")]
    NotInitialized {
        operation: &'static str,
        required:  &'static str,
    },

    /// Arguments were malformed, out of range, or supplied in the
    /// retired dictionary shape.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A model directory could not be loaded: missing descriptor,
    /// unreadable weights, or a task-kind mismatch.
    #[error("cannot load model from '{path}': {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    /// A model directory could not be written.
    #[error("cannot save model to '{path}': {reason}")]
    ModelSave { path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn data_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataLoad { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn cache_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheWrite { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn cache_miss(path: impl Into<PathBuf>, partition: impl Into<String>) -> Self {
        Self::CacheMiss { path: path.into(), partition: partition.into() }
    }

    pub(crate) fn cache_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CacheFormat { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn model_save(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelSave { path: path.into(), reason: reason.into() }
    }
}
