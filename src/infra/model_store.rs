// ============================================================
// Model Store
// ============================================================
// Saves and restores a task model directory using Burn's
// CompactRecorder.
//
// Directory layout:
//   <dir>/
//     model.json       ← descriptor: task kind + architecture
//     model.mpk.gz     ← weights (recorder adds the extension;
//                        absent for a QA directory whose
//                        answering model was never initialised)
//     tokenizer.json   ← written by TokenizerStore
//
// Why save the descriptor separately?
//   When loading for inference we need the exact architecture
//   (d_model, num_layers, ...) to rebuild the model before the
//   weights can be loaded into it, and the task kind to refuse
//   a directory saved by a different wrapper.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack format
//   - Compresses with gzip for smaller file size
//   - Type-safe: loading fails if architecture doesn't match
//
// Reference: Burn Book §5 (Records and Checkpointing)

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ml::model::EncoderConfig;

const DESCRIPTOR_FILE: &str = "model.json";

/// Weights name used by every single-model task.
pub const WEIGHTS_NAME: &str = "model";

// ─── ModelKind ────────────────────────────────────────────────────────────────

/// Which task wrapper a saved directory belongs to. Stored in the
/// descriptor so a directory cannot be silently loaded by the
/// wrong wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    MaskedLm,
    TextToText,
    QuestionAnswering,
    NextSentence,
    TextClassification,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelKind::MaskedLm           => "masked-lm",
            ModelKind::TextToText         => "text-to-text",
            ModelKind::QuestionAnswering  => "question-answering",
            ModelKind::NextSentence       => "next-sentence",
            ModelKind::TextClassification => "text-classification",
        })
    }
}

// ─── ModelDescriptor ──────────────────────────────────────────────────────────

/// Everything needed to rebuild a model before loading weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub kind:        ModelKind,
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    /// Class names, classification only; index order is the
    /// class-id order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl ModelDescriptor {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            vocab_size:  30522,
            max_seq_len: 512,
            d_model:     256,
            num_heads:   8,
            num_layers:  6,
            d_ff:        1024,
            dropout:     0.1,
            labels:      None,
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig::new(
            self.vocab_size,
            self.max_seq_len,
            self.d_model,
            self.num_heads,
            self.num_layers,
            self.d_ff,
            self.dropout,
        )
    }
}

// ─── ModelStore ───────────────────────────────────────────────────────────────

/// One saved-model directory.
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_descriptor(&self, descriptor: &ModelDescriptor) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::model_save(&self.dir, e.to_string()))?;
        let path = self.dir.join(DESCRIPTOR_FILE);
        let json = serde_json::to_string_pretty(descriptor)
            .map_err(|e| Error::model_save(&path, e.to_string()))?;
        fs::write(&path, json).map_err(|e| Error::model_save(&path, e.to_string()))
    }

    pub fn load_descriptor(&self) -> Result<ModelDescriptor> {
        let path = self.dir.join(DESCRIPTOR_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            Error::model_load(&path, format!("{e}; is this a saved model directory?"))
        })?;
        serde_json::from_str(&json).map_err(|e| Error::model_load(&path, e.to_string()))
    }

    /// Load the descriptor and refuse a kind mismatch.
    pub fn load_descriptor_expecting(&self, kind: ModelKind) -> Result<ModelDescriptor> {
        let descriptor = self.load_descriptor()?;
        if descriptor.kind != kind {
            return Err(Error::model_load(
                &self.dir,
                format!("directory holds a {} model, expected {}", descriptor.kind, kind),
            ));
        }
        Ok(descriptor)
    }

    /// Save model weights under `<name>.mpk.gz`.
    pub fn save_weights<B: Backend, M: Module<B>>(&self, model: &M, name: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| Error::model_save(&self.dir, e.to_string()))?;
        // Path without extension — the recorder adds it
        let path = self.dir.join(name);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .map_err(|e| Error::model_save(&path, e.to_string()))?;
        tracing::debug!("Saved weights '{}' to '{}'", name, self.dir.display());
        Ok(())
    }

    /// Restore weights into a freshly initialised model of the
    /// matching architecture.
    pub fn load_weights<B: Backend, M: Module<B>>(
        &self,
        model:  M,
        name:   &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.dir.join(name);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .map_err(|e| Error::model_load(&path, e.to_string()))?;
        Ok(model.load_record(record))
    }

    pub fn has_weights(&self, name: &str) -> bool {
        self.dir.join(format!("{name}.mpk.gz")).exists()
    }
}
