// ============================================================
// Training / Evaluation Arguments + Execution Target
// ============================================================
// All knobs a caller can turn, as plain serialisable structs.
// Every field has a default, so call sites override only what
// they care about:
//
//   let args = TrainArgs { num_train_epochs: 1, ..Default::default() };
//
// JSON entry point:
//   Earlier releases of this kind of wrapper accepted loosely-typed
//   dictionaries of hyperparameters. That shape is retired: the only
//   untyped entry left is `from_json_str`, and it deserialises with
//   deny_unknown_fields, so any stray or misspelt key is rejected
//   with a ConfigurationError instead of being silently ignored.
//
// Reference: serde crate documentation
//            Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::loader::FileFormat;
use crate::error::{Error, Result};

// ─── TrainArgs ────────────────────────────────────────────────────────────────
/// Hyperparameters and pipeline switches for a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainArgs {
    /// Number of passes over the training partition
    pub num_train_epochs: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Samples per mini-batch
    pub batch_size: usize,
    /// Fraction of rows held out for evaluation when no explicit
    /// eval file is given (seeded shuffle, then split)
    pub eval_ratio: f64,
    /// File format of the input dataset
    pub file_format: FileFormat,
    /// Write the tokenised datasets to `save_preprocessed_data_path`
    pub save_preprocessed_data: bool,
    pub save_preprocessed_data_path: Option<PathBuf>,
    /// Read tokenised datasets from `load_preprocessed_data_path`
    /// instead of tokenising (takes precedence over saving; if both
    /// flags are set the loaded data is re-saved and a warning is
    /// logged)
    pub load_preprocessed_data: bool,
    pub load_preprocessed_data_path: Option<PathBuf>,
    /// Worker threads for per-row tokenisation
    pub preprocessing_threads: usize,
    /// Probability that a label-bearing position is corrupted by the
    /// masking collator
    pub mask_probability: f64,
    /// Token budget per encoded input sequence
    pub max_input_length: usize,
    /// Token budget for the target side of text-to-text pairs
    pub max_output_length: usize,
}

impl Default for TrainArgs {
    fn default() -> Self {
        Self {
            num_train_epochs:            3,
            learning_rate:               5e-5,
            batch_size:                  8,
            eval_ratio:                  0.1,
            file_format:                 FileFormat::Csv,
            save_preprocessed_data:      false,
            save_preprocessed_data_path: None,
            load_preprocessed_data:      false,
            load_preprocessed_data_path: None,
            preprocessing_threads:       1,
            mask_probability:            0.15,
            max_input_length:            128,
            max_output_length:           32,
        }
    }
}

impl TrainArgs {
    /// Parse arguments from a JSON object string.
    ///
    /// Unknown keys are a hard error: the dictionary-style argument
    /// shape of older wrappers is not accepted here.
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_args(json)
    }

    /// Check cross-field consistency before a run starts.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.eval_ratio) {
            return Err(Error::Configuration(format!(
                "eval_ratio must be in [0, 1), got {}",
                self.eval_ratio
            )));
        }
        if !(0.0..=1.0).contains(&self.mask_probability) {
            return Err(Error::Configuration(format!(
                "mask_probability must be in [0, 1], got {}",
                self.mask_probability
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be at least 1".into()));
        }
        if self.max_input_length == 0 {
            return Err(Error::Configuration("max_input_length must be at least 1".into()));
        }
        if self.save_preprocessed_data && self.save_preprocessed_data_path.is_none() {
            return Err(Error::Configuration(
                "save_preprocessed_data is set but save_preprocessed_data_path is not".into(),
            ));
        }
        if self.load_preprocessed_data && self.load_preprocessed_data_path.is_none() {
            return Err(Error::Configuration(
                "load_preprocessed_data is set but load_preprocessed_data_path is not".into(),
            ));
        }
        Ok(())
    }
}

// ─── EvalArgs ─────────────────────────────────────────────────────────────────
/// Pipeline switches for a standalone evaluation run.
/// A subset of TrainArgs — evaluation has no optimiser knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalArgs {
    pub batch_size: usize,
    pub file_format: FileFormat,
    pub save_preprocessed_data: bool,
    pub save_preprocessed_data_path: Option<PathBuf>,
    pub load_preprocessed_data: bool,
    pub load_preprocessed_data_path: Option<PathBuf>,
    pub preprocessing_threads: usize,
    pub mask_probability: f64,
    pub max_input_length: usize,
    pub max_output_length: usize,
}

impl Default for EvalArgs {
    fn default() -> Self {
        Self {
            batch_size:                  8,
            file_format:                 FileFormat::Csv,
            save_preprocessed_data:      false,
            save_preprocessed_data_path: None,
            load_preprocessed_data:      false,
            load_preprocessed_data_path: None,
            preprocessing_threads:       1,
            mask_probability:            0.15,
            max_input_length:            128,
            max_output_length:           32,
        }
    }
}

impl EvalArgs {
    /// Parse arguments from a JSON object string (strict keys,
    /// same contract as `TrainArgs::from_json_str`).
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_args(json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.mask_probability) {
            return Err(Error::Configuration(format!(
                "mask_probability must be in [0, 1], got {}",
                self.mask_probability
            )));
        }
        if self.load_preprocessed_data && self.load_preprocessed_data_path.is_none() {
            return Err(Error::Configuration(
                "load_preprocessed_data is set but load_preprocessed_data_path is not".into(),
            ));
        }
        Ok(())
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| {
        Error::Configuration(format!(
            "arguments must match the structured argument type exactly; \
             free-form dictionaries are no longer accepted ({e})"
        ))
    })
}

// ─── ExecutionTarget ──────────────────────────────────────────────────────────
/// Where the default WGPU backend should run.
///
/// The caller picks a target (or `Auto`) and resolves it to a device
/// value once, up front. There is no silent probe-and-fallback chain
/// hidden inside a constructor: the resolved device is an ordinary
/// value passed to `from_pretrained`/`create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionTarget {
    /// Let wgpu pick the best available adapter
    Auto,
    /// Force the CPU adapter
    Cpu,
    /// A specific discrete GPU, by index
    DiscreteGpu(usize),
    /// A specific integrated GPU, by index
    IntegratedGpu(usize),
}

impl ExecutionTarget {
    /// Resolve to a concrete WGPU device value.
    pub fn resolve(self) -> burn::backend::wgpu::WgpuDevice {
        use burn::backend::wgpu::WgpuDevice;
        let device = match self {
            ExecutionTarget::Auto             => WgpuDevice::default(),
            ExecutionTarget::Cpu              => WgpuDevice::Cpu,
            ExecutionTarget::DiscreteGpu(i)   => WgpuDevice::DiscreteGpu(i),
            ExecutionTarget::IntegratedGpu(i) => WgpuDevice::IntegratedGpu(i),
        };
        tracing::info!("Execution target {:?} resolved to {:?}", self, device);
        device
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        TrainArgs::default().validate().unwrap();
        EvalArgs::default().validate().unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let args = TrainArgs { num_train_epochs: 7, ..Default::default() };
        let json = serde_json::to_string(&args).unwrap();
        let back = TrainArgs::from_json_str(&json).unwrap();
        assert_eq!(back.num_train_epochs, 7);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let args = TrainArgs::from_json_str(r#"{"batch_size": 2}"#).unwrap();
        assert_eq!(args.batch_size, 2);
        assert_eq!(args.num_train_epochs, TrainArgs::default().num_train_epochs);
    }

    #[test]
    fn test_unknown_key_is_a_configuration_error() {
        // "lr" was a dictionary-era key; the structured field is learning_rate
        let err = TrainArgs::from_json_str(r#"{"lr": 0.001}"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_mistyped_value_is_a_configuration_error() {
        let err = TrainArgs::from_json_str(r#"{"batch_size": "eight"}"#).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_eval_ratio_bounds() {
        let args = TrainArgs { eval_ratio: 1.0, ..Default::default() };
        assert!(matches!(args.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_save_flag_requires_path() {
        let args = TrainArgs { save_preprocessed_data: true, ..Default::default() };
        assert!(matches!(args.validate(), Err(Error::Configuration(_))));
    }
}
