// ============================================================
// Text-to-Text Task
// ============================================================
// Input → target generation built on the same masked-LM head as
// word prediction. There is no decoder stack:
//
//   Training  — rows are [CLS] input [SEP] target [SEP] with
//               labels only on the target side, so dynamic
//               masking teaches the model to reconstruct the
//               target conditioned on the input.
//   Decoding  — iterative mask infill: append [MASK] after the
//               committed output, take the top pick, repeat.
//               The model signals completion by predicting the
//               closing [SEP], which it saw labelled during
//               training.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::activation;
use burn::tensor::backend::AutodiffBackend;
use tokenizers::Tokenizer;

use crate::config::{EvalArgs, TrainArgs};
use crate::data::adapter::{encode_ids, segment_ids_after_first_sep, PairAdapter, SpecialTokens};
use crate::data::collate::{single_sequence, MaskingCollator};
use crate::data::pipeline::{preprocess_eval, preprocess_train};
use crate::domain::results::EvalResult;
use crate::error::{Error, Result};
use crate::infra::model_store::{ModelDescriptor, ModelKind, ModelStore, WEIGHTS_NAME};
use crate::infra::tokenizer_store::{embedding_vocab_size, TokenizerStore};
use crate::ml::model::MaskedLanguageModel;
use crate::ml::ranking;
use crate::ml::trainer::{run_eval, run_train};

#[derive(Debug)]
pub struct TextToText<B: AutodiffBackend> {
    tokenizer:  Tokenizer,
    specials:   SpecialTokens,
    descriptor: ModelDescriptor,
    model:      MaskedLanguageModel<B>,
    device:     B::Device,
}

impl<B: AutodiffBackend> TextToText<B> {
    /// Load a saved text-to-text directory.
    pub fn from_pretrained(dir: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        let store      = ModelStore::new(dir);
        let descriptor = store.load_descriptor_expecting(ModelKind::TextToText)?;
        let tokenizer  = TokenizerStore::new(store.dir()).load()?;
        let specials   = SpecialTokens::from_tokenizer(&tokenizer)?;

        let model = descriptor.encoder_config().init_masked_lm::<B>(&device);
        let model = store.load_weights(model, WEIGHTS_NAME, &device)?;
        tracing::info!("Loaded {} model from '{}'", descriptor.kind, store.dir().display());

        Ok(Self { tokenizer, specials, descriptor, model, device })
    }

    /// Build a fresh model in `dir`, with a tokenizer derived from
    /// `corpus` unless the directory already holds one.
    pub fn create(
        dir:            impl Into<PathBuf>,
        mut descriptor: ModelDescriptor,
        corpus:         &[String],
        device:         B::Device,
    ) -> Result<Self> {
        descriptor.kind = ModelKind::TextToText;
        let store = ModelStore::new(dir);

        let tokenizer =
            TokenizerStore::new(store.dir()).load_or_build(corpus, descriptor.vocab_size)?;
        descriptor.vocab_size = descriptor.vocab_size.max(embedding_vocab_size(&tokenizer));
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;

        let model = descriptor.encoder_config().init_masked_lm::<B>(&device);
        store.save_descriptor(&descriptor)?;
        store.save_weights(&model, WEIGHTS_NAME)?;

        Ok(Self { tokenizer, specials, descriptor, model, device })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Generate up to `max_output_length` tokens for `input`.
    /// Decoding stops early when the model predicts the closing
    /// [SEP] or the window fills up.
    pub fn generate_text(&self, input: &str, max_output_length: usize) -> Result<String> {
        let input_ids = encode_ids(&self.tokenizer, input)?;
        let mut out: Vec<u32> = Vec::new();

        for _ in 0..max_output_length {
            // [CLS] input [SEP] out.. [MASK] [SEP]
            let mut ids = Vec::with_capacity(input_ids.len() + out.len() + 3);
            ids.push(self.specials.cls);
            ids.extend_from_slice(&input_ids);
            ids.push(self.specials.sep);
            ids.extend_from_slice(&out);
            ids.push(self.specials.mask);
            ids.push(self.specials.sep);
            if ids.len() > self.descriptor.max_seq_len {
                break;
            }
            let mask_pos = ids.len() - 2;
            let segments = segment_ids_after_first_sep(&ids, self.specials.sep);

            let probs = self.distribution_at(&ids, &segments, mask_pos);
            let Some(best) = ranking::top_k(&probs, 1).into_iter().next() else {
                break;
            };
            let token_id = best.index as u32;
            // [SEP] is the trained end-of-target signal
            if self.specials.is_special(token_id) {
                break;
            }
            out.push(token_id);
        }

        self.tokenizer
            .decode(&out, true)
            .map_err(|e| Error::Tokenization(format!("cannot decode generated text: {e}")))
    }

    /// Fine-tune on a CSV file with `input` and `target` columns.
    pub fn train(&mut self, path: &Path, eval_path: Option<&Path>, args: &TrainArgs) -> Result<()> {
        self.check_window(args.max_input_length, args.max_output_length)?;
        let adapter = PairAdapter::new(args.max_input_length, args.max_output_length);
        let (train_data, eval_data) =
            preprocess_train(path, eval_path, &adapter, &self.tokenizer, args)?;

        let trained = run_train(
            self.model.clone(),
            train_data,
            eval_data,
            self.masking_collator::<B>(args.mask_probability),
            self.masking_collator::<B::InnerBackend>(args.mask_probability),
            args,
        )?;
        self.model = trained;
        Ok(())
    }

    /// Target-side masked loss over an evaluation file.
    pub fn eval(&self, path: &Path, args: &EvalArgs) -> Result<EvalResult> {
        self.check_window(args.max_input_length, args.max_output_length)?;
        let adapter = PairAdapter::new(args.max_input_length, args.max_output_length);
        let eval_data = preprocess_eval(path, &adapter, &self.tokenizer, args)?;

        Ok(run_eval(
            &self.model.valid(),
            eval_data,
            self.masking_collator::<B::InnerBackend>(args.mask_probability),
            args.batch_size,
        ))
    }

    /// Write descriptor, weights, and tokenizer to `dir`.
    pub fn save(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let store = ModelStore::new(dir);
        store.save_descriptor(&self.descriptor)?;
        store.save_weights(&self.model, WEIGHTS_NAME)?;
        TokenizerStore::new(store.dir()).save(&self.tokenizer)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn check_window(&self, max_input_length: usize, max_output_length: usize) -> Result<()> {
        // [CLS] input [SEP] target [SEP]
        let needed = max_input_length + max_output_length + 3;
        if needed > self.descriptor.max_seq_len {
            return Err(Error::Configuration(format!(
                "max_input_length {} + max_output_length {} needs {} positions, but the \
                 model's max_seq_len is {}",
                max_input_length, max_output_length, needed, self.descriptor.max_seq_len
            )));
        }
        Ok(())
    }

    fn masking_collator<BE: burn::prelude::Backend<Device = B::Device>>(
        &self,
        mask_probability: f64,
    ) -> MaskingCollator<BE> {
        MaskingCollator::new(
            self.device.clone(),
            self.specials.mask,
            self.specials.pad,
            self.descriptor.vocab_size,
            mask_probability,
        )
    }

    fn distribution_at(&self, ids: &[u32], segments: &[u32], position: usize) -> Vec<f32> {
        let model = self.model.valid();
        let (input_ids, segment_ids) =
            single_sequence::<B::InnerBackend>(ids, segments, &self.device);

        let logits = model.forward(input_ids, segment_ids);
        let [_, _, vocab] = logits.dims();
        let probs = activation::softmax(logits, 2);
        probs
            .slice([0..1, position..position + 1, 0..vocab])
            .reshape([vocab])
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default()
    }
}
