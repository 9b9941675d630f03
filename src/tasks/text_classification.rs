// ============================================================
// Text Classification Task
// ============================================================
// Sequence-level classification over the pooled [CLS] state. The
// label names live in the descriptor so a saved directory is
// self-describing: `from_pretrained` refuses a descriptor without
// them rather than inventing "label_0" style placeholders.
//
// `classify_text` always returns every label, ranked by score, so
// callers can threshold or take the top entry as they see fit.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::activation;
use burn::tensor::backend::AutodiffBackend;
use tokenizers::Tokenizer;

use crate::config::{EvalArgs, TrainArgs};
use crate::data::adapter::{assemble_single, encode_ids, LabelledTextAdapter, SpecialTokens};
use crate::data::collate::{single_sequence, PaddingCollator};
use crate::data::dataset::TokenizedDataset;
use crate::data::pipeline::{preprocess_eval, preprocess_train};
use crate::domain::results::{EvalResult, LabelScore};
use crate::error::{Error, Result};
use crate::infra::model_store::{ModelDescriptor, ModelKind, ModelStore, WEIGHTS_NAME};
use crate::infra::tokenizer_store::{embedding_vocab_size, TokenizerStore};
use crate::ml::model::TextClassifierModel;
use crate::ml::ranking;
use crate::ml::trainer::{run_eval, run_train};

#[derive(Debug)]
pub struct TextClassification<B: AutodiffBackend> {
    tokenizer:  Tokenizer,
    specials:   SpecialTokens,
    descriptor: ModelDescriptor,
    labels:     Vec<String>,
    model:      TextClassifierModel<B>,
    device:     B::Device,
}

impl<B: AutodiffBackend> TextClassification<B> {
    /// Load a saved classification directory. The descriptor must
    /// carry the label names it was created with.
    pub fn from_pretrained(dir: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        let store      = ModelStore::new(dir);
        let descriptor = store.load_descriptor_expecting(ModelKind::TextClassification)?;
        let labels     = descriptor
            .labels
            .clone()
            .ok_or_else(|| Error::model_load(store.dir(), "descriptor has no label names"))?;
        let tokenizer  = TokenizerStore::new(store.dir()).load()?;
        let specials   = SpecialTokens::from_tokenizer(&tokenizer)?;

        let model = descriptor.encoder_config().init_classifier::<B>(labels.len(), &device);
        let model = store.load_weights(model, WEIGHTS_NAME, &device)?;
        tracing::info!("Loaded {} model from '{}'", descriptor.kind, store.dir().display());

        Ok(Self { tokenizer, specials, descriptor, labels, model, device })
    }

    /// Build a fresh wrapper in `dir` classifying into `labels`,
    /// with a tokenizer trained on `corpus`.
    pub fn create(
        dir:            impl Into<PathBuf>,
        mut descriptor: ModelDescriptor,
        labels:         Vec<String>,
        corpus:         &[String],
        device:         B::Device,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Configuration("at least one label name is required".into()));
        }
        descriptor.kind   = ModelKind::TextClassification;
        descriptor.labels = Some(labels.clone());
        let store = ModelStore::new(dir);

        let tokenizer =
            TokenizerStore::new(store.dir()).load_or_build(corpus, descriptor.vocab_size)?;
        // Word-level ids are gapped around the specials, so the
        // embedding table is sized by the highest id, not the count.
        descriptor.vocab_size = descriptor.vocab_size.max(embedding_vocab_size(&tokenizer));
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;

        let model = descriptor.encoder_config().init_classifier::<B>(labels.len(), &device);
        store.save_descriptor(&descriptor)?;
        store.save_weights(&model, WEIGHTS_NAME)?;

        Ok(Self { tokenizer, specials, descriptor, labels, model, device })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Scores for every label, highest first.
    pub fn classify_text(&self, text: &str) -> Result<Vec<LabelScore>> {
        let ids = assemble_single(
            encode_ids(&self.tokenizer, text)?,
            &self.specials,
            self.descriptor.max_seq_len,
        );
        let segments = vec![0u32; ids.len()];
        let (input_ids, segment_ids) =
            single_sequence::<B::InnerBackend>(&ids, &segments, &self.device);

        let logits = self.model.valid().forward(input_ids, segment_ids);
        let scores: Vec<f32> = activation::softmax(logits, 1)
            .reshape([self.labels.len()])
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();

        Ok(ranking::top_k(&scores, self.labels.len())
            .into_iter()
            .map(|ranked| LabelScore {
                label: self.labels[ranked.index].clone(),
                score: ranked.score,
            })
            .collect())
    }

    /// Fine-tune on a CSV file with `text` and `label` columns,
    /// where `label` is an index into this wrapper's label names.
    pub fn train(&mut self, path: &Path, eval_path: Option<&Path>, args: &TrainArgs) -> Result<()> {
        self.check_window(args.max_input_length)?;

        let adapter = LabelledTextAdapter::new(args.max_input_length);
        let (train_data, eval_data) =
            preprocess_train(path, eval_path, &adapter, &self.tokenizer, args)?;
        self.check_label_range(&train_data)?;
        self.check_label_range(&eval_data)?;

        let trained = run_train(
            self.model.clone(),
            train_data,
            eval_data,
            PaddingCollator::<B>::new(self.device.clone(), self.specials.pad),
            PaddingCollator::<B::InnerBackend>::new(self.device.clone(), self.specials.pad),
            args,
        )?;
        self.model = trained;
        Ok(())
    }

    /// Loss and accuracy over an evaluation file.
    pub fn eval(&self, path: &Path, args: &EvalArgs) -> Result<EvalResult> {
        self.check_window(args.max_input_length)?;

        let adapter = LabelledTextAdapter::new(args.max_input_length);
        let eval_data = preprocess_eval(path, &adapter, &self.tokenizer, args)?;
        self.check_label_range(&eval_data)?;

        Ok(run_eval(
            &self.model.valid(),
            eval_data,
            PaddingCollator::<B::InnerBackend>::new(self.device.clone(), self.specials.pad),
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

    fn check_window(&self, max_input_length: usize) -> Result<()> {
        if max_input_length > self.descriptor.max_seq_len {
            return Err(Error::Configuration(format!(
                "max_input_length {} exceeds the model's max_seq_len {}",
                max_input_length, self.descriptor.max_seq_len
            )));
        }
        Ok(())
    }

    /// A label index at or past the head size would train against
    /// a class that does not exist; fail before the first batch.
    fn check_label_range(&self, data: &TokenizedDataset) -> Result<()> {
        let limit = self.labels.len() as i64;
        for row in data.rows() {
            if let Some(label) = row.class_label {
                if label >= limit {
                    return Err(Error::Configuration(format!(
                        "label index {} out of range for {} labels",
                        label,
                        self.labels.len()
                    )));
                }
            }
        }
        Ok(())
    }
}
