// ============================================================
// Next Sentence Prediction Task
// ============================================================
// Answers one question: "does sentence B plausibly follow
// sentence A?". The head is a two-way classifier over the pooled
// [CLS] state; index 0 is the continuation class, so the reported
// probability is softmax(logits)[0].
//
// This wrapper is inference-only and runs on a plain backend; it
// has no train or eval loop. Both inputs must be single sentences
// because the pair encoding carries exactly one segment boundary.

use std::path::PathBuf;

use burn::tensor::activation;
use burn::tensor::backend::Backend;
use tokenizers::Tokenizer;

use crate::data::adapter::{encode_ids, segment_ids_after_first_sep, SpecialTokens};
use crate::data::collate::single_sequence;
use crate::domain::results::NextSentenceResult;
use crate::error::{Error, Result};
use crate::infra::model_store::{ModelDescriptor, ModelKind, ModelStore, WEIGHTS_NAME};
use crate::infra::tokenizer_store::{embedding_vocab_size, TokenizerStore};
use crate::ml::model::NextSentenceModel;

#[derive(Debug)]
pub struct NextSentence<B: Backend> {
    tokenizer:  Tokenizer,
    specials:   SpecialTokens,
    descriptor: ModelDescriptor,
    model:      NextSentenceModel<B>,
    device:     B::Device,
}

impl<B: Backend> NextSentence<B> {
    /// Load a saved next-sentence directory.
    pub fn from_pretrained(dir: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        let store      = ModelStore::new(dir);
        let descriptor = store.load_descriptor_expecting(ModelKind::NextSentence)?;
        let tokenizer  = TokenizerStore::new(store.dir()).load()?;
        let specials   = SpecialTokens::from_tokenizer(&tokenizer)?;

        let model = descriptor.encoder_config().init_next_sentence::<B>(&device);
        let model = store.load_weights(model, WEIGHTS_NAME, &device)?;
        tracing::info!("Loaded {} model from '{}'", descriptor.kind, store.dir().display());

        Ok(Self { tokenizer, specials, descriptor, model, device })
    }

    /// Build a fresh wrapper in `dir` with a tokenizer trained on
    /// `corpus` and randomly initialised weights.
    pub fn create(
        dir:            impl Into<PathBuf>,
        mut descriptor: ModelDescriptor,
        corpus:         &[String],
        device:         B::Device,
    ) -> Result<Self> {
        descriptor.kind = ModelKind::NextSentence;
        let store = ModelStore::new(dir);

        let tokenizer =
            TokenizerStore::new(store.dir()).load_or_build(corpus, descriptor.vocab_size)?;
        // Word-level ids are gapped around the specials, so the
        // embedding table is sized by the highest id, not the count.
        descriptor.vocab_size = descriptor.vocab_size.max(embedding_vocab_size(&tokenizer));
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;

        let model = descriptor.encoder_config().init_next_sentence::<B>(&device);
        store.save_descriptor(&descriptor)?;
        store.save_weights(&model, WEIGHTS_NAME)?;

        Ok(Self { tokenizer, specials, descriptor, model, device })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Probability that `sentence_b` follows `sentence_a`.
    pub fn predict_next_sentence(
        &self,
        sentence_a: &str,
        sentence_b: &str,
    ) -> Result<NextSentenceResult> {
        single_sentence_check(sentence_a, "sentence_a")?;
        single_sentence_check(sentence_b, "sentence_b")?;

        let a_ids = encode_ids(&self.tokenizer, sentence_a)?;
        let b_ids = encode_ids(&self.tokenizer, sentence_b)?;

        let mut ids = Vec::with_capacity(a_ids.len() + b_ids.len() + 3);
        ids.push(self.specials.cls);
        ids.extend_from_slice(&a_ids);
        ids.push(self.specials.sep);
        ids.extend_from_slice(&b_ids);
        ids.push(self.specials.sep);
        if ids.len() > self.descriptor.max_seq_len {
            ids.truncate(self.descriptor.max_seq_len);
            if let Some(last) = ids.last_mut() {
                *last = self.specials.sep;
            }
        }

        let segments = segment_ids_after_first_sep(&ids, self.specials.sep);
        let (input_ids, segment_ids) = single_sequence::<B>(&ids, &segments, &self.device);
        let logits = self.model.forward(input_ids, segment_ids);

        let probs: Vec<f32> = activation::softmax(logits, 1)
            .reshape([2])
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        Ok(NextSentenceResult { probability: probs.first().copied().unwrap_or(0.0) })
    }

    /// Write descriptor, weights, and tokenizer to `dir`.
    pub fn save(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let store = ModelStore::new(dir);
        store.save_descriptor(&self.descriptor)?;
        store.save_weights(&self.model, WEIGHTS_NAME)?;
        TokenizerStore::new(store.dir()).save(&self.tokenizer)
    }
}

/// The pair encoding carries exactly one [SEP] boundary between
/// the inputs, so each input must be one sentence.
fn single_sentence_check(text: &str, which: &'static str) -> Result<()> {
    let count = text
        .split(['.', '?', '!'])
        .filter(|part| !part.trim().is_empty())
        .count();
    if count != 1 {
        return Err(Error::Tokenization(format!(
            "{which} must be a single sentence, found {count}"
        )));
    }
    Ok(())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    type TestBackend = burn::backend::NdArray;

    fn tiny_descriptor() -> ModelDescriptor {
        ModelDescriptor {
            vocab_size:  64,
            max_seq_len: 32,
            d_model:     8,
            num_heads:   2,
            num_layers:  1,
            d_ff:        16,
            dropout:     0.0,
            ..ModelDescriptor::new(ModelKind::NextSentence)
        }
    }

    fn fixture_task(dir: &Path) -> NextSentence<TestBackend> {
        let corpus = vec![
            "the invoice arrived this morning".to_string(),
            "payment is due at the end of the month".to_string(),
        ];
        NextSentence::create(dir, tiny_descriptor(), &corpus, Default::default()).unwrap()
    }

    #[test]
    fn test_probability_is_a_probability() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let result = task
            .predict_next_sentence(
                "the invoice arrived this morning",
                "payment is due at the end of the month",
            )
            .unwrap();
        assert!(result.probability >= 0.0);
        assert!(result.probability <= 1.0);
    }

    #[test]
    fn test_multi_sentence_inputs_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let err = task
            .predict_next_sentence("first. second.", "payment is due")
            .unwrap_err();
        assert!(err.to_string().contains("sentence_a"));

        let err = task
            .predict_next_sentence("the invoice arrived", "pay now! or else!")
            .unwrap_err();
        assert!(err.to_string().contains("sentence_b"));
    }

    #[test]
    fn test_trailing_full_stop_is_still_one_sentence() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let result = task
            .predict_next_sentence("the invoice arrived.", "payment is due.")
            .unwrap();
        assert!(result.probability.is_finite());
    }

    #[test]
    fn test_save_reload_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let saved = dir.path().join("saved");
        task.save(&saved).unwrap();
        let reloaded =
            NextSentence::<TestBackend>::from_pretrained(&saved, Default::default()).unwrap();

        let a = task
            .predict_next_sentence("the invoice arrived", "payment is due")
            .unwrap();
        let b = reloaded
            .predict_next_sentence("the invoice arrived", "payment is due")
            .unwrap();
        assert!((a.probability - b.probability).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_kind_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store.save_descriptor(&ModelDescriptor::new(ModelKind::MaskedLm)).unwrap();

        let err =
            NextSentence::<TestBackend>::from_pretrained(dir.path(), Default::default())
                .unwrap_err();
        assert!(err.to_string().contains("masked-lm"));
    }
}
