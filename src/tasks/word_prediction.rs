// ============================================================
// Word Prediction Task
// ============================================================
// Fill-in-the-blank over a single [MASK] placeholder, plus an
// iterative completion mode that re-masks the end of the text
// until the model stops producing new words.
//
// Two prediction modes:
//   predict_mask         — rank the whole vocabulary at the mask
//   predict_mask_targets — rank only caller-supplied candidates;
//                          multi-token candidates score by the
//                          SUM of their pieces' probability mass
//
// Training uses the concatenate-and-chunk adapter with dynamic
// masking, so any plain text file is usable training data.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::activation;
use burn::tensor::backend::AutodiffBackend;
use tokenizers::Tokenizer;

use crate::config::{EvalArgs, TrainArgs};
use crate::data::adapter::{assemble_single, encode_ids, ConcatenatingAdapter, SpecialTokens};
use crate::data::collate::{single_sequence, MaskingCollator};
use crate::data::pipeline::{preprocess_eval, preprocess_train};
use crate::domain::results::{EvalResult, WordPredictionResult};
use crate::error::{Error, Result};
use crate::infra::model_store::{ModelDescriptor, ModelKind, ModelStore, WEIGHTS_NAME};
use crate::infra::tokenizer_store::{embedding_vocab_size, TokenizerStore};
use crate::ml::model::MaskedLanguageModel;
use crate::ml::ranking;
use crate::ml::trainer::{run_eval, run_train};

#[derive(Debug)]
pub struct WordPrediction<B: AutodiffBackend> {
    tokenizer:  Tokenizer,
    specials:   SpecialTokens,
    descriptor: ModelDescriptor,
    model:      MaskedLanguageModel<B>,
    device:     B::Device,
}

impl<B: AutodiffBackend> WordPrediction<B> {
    /// Load a saved masked-LM directory.
    pub fn from_pretrained(dir: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        let store      = ModelStore::new(dir);
        let descriptor = store.load_descriptor_expecting(ModelKind::MaskedLm)?;
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
        descriptor.kind = ModelKind::MaskedLm;
        let store = ModelStore::new(dir);

        let tokenizer =
            TokenizerStore::new(store.dir()).load_or_build(corpus, descriptor.vocab_size)?;
        // The id space is gapped; the embedding table must cover
        // the highest id the tokenizer can emit.
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

    /// Rank the vocabulary at the one [MASK] position in `text`
    /// and return the `top_k` candidates.
    pub fn predict_mask(&self, text: &str, top_k: usize) -> Result<Vec<WordPredictionResult>> {
        let (probs, _) = self.mask_distribution(text)?;

        Ok(ranking::top_k(&probs, top_k)
            .into_iter()
            .map(|ranked| WordPredictionResult {
                token: self
                    .tokenizer
                    .id_to_token(ranked.index as u32)
                    .unwrap_or_else(|| format!("[unused{}]", ranked.index)),
                score: ranked.score,
            })
            .collect())
    }

    /// Rank only the supplied candidate words at the [MASK]
    /// position. Every candidate comes back, ordered by score; a
    /// candidate that tokenises to several pieces scores by the
    /// sum of their probability mass.
    pub fn predict_mask_targets(
        &self,
        text:    &str,
        targets: &[&str],
    ) -> Result<Vec<WordPredictionResult>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let (probs, _) = self.mask_distribution(text)?;

        let candidates: Vec<Vec<u32>> = targets
            .iter()
            .map(|target| encode_ids(&self.tokenizer, target))
            .collect::<Result<_>>()?;

        Ok(ranking::score_candidates(&probs, &candidates)
            .into_iter()
            .map(|ranked| WordPredictionResult {
                token: targets[ranked.index].to_string(),
                score: ranked.score,
            })
            .collect())
    }

    /// Extend `text` one word at a time by appending a [MASK],
    /// committing the model's top pick, and repeating. Stops at
    /// `max_new_tokens`, at any special-token pick, when the
    /// window is full, or when the model repeats itself three
    /// times in a row.
    pub fn finish_text(&self, text: &str, max_new_tokens: usize) -> Result<String> {
        let prefix_ids = encode_ids(&self.tokenizer, text)?;
        let mut committed: Vec<u32> = Vec::new();

        for _ in 0..max_new_tokens {
            let mut ids = Vec::with_capacity(prefix_ids.len() + committed.len() + 3);
            ids.push(self.specials.cls);
            ids.extend_from_slice(&prefix_ids);
            ids.extend_from_slice(&committed);
            ids.push(self.specials.mask);
            ids.push(self.specials.sep);
            if ids.len() > self.descriptor.max_seq_len {
                break;
            }
            let mask_pos = ids.len() - 2;

            let probs = self.distribution_at(&ids, &vec![0; ids.len()], mask_pos);
            let Some(best) = ranking::top_k(&probs, 1).into_iter().next() else {
                break;
            };
            let token_id = best.index as u32;
            if self.specials.is_special(token_id) {
                break;
            }
            committed.push(token_id);

            // A model stuck on one word is done saying anything new
            let n = committed.len();
            if n >= 3 && committed[n - 1] == committed[n - 2] && committed[n - 2] == committed[n - 3]
            {
                break;
            }
        }

        if committed.is_empty() {
            return Ok(text.to_string());
        }
        let completion = self
            .tokenizer
            .decode(&committed, true)
            .map_err(|e| Error::Tokenization(format!("cannot decode completion: {e}")))?;
        Ok(format!("{} {}", text.trim_end(), completion))
    }

    /// Fine-tune on a plain-text or CSV file with a `text` column.
    pub fn train(&mut self, path: &Path, eval_path: Option<&Path>, args: &TrainArgs) -> Result<()> {
        self.check_window(args.max_input_length)?;
        let adapter = ConcatenatingAdapter::new(args.max_input_length);
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

    /// Masked-LM loss over an evaluation file.
    pub fn eval(&self, path: &Path, args: &EvalArgs) -> Result<EvalResult> {
        self.check_window(args.max_input_length)?;
        let adapter = ConcatenatingAdapter::new(args.max_input_length);
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

    fn check_window(&self, max_input_length: usize) -> Result<()> {
        if max_input_length > self.descriptor.max_seq_len {
            return Err(Error::Configuration(format!(
                "max_input_length {} exceeds the model's max_seq_len {}",
                max_input_length, self.descriptor.max_seq_len
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

    /// Validate the single-[MASK] contract and return the softmax
    /// distribution at the mask position.
    fn mask_distribution(&self, text: &str) -> Result<(Vec<f32>, usize)> {
        let body = encode_ids(&self.tokenizer, text)?;
        let mask_count = body.iter().filter(|&&id| id == self.specials.mask).count();
        if mask_count != 1 {
            return Err(Error::Tokenization(format!(
                "text must contain exactly one [MASK] placeholder, found {mask_count}"
            )));
        }

        let ids = assemble_single(body, &self.specials, self.descriptor.max_seq_len);
        let mask_pos = ids
            .iter()
            .position(|&id| id == self.specials.mask)
            .ok_or_else(|| {
                Error::Tokenization(
                    "the [MASK] placeholder was truncated away; shorten the text".into(),
                )
            })?;

        let probs = self.distribution_at(&ids, &vec![0; ids.len()], mask_pos);
        Ok((probs, mask_pos))
    }

    /// Softmax over the vocabulary at one position, read back to
    /// the host.
    fn distribution_at(&self, ids: &[u32], segments: &[u32], position: usize) -> Vec<f32> {
        let model = self.model.valid();
        let (input_ids, segment_ids) =
            single_sequence::<B::InnerBackend>(ids, segments, &self.device);

        let logits = model.forward(input_ids, segment_ids); // [1, seq, vocab]
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

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    fn tiny_descriptor() -> ModelDescriptor {
        ModelDescriptor {
            vocab_size:  64,
            max_seq_len: 24,
            d_model:     8,
            num_heads:   2,
            num_layers:  1,
            d_ff:        16,
            dropout:     0.0,
            ..ModelDescriptor::new(ModelKind::MaskedLm)
        }
    }

    fn fixture_corpus() -> Vec<String> {
        vec![
            "the fee is due in january".to_string(),
            "our new laptop ships in march".to_string(),
            "please pay the invoice before friday".to_string(),
        ]
    }

    fn fixture_task(dir: &Path) -> WordPrediction<TestBackend> {
        WordPrediction::create(dir, tiny_descriptor(), &fixture_corpus(), Default::default())
            .unwrap()
    }

    #[test]
    fn test_predict_mask_returns_ranked_probabilities() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let predictions = task.predict_mask("the fee is [MASK] in january", 3).unwrap();
        assert_eq!(predictions.len(), 3);
        for pair in predictions.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for p in &predictions {
            assert!(p.score >= 0.0 && p.score <= 1.0);
        }
    }

    #[test]
    fn test_predict_mask_requires_exactly_one_mask() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let none = task.predict_mask("the fee is due", 3).unwrap_err();
        assert!(matches!(none, Error::Tokenization(_)));

        let two = task
            .predict_mask("the [MASK] is [MASK] in january", 3)
            .unwrap_err();
        assert!(matches!(two, Error::Tokenization(_)));
    }

    #[test]
    fn test_targets_mode_ranks_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let predictions = task
            .predict_mask_targets("the fee is [MASK] in january", &["due", "paid", "laptop"])
            .unwrap();
        assert_eq!(predictions.len(), 3);
        let mut tokens: Vec<&str> = predictions.iter().map(|p| p.token.as_str()).collect();
        tokens.sort_unstable();
        assert_eq!(tokens, vec!["due", "laptop", "paid"]);
        assert!(predictions[0].score >= predictions[1].score);
    }

    #[test]
    fn test_targets_mode_with_no_candidates_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());
        assert!(task
            .predict_mask_targets("the fee is [MASK]", &[])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_finish_text_keeps_the_original_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let finished = task.finish_text("the fee is", 5).unwrap();
        assert!(finished.starts_with("the fee is"));
    }

    #[test]
    fn test_train_eval_and_reload_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = fixture_task(dir.path());

        let data_path = dir.path().join("corpus.txt");
        std::fs::write(&data_path, fixture_corpus().join("\n")).unwrap();

        let args = TrainArgs {
            num_train_epochs: 1,
            batch_size:       2,
            eval_ratio:       0.25,
            file_format:      crate::data::loader::FileFormat::Text,
            max_input_length: 8,
            ..Default::default()
        };
        task.train(&data_path, None, &args).unwrap();

        let eval_args = EvalArgs {
            batch_size:       2,
            file_format:      crate::data::loader::FileFormat::Text,
            max_input_length: 8,
            ..Default::default()
        };
        let result = task.eval(&data_path, &eval_args).unwrap();
        assert!(result.loss.is_finite());

        let saved = dir.path().join("saved");
        task.save(&saved).unwrap();
        let reloaded =
            WordPrediction::<TestBackend>::from_pretrained(&saved, Default::default()).unwrap();

        let a = task.predict_mask("the fee is [MASK]", 1).unwrap();
        let b = reloaded.predict_mask("the fee is [MASK]", 1).unwrap();
        assert_eq!(a[0].token, b[0].token);
    }

    #[test]
    fn test_oversized_window_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let args = EvalArgs { max_input_length: 4096, ..Default::default() };
        let err = task.eval(Path::new("unused.csv"), &args).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_wrong_kind_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path());
        store
            .save_descriptor(&ModelDescriptor::new(ModelKind::NextSentence))
            .unwrap();

        let err = WordPrediction::<TestBackend>::from_pretrained(dir.path(), Default::default())
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
