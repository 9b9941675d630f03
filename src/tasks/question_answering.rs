// ============================================================
// Question Answering Task
// ============================================================
// Extractive QA: the answer is a span copied out of the context,
// never free text. The span model is attached EXPLICITLY — a
// wrapper starts without one, and every answering or training
// call before `init_answering` fails with an error naming that
// call. This keeps "I forgot to initialise" loud instead of
// silently answering from random weights.
//
// Span search scores every (start, end) pair inside the context
// segment with start_prob × end_prob, capped at MAX_ANSWER_LEN
// tokens, and maps the winners back to character offsets via the
// tokenizer's offsets so `text` is the verbatim context slice.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::activation;
use burn::tensor::backend::AutodiffBackend;
use tokenizers::Tokenizer;

use crate::config::{EvalArgs, TrainArgs};
use crate::data::adapter::{
    encode_ids, segment_ids_after_first_sep, QuestionContextAdapter, SpecialTokens,
};
use crate::data::collate::{single_sequence, PaddingCollator};
use crate::data::pipeline::{preprocess_eval, preprocess_train};
use crate::domain::results::{Answer, EvalResult};
use crate::error::{Error, Result};
use crate::infra::model_store::{ModelDescriptor, ModelKind, ModelStore, WEIGHTS_NAME};
use crate::infra::tokenizer_store::{embedding_vocab_size, TokenizerStore};
use crate::ml::model::SpanExtractionModel;
use crate::ml::trainer::{run_eval, run_train};

/// Longest span, in tokens, the search will consider.
const MAX_ANSWER_LEN: usize = 30;

pub struct QuestionAnswering<B: AutodiffBackend> {
    tokenizer:  Tokenizer,
    specials:   SpecialTokens,
    descriptor: ModelDescriptor,
    answerer:   Option<SpanExtractionModel<B>>,
    device:     B::Device,
}

impl<B: AutodiffBackend> QuestionAnswering<B> {
    /// Load a saved question-answering directory. The answering
    /// model is attached only if the directory holds weights;
    /// otherwise the wrapper comes back uninitialised.
    pub fn from_pretrained(dir: impl Into<PathBuf>, device: B::Device) -> Result<Self> {
        let store      = ModelStore::new(dir);
        let descriptor = store.load_descriptor_expecting(ModelKind::QuestionAnswering)?;
        let tokenizer  = TokenizerStore::new(store.dir()).load()?;
        let specials   = SpecialTokens::from_tokenizer(&tokenizer)?;

        let answerer = if store.has_weights(WEIGHTS_NAME) {
            let model = descriptor.encoder_config().init_span::<B>(&device);
            Some(store.load_weights(model, WEIGHTS_NAME, &device)?)
        } else {
            tracing::info!(
                "'{}' has no answering weights; call init_answering before use",
                store.dir().display()
            );
            None
        };

        Ok(Self { tokenizer, specials, descriptor, answerer, device })
    }

    /// Build a fresh, uninitialised wrapper in `dir`: descriptor
    /// and tokenizer only, no answering model yet.
    pub fn create(
        dir:            impl Into<PathBuf>,
        mut descriptor: ModelDescriptor,
        corpus:         &[String],
        device:         B::Device,
    ) -> Result<Self> {
        descriptor.kind = ModelKind::QuestionAnswering;
        let store = ModelStore::new(dir);

        let tokenizer =
            TokenizerStore::new(store.dir()).load_or_build(corpus, descriptor.vocab_size)?;
        descriptor.vocab_size = descriptor.vocab_size.max(embedding_vocab_size(&tokenizer));
        let specials = SpecialTokens::from_tokenizer(&tokenizer)?;
        store.save_descriptor(&descriptor)?;

        Ok(Self { tokenizer, specials, descriptor, answerer: None, device })
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn is_initialised(&self) -> bool {
        self.answerer.is_some()
    }

    /// Attach a freshly initialised answering model.
    pub fn init_answering(&mut self) {
        self.answerer = Some(self.descriptor.encoder_config().init_span::<B>(&self.device));
    }

    /// Attach an answering model loaded from another saved
    /// question-answering directory.
    pub fn init_answering_from(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        let store      = ModelStore::new(dir);
        let descriptor = store.load_descriptor_expecting(ModelKind::QuestionAnswering)?;
        let model      = descriptor.encoder_config().init_span::<B>(&self.device);
        let model      = store.load_weights(model, WEIGHTS_NAME, &self.device)?;
        self.descriptor = descriptor;
        self.answerer   = Some(model);
        Ok(())
    }

    /// The single best answer span.
    pub fn answer_question(&self, question: &str, context: &str) -> Result<Answer> {
        self.answers_to_question(question, context, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Tokenization("no answer span could be scored".into()))
    }

    /// The `top_k` best answer spans, highest score first.
    pub fn answers_to_question(
        &self,
        question: &str,
        context:  &str,
        top_k:    usize,
    ) -> Result<Vec<Answer>> {
        let model = self.require_answerer("answers_to_question")?;

        // ── Assemble [CLS] question [SEP] context [SEP] ───────────────────────
        let q_ids = encode_ids(&self.tokenizer, question)?;
        let c_enc = self
            .tokenizer
            .encode(context, false)
            .map_err(|e| Error::Tokenization(format!("cannot tokenise context: {e}")))?;

        let mut ids = Vec::with_capacity(q_ids.len() + c_enc.get_ids().len() + 3);
        ids.push(self.specials.cls);
        ids.extend_from_slice(&q_ids);
        ids.push(self.specials.sep);
        let context_start = ids.len();
        ids.extend_from_slice(c_enc.get_ids());
        ids.push(self.specials.sep);
        if ids.len() > self.descriptor.max_seq_len {
            ids.truncate(self.descriptor.max_seq_len);
            if let Some(last) = ids.last_mut() {
                *last = self.specials.sep;
            }
        }
        let seq_len = ids.len();
        if context_start + 1 >= seq_len {
            return Err(Error::Tokenization(
                "the question fills the whole window; no context tokens remain".into(),
            ));
        }

        // ── Forward pass on the inner backend ─────────────────────────────────
        let segments = segment_ids_after_first_sep(&ids, self.specials.sep);
        let (input_ids, segment_ids) =
            single_sequence::<B::InnerBackend>(&ids, &segments, &self.device);
        let output = model.valid().forward(input_ids, segment_ids);

        let start_probs: Vec<f32> = activation::softmax(output.start_logits, 1)
            .reshape([seq_len])
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        let end_probs: Vec<f32> = activation::softmax(output.end_logits, 1)
            .reshape([seq_len])
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();

        // ── Score spans inside the context segment ────────────────────────────
        // The final position is the closing [SEP]; spans never
        // include it.
        let last = seq_len - 1;
        let mut spans: Vec<(f32, usize, usize)> = Vec::new();
        for s in context_start..last {
            for e in s..(s + MAX_ANSWER_LEN).min(last) {
                spans.push((start_probs[s] * end_probs[e], s, e));
            }
        }
        spans.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        spans.truncate(top_k);

        // ── Map token spans back to context characters ────────────────────────
        let offsets = c_enc.get_offsets();
        Ok(spans
            .into_iter()
            .map(|(score, s, e)| {
                let (char_start, _) = offsets[s - context_start];
                let (_, char_end)   = offsets[e - context_start];
                Answer {
                    text:  context[char_start..char_end].to_string(),
                    score,
                    start: char_start,
                    end:   char_end,
                }
            })
            .collect())
    }

    /// Fine-tune on a CSV file with `context`, `question`,
    /// `answer_text`, and `answer_start` columns.
    pub fn train(&mut self, path: &Path, eval_path: Option<&Path>, args: &TrainArgs) -> Result<()> {
        self.require_answerer("train")?;
        self.check_window(args.max_input_length)?;

        let adapter = QuestionContextAdapter::new(args.max_input_length);
        let (train_data, eval_data) =
            preprocess_train(path, eval_path, &adapter, &self.tokenizer, args)?;

        let model = self.require_answerer("train")?.clone();
        let trained = run_train(
            model,
            train_data,
            eval_data,
            PaddingCollator::<B>::new(self.device.clone(), self.specials.pad),
            PaddingCollator::<B::InnerBackend>::new(self.device.clone(), self.specials.pad),
            args,
        )?;
        self.answerer = Some(trained);
        Ok(())
    }

    /// Span loss over an evaluation file.
    pub fn eval(&self, path: &Path, args: &EvalArgs) -> Result<EvalResult> {
        let model = self.require_answerer("eval")?;
        self.check_window(args.max_input_length)?;

        let adapter = QuestionContextAdapter::new(args.max_input_length);
        let eval_data = preprocess_eval(path, &adapter, &self.tokenizer, args)?;

        Ok(run_eval(
            &model.valid(),
            eval_data,
            PaddingCollator::<B::InnerBackend>::new(self.device.clone(), self.specials.pad),
            args.batch_size,
        ))
    }

    /// Write descriptor, tokenizer, and (if initialised) weights
    /// to `dir`.
    pub fn save(&self, dir: impl Into<PathBuf>) -> Result<()> {
        let store = ModelStore::new(dir);
        store.save_descriptor(&self.descriptor)?;
        if let Some(model) = &self.answerer {
            store.save_weights(model, WEIGHTS_NAME)?;
        }
        TokenizerStore::new(store.dir()).save(&self.tokenizer)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn require_answerer(&self, operation: &'static str) -> Result<&SpanExtractionModel<B>> {
        self.answerer.as_ref().ok_or(Error::NotInitialized {
            operation,
            required: "init_answering",
        })
    }

    fn check_window(&self, max_input_length: usize) -> Result<()> {
        if max_input_length > self.descriptor.max_seq_len {
            return Err(Error::Configuration(format!(
                "max_input_length {} exceeds the model's max_seq_len {}",
                max_input_length, self.descriptor.max_seq_len
            )));
        }
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::FileFormat;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    fn tiny_descriptor() -> ModelDescriptor {
        ModelDescriptor {
            vocab_size:  64,
            max_seq_len: 32,
            d_model:     8,
            num_heads:   2,
            num_layers:  1,
            d_ff:        16,
            dropout:     0.0,
            ..ModelDescriptor::new(ModelKind::QuestionAnswering)
        }
    }

    fn fixture_task(dir: &Path) -> QuestionAnswering<TestBackend> {
        let corpus = vec![
            "the fee is due in january".to_string(),
            "when is the fee due".to_string(),
        ];
        QuestionAnswering::create(dir, tiny_descriptor(), &corpus, Default::default()).unwrap()
    }

    #[test]
    fn test_uninitialised_calls_name_the_fix() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());
        assert!(!task.is_initialised());

        let err = task.answer_question("when", "the fee is due in january").unwrap_err();
        assert!(matches!(err, Error::NotInitialized { .. }));
        assert!(err.to_string().contains("init_answering"));
    }

    #[test]
    fn test_answers_come_from_the_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = fixture_task(dir.path());
        task.init_answering();

        let context = "the fee is due in january";
        let answers = task.answers_to_question("when is the fee due", context, 3).unwrap();
        assert_eq!(answers.len(), 3);
        for answer in &answers {
            assert_eq!(&context[answer.start..answer.end], answer.text);
            assert!(answer.score >= 0.0);
        }
        for pair in answers.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_top_answer_matches_answer_question() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = fixture_task(dir.path());
        task.init_answering();

        let context = "the fee is due in january";
        let top = task.answer_question("when", context).unwrap();
        let all = task.answers_to_question("when", context, 2).unwrap();
        assert_eq!(top, all[0]);
    }

    #[test]
    fn test_train_eval_save_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = fixture_task(dir.path());
        task.init_answering();

        let context = "the fee is due in january";
        let start = context.find("january").unwrap();
        let data_path = dir.path().join("qa.csv");
        std::fs::write(
            &data_path,
            format!(
                "context,question,answer_text,answer_start\n\
                 {context},when is the fee due,january,{start}\n\
                 {context},what is due,the fee,0\n\
                 {context},when must it be paid,january,{start}\n\
                 {context},what must be paid,the fee,0\n"
            ),
        )
        .unwrap();

        let args = TrainArgs {
            num_train_epochs: 1,
            batch_size:       2,
            eval_ratio:       0.25,
            file_format:      FileFormat::Csv,
            max_input_length: 32,
            ..Default::default()
        };
        task.train(&data_path, None, &args).unwrap();

        let eval_args = EvalArgs { batch_size: 2, max_input_length: 32, ..Default::default() };
        let result = task.eval(&data_path, &eval_args).unwrap();
        assert!(result.loss.is_finite());

        let saved = dir.path().join("saved");
        task.save(&saved).unwrap();
        let reloaded =
            QuestionAnswering::<TestBackend>::from_pretrained(&saved, Default::default()).unwrap();
        assert!(reloaded.is_initialised());

        let a = task.answer_question("when", context).unwrap();
        let b = reloaded.answer_question("when", context).unwrap();
        assert_eq!(a.text, b.text);
    }

    #[test]
    fn test_saved_uninitialised_directory_reloads_uninitialised() {
        let dir = tempfile::tempdir().unwrap();
        let task = fixture_task(dir.path());

        let saved = dir.path().join("saved");
        task.save(&saved).unwrap();
        let reloaded =
            QuestionAnswering::<TestBackend>::from_pretrained(&saved, Default::default()).unwrap();
        assert!(!reloaded.is_initialised());
    }
}
