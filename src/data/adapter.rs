// ============================================================
// Tokenisation Adapters
// ============================================================
// Translate RawDataset rows into TokenizedRows, one adapter per
// task family. The adapter is chosen when the task wrapper is
// constructed, so by the time data flows there is no per-call
// branching on task kind.
//
//   ConcatenatingAdapter   — masked-LM / generation-style text.
//                            Encodes every row, concatenates the
//                            streams, chunks into fixed blocks.
//   PairAdapter            — text-to-text input/target pairs.
//   QuestionContextAdapter — extractive QA with char→token span
//                            mapping.
//   LabelledTextAdapter    — single text + integer class label.
//
// Special tokens are assembled by hand ([CLS] body [SEP]), with
// ids looked up from the tokenizer rather than hard-coded, and
// segment ids follow the first-separator rule: 0 up to and
// including the first [SEP], 1 after it.
//
// Parallelism: per-row encoding fans out over a rayon pool sized
// by `preprocessing_threads`. The pool is scoped to the call —
// building a global pool from library code would clobber the
// host application's own rayon configuration. Results come back
// in input order; everything downstream relies on that.
//
// Reference: tokenizers crate documentation
//            rayon crate documentation
//            Devlin et al. (2019) BERT — segment pairs, masking

use rayon::prelude::*;
use tokenizers::Tokenizer;

use crate::data::dataset::{TokenizedDataset, TokenizedRow, IGNORE_LABEL};
use crate::domain::raw::{RawDataset, RawRow};
use crate::error::{Error, Result};

// ─── Shared helpers ───────────────────────────────────────────────────────────

/// The special-token ids a task needs, resolved once per wrapper.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpecialTokens {
    pub cls:  u32,
    pub sep:  u32,
    pub mask: u32,
    pub pad:  u32,
}

impl SpecialTokens {
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self> {
        let lookup = |token: &str| {
            tokenizer
                .token_to_id(token)
                .ok_or_else(|| Error::Tokenization(format!("tokenizer has no '{token}' token")))
        };
        Ok(Self {
            cls:  lookup("[CLS]")?,
            sep:  lookup("[SEP]")?,
            mask: lookup("[MASK]")?,
            pad:  lookup("[PAD]")?,
        })
    }

    pub fn is_special(&self, id: u32) -> bool {
        id == self.cls || id == self.sep || id == self.mask || id == self.pad
    }
}

/// Encode without automatic special tokens; the adapters place
/// [CLS]/[SEP] themselves.
pub(crate) fn encode_ids(tokenizer: &Tokenizer, text: &str) -> Result<Vec<u32>> {
    tokenizer
        .encode(text, false)
        .map(|enc| enc.get_ids().to_vec())
        .map_err(|e| Error::Tokenization(format!("cannot tokenise text: {e}")))
}

/// Segment ids by the first-separator rule: 0 up to and including
/// the first [SEP], 1 for everything after it.
pub(crate) fn segment_ids_after_first_sep(ids: &[u32], sep_id: u32) -> Vec<u32> {
    let mut segments = Vec::with_capacity(ids.len());
    let mut seen_sep = false;
    for &id in ids {
        segments.push(if seen_sep { 1 } else { 0 });
        if id == sep_id {
            seen_sep = true;
        }
    }
    segments
}

/// [CLS] body [SEP], with the body truncated so the whole
/// sequence fits in `max_len`.
pub(crate) fn assemble_single(mut body: Vec<u32>, specials: &SpecialTokens, max_len: usize) -> Vec<u32> {
    body.truncate(max_len.saturating_sub(2));
    let mut ids = Vec::with_capacity(body.len() + 2);
    ids.push(specials.cls);
    ids.extend_from_slice(&body);
    ids.push(specials.sep);
    ids
}

/// Run `f` over every row, in input order, on up to `threads`
/// workers. The single-thread path skips pool construction.
fn map_rows<F>(rows: &RawDataset, threads: usize, f: F) -> Result<Vec<TokenizedRow>>
where
    F: Fn(usize, &RawRow) -> Result<TokenizedRow> + Send + Sync,
{
    let threads = threads.max(1);
    if threads == 1 {
        return rows.rows().iter().enumerate().map(|(i, row)| f(i, row)).collect();
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| Error::Configuration(format!("cannot build preprocessing thread pool: {e}")))?;
    // par_iter is indexed, so collect() reassembles input order
    pool.install(|| {
        rows.rows()
            .par_iter()
            .enumerate()
            .map(|(i, row)| f(i, row))
            .collect()
    })
}

fn require<'a>(row: &'a RawRow, column: &str, index: usize) -> Result<&'a str> {
    row.get(column)
        .ok_or_else(|| Error::Tokenization(format!("row {index} has no '{column}' value")))
}

// ─── TokenizeRows trait ───────────────────────────────────────────────────────

/// One implementation per task family. `required_columns` lets the
/// loader validate headers before any tokenisation starts.
pub trait TokenizeRows: Send + Sync {
    fn required_columns(&self) -> &'static [&'static str];

    /// Tokenise every row. Output order matches input order.
    fn adapt(
        &self,
        rows: &RawDataset,
        tokenizer: &Tokenizer,
        threads: usize,
    ) -> Result<TokenizedDataset>;
}

// ─── ConcatenatingAdapter ─────────────────────────────────────────────────────

/// Masked-LM and generation-style training data: every row's text
/// is encoded as [CLS] text [SEP], the encoded streams are joined
/// into one, and the stream is cut into fixed-size blocks. The
/// remainder that does not fill a block is dropped.
///
/// Labels mirror the input ids at every non-special position;
/// the masking collator decides per batch which of them are
/// corrupted and scored.
pub struct ConcatenatingAdapter {
    block_size: usize,
}

impl ConcatenatingAdapter {
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }
}

impl TokenizeRows for ConcatenatingAdapter {
    fn required_columns(&self) -> &'static [&'static str] {
        &["text"]
    }

    fn adapt(
        &self,
        rows: &RawDataset,
        tokenizer: &Tokenizer,
        threads: usize,
    ) -> Result<TokenizedDataset> {
        let specials = SpecialTokens::from_tokenizer(tokenizer)?;

        let texts: Vec<&str> = rows
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| require(row, "text", i))
            .collect::<Result<_>>()?;

        // ── Step 1: encode every row (parallel) ───────────────────────────────
        let threads = threads.max(1);
        let encoded: Vec<Vec<u32>> = if threads == 1 {
            texts.iter().map(|t| encode_ids(tokenizer, t)).collect::<Result<_>>()?
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::Configuration(format!("cannot build preprocessing thread pool: {e}")))?;
            pool.install(|| {
                texts
                    .par_iter()
                    .map(|t| encode_ids(tokenizer, t))
                    .collect::<Result<_>>()
            })?
        };

        // ── Step 2: concatenate into one token stream ─────────────────────────
        let mut stream: Vec<u32> = Vec::new();
        for ids in encoded {
            stream.push(specials.cls);
            stream.extend(ids);
            stream.push(specials.sep);
        }

        // ── Step 3: chunk into fixed blocks, dropping the tail ────────────────
        let block    = self.block_size;
        let n_blocks = stream.len() / block;
        let mut out  = Vec::with_capacity(n_blocks);

        for b in 0..n_blocks {
            let ids: Vec<u32> = stream[b * block..(b + 1) * block].to_vec();
            let labels: Vec<i64> = ids
                .iter()
                .map(|&id| if specials.is_special(id) { IGNORE_LABEL } else { id as i64 })
                .collect();
            out.push(TokenizedRow::new(ids, vec![0; block], labels));
        }

        tracing::debug!(
            "Concatenated {} rows into {} blocks of {} tokens ({} tokens dropped)",
            rows.len(),
            n_blocks,
            block,
            stream.len() - n_blocks * block,
        );

        Ok(TokenizedDataset::new(out))
    }
}

// ─── PairAdapter ──────────────────────────────────────────────────────────────

/// Text-to-text pairs: [CLS] input [SEP] target [SEP] with
/// segment ids 0/1. Only target-side positions carry labels, so
/// the masking collator corrupts only the target and the loss
/// fits infilling of the target given the input. The closing
/// [SEP] is labelled too — predicting it is how the model learns
/// to terminate.
pub struct PairAdapter {
    max_input_length:  usize,
    max_output_length: usize,
}

impl PairAdapter {
    pub fn new(max_input_length: usize, max_output_length: usize) -> Self {
        Self { max_input_length, max_output_length }
    }
}

impl TokenizeRows for PairAdapter {
    fn required_columns(&self) -> &'static [&'static str] {
        &["input", "target"]
    }

    fn adapt(
        &self,
        rows: &RawDataset,
        tokenizer: &Tokenizer,
        threads: usize,
    ) -> Result<TokenizedDataset> {
        let specials = SpecialTokens::from_tokenizer(tokenizer)?;

        let tokenized = map_rows(rows, threads, |i, row| {
            let input  = require(row, "input", i)?;
            let target = require(row, "target", i)?;

            let mut input_ids  = encode_ids(tokenizer, input)?;
            let mut target_ids = encode_ids(tokenizer, target)?;
            input_ids.truncate(self.max_input_length);
            target_ids.truncate(self.max_output_length);

            let mut ids = Vec::with_capacity(input_ids.len() + target_ids.len() + 3);
            ids.push(specials.cls);
            ids.extend_from_slice(&input_ids);
            ids.push(specials.sep);
            let target_from = ids.len();
            ids.extend_from_slice(&target_ids);
            ids.push(specials.sep);

            let segment_ids = segment_ids_after_first_sep(&ids, specials.sep);

            let mut labels = vec![IGNORE_LABEL; ids.len()];
            for pos in target_from..ids.len() {
                labels[pos] = ids[pos] as i64;
            }

            Ok(TokenizedRow::new(ids, segment_ids, labels))
        })?;

        Ok(TokenizedDataset::new(tokenized))
    }
}

// ─── QuestionContextAdapter ───────────────────────────────────────────────────

/// Extractive QA rows: [CLS] question [SEP] context [SEP], with
/// the character-level answer annotation mapped onto token
/// indices via the tokenizer's offsets.
///
/// A span that aligns with no token boundary is an error, never a
/// silent drop. A span pushed out of the window by truncation
/// collapses to (0, 0) — the [CLS] position — which is the
/// conventional "no answer in this window" target.
pub struct QuestionContextAdapter {
    max_seq_len: usize,
}

impl QuestionContextAdapter {
    pub fn new(max_seq_len: usize) -> Self {
        Self { max_seq_len }
    }
}

impl TokenizeRows for QuestionContextAdapter {
    fn required_columns(&self) -> &'static [&'static str] {
        &["context", "question", "answer_text", "answer_start"]
    }

    fn adapt(
        &self,
        rows: &RawDataset,
        tokenizer: &Tokenizer,
        threads: usize,
    ) -> Result<TokenizedDataset> {
        let specials = SpecialTokens::from_tokenizer(tokenizer)?;

        let tokenized = map_rows(rows, threads, |i, row| {
            let context     = require(row, "context", i)?;
            let question    = require(row, "question", i)?;
            let answer_text = require(row, "answer_text", i)?;
            let answer_start: usize = require(row, "answer_start", i)?
                .trim()
                .parse()
                .map_err(|_| {
                    Error::Tokenization(format!("row {i}: answer_start is not a number"))
                })?;
            let answer_end = answer_start + answer_text.len();

            let q_ids = encode_ids(tokenizer, question)?;
            let c_enc = tokenizer
                .encode(context, false)
                .map_err(|e| Error::Tokenization(format!("row {i}: cannot tokenise context: {e}")))?;
            let c_ids = c_enc.get_ids();

            // ── Map the character span onto context token indices ─────────────
            let mut tok_start = None;
            let mut tok_end   = None;
            for (t, &(s, e)) in c_enc.get_offsets().iter().enumerate() {
                if s < answer_end && e > answer_start {
                    if tok_start.is_none() {
                        tok_start = Some(t);
                    }
                    tok_end = Some(t);
                }
            }
            let (tok_start, tok_end) = match (tok_start, tok_end) {
                (Some(s), Some(e)) => (s, e),
                _ => {
                    return Err(Error::Tokenization(format!(
                        "row {i}: answer span [{answer_start}, {answer_end}) aligns with no context token"
                    )))
                }
            };

            // ── Assemble [CLS] question [SEP] context [SEP] ───────────────────
            let mut ids = Vec::with_capacity(q_ids.len() + c_ids.len() + 3);
            ids.push(specials.cls);
            ids.extend_from_slice(&q_ids);
            ids.push(specials.sep);
            let context_from = ids.len();
            ids.extend_from_slice(c_ids);
            ids.push(specials.sep);

            let mut span = (context_from + tok_start, context_from + tok_end);

            if ids.len() > self.max_seq_len {
                ids.truncate(self.max_seq_len);
                if let Some(last) = ids.last_mut() {
                    *last = specials.sep;
                }
                // Answer truncated out of the window → point at [CLS]
                if span.1 >= self.max_seq_len.saturating_sub(1) {
                    span = (0, 0);
                }
            }

            let segment_ids = segment_ids_after_first_sep(&ids, specials.sep);
            let len = ids.len();

            Ok(TokenizedRow {
                input_ids:   ids,
                segment_ids,
                labels:      vec![IGNORE_LABEL; len],
                class_label: None,
                answer_span: Some(span),
            })
        })?;

        Ok(TokenizedDataset::new(tokenized))
    }
}

// ─── LabelledTextAdapter ──────────────────────────────────────────────────────

/// Classification rows: [CLS] text [SEP] plus an integer class
/// index from the `label` column.
pub struct LabelledTextAdapter {
    max_seq_len: usize,
}

impl LabelledTextAdapter {
    pub fn new(max_seq_len: usize) -> Self {
        Self { max_seq_len }
    }
}

impl TokenizeRows for LabelledTextAdapter {
    fn required_columns(&self) -> &'static [&'static str] {
        &["text", "label"]
    }

    fn adapt(
        &self,
        rows: &RawDataset,
        tokenizer: &Tokenizer,
        threads: usize,
    ) -> Result<TokenizedDataset> {
        let specials = SpecialTokens::from_tokenizer(tokenizer)?;

        let tokenized = map_rows(rows, threads, |i, row| {
            let text  = require(row, "text", i)?;
            let label: i64 = require(row, "label", i)?
                .trim()
                .parse()
                .map_err(|_| {
                    Error::Tokenization(format!(
                        "row {i}: label '{}' is not an integer class index",
                        row.get("label").unwrap_or_default()
                    ))
                })?;
            if label < 0 {
                return Err(Error::Tokenization(format!(
                    "row {i}: label {label} is negative"
                )));
            }

            let body = encode_ids(tokenizer, text)?;
            let ids  = assemble_single(body, &specials, self.max_seq_len);
            let len  = ids.len();

            Ok(TokenizedRow {
                input_ids:   ids,
                segment_ids: vec![0; len],
                labels:      vec![IGNORE_LABEL; len],
                class_label: Some(label),
                answer_span: None,
            })
        })?;

        Ok(TokenizedDataset::new(tokenized))
    }
}
