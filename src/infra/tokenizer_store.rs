// ============================================================
// Tokenizer Store
// ============================================================
// Saves and loads the tokenizer that lives alongside a model
// directory, and builds a word-level vocabulary from a corpus
// when a task is created from scratch.
//
// In tokenizers 0.15, train_from_files requires Trainer::Model
// to equal ModelWrapper. The correct approach is to build the
// tokenizer JSON manually and load it, bypassing the trainer
// type mismatch entirely.
//
// Special ids follow the BERT convention ([PAD]=0, [UNK]=1,
// [CLS]=101, [SEP]=102, [MASK]=103, words from 104), which
// leaves gaps in the id space. Embedding tables must therefore
// be sized by `embedding_vocab_size`, never by the vocab count.
//
// Reference: tokenizers crate documentation

use std::path::PathBuf;

use tokenizers::Tokenizer;

use crate::error::{Error, Result};

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load the tokenizer saved in this directory, or build a new
    /// one from `texts` when none exists yet.
    pub fn load_or_build(
        &self,
        texts:      &[String],
        vocab_size: usize,
    ) -> Result<Tokenizer> {
        if self.dir.join("tokenizer.json").exists() {
            tracing::info!("Loading existing tokenizer from disk");
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(texts, vocab_size)
        }
    }

    /// Load a previously saved tokenizer JSON.
    pub fn load(&self) -> Result<Tokenizer> {
        let path = self.dir.join("tokenizer.json");
        Tokenizer::from_file(&path)
            .map_err(|e| Error::model_load(&path, format!("tokenizer: {e}")))
    }

    /// Write the tokenizer into this directory.
    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::model_save(&self.dir, e.to_string()))?;
        let path = self.dir.join("tokenizer.json");
        tokenizer
            .save(&path, true)
            .map_err(|e| Error::model_save(&path, format!("tokenizer: {e}")))
    }

    /// Build a word-level vocabulary from corpus texts and write a
    /// valid tokenizer JSON directly.
    fn build_and_save(&self, texts: &[String], vocab_size: usize) -> Result<Tokenizer> {
        std::fs::create_dir_all(&self.dir).ok();

        // ── Step 1: Count word frequencies across the corpus ──────────────────
        use std::collections::HashMap;
        let mut freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            for word in text.split_whitespace() {
                // Normalise to lowercase, strip punctuation from edges
                let w = word.to_lowercase();
                let w = w.trim_matches(|c: char| !c.is_alphanumeric());
                if !w.is_empty() {
                    *freq.entry(w.to_string()).or_insert(0) += 1;
                }
            }
        }

        // Sort by frequency descending, take top vocab_size - 5
        // (reserve 5 slots for special tokens)
        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1));
        words.truncate(vocab_size.saturating_sub(5));

        // ── Step 2: Build the vocab map ───────────────────────────────────────
        let mut vocab = serde_json::json!({
            "[PAD]":  0,
            "[UNK]":  1,
            "[CLS]":  101,
            "[SEP]":  102,
            "[MASK]": 103,
        });

        let mut next_id = 104usize;
        for (word, _) in &words {
            if vocab.get(word).is_none() {
                vocab[word] = serde_json::json!(next_id);
                next_id += 1;
            }
        }

        // ── Step 3: Write tokenizer JSON in the format from_file expects ──────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0,   "content": "[PAD]",  "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 1,   "content": "[UNK]",  "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 101, "content": "[CLS]",  "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 102, "content": "[SEP]",  "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 103, "content": "[MASK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": {
                "type": "BertNormalizer",
                "clean_text": true,
                "handle_chinese_chars": true,
                "strip_accents": null,
                "lowercase": true
            },
            "pre_tokenizer": {
                "type": "Whitespace"
            },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": "[UNK]"
            }
        });

        let tok_path = self.dir.join("tokenizer.json");
        let payload = serde_json::to_string_pretty(&tokenizer_json)
            .map_err(|e| Error::model_save(&tok_path, e.to_string()))?;
        std::fs::write(&tok_path, payload)
            .map_err(|e| Error::model_save(&tok_path, e.to_string()))?;

        tracing::info!(
            "Tokenizer built with {} words, saved to '{}'",
            next_id - 104,
            tok_path.display()
        );

        // Load back as a proper Tokenizer instance
        Tokenizer::from_file(&tok_path)
            .map_err(|e| Error::model_load(&tok_path, format!("reloading built tokenizer: {e}")))
    }
}

/// Smallest embedding-table size that covers every id the
/// tokenizer can emit. The BERT-style id layout has gaps, so the
/// vocab COUNT undercounts; size by max id + 1 instead.
pub fn embedding_vocab_size(tokenizer: &Tokenizer) -> usize {
    tokenizer
        .get_vocab(true)
        .values()
        .map(|&id| id as usize + 1)
        .max()
        .unwrap_or(0)
}
