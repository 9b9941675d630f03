// ============================================================
// Preprocessing Pipeline
// ============================================================
// The one path every train/eval call takes to turn file paths
// into tokenised datasets:
//
//   load rows → split (or take the explicit eval file) →
//   tokenise via the task's adapter → optionally cache
//
// Cache precedence: when load_preprocessed_data is set, the raw
// files are never touched. When BOTH flags are set, loading wins;
// the loaded data is re-saved and a warning is logged, so the
// caller finds a cache at the save path either way.
//
// Splitting only happens when no explicit eval file is given.
// An explicit eval file is used in file order, unshuffled.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::config::{EvalArgs, TrainArgs};
use crate::data::adapter::TokenizeRows;
use crate::data::cache::PreprocessedStore;
use crate::data::dataset::TokenizedDataset;
use crate::data::loader::load_rows;
use crate::data::splitter::split_eval_ratio;
use crate::domain::raw::RawDataset;
use crate::error::{Error, Result};

/// Produce the (train, eval) pair for a training run.
pub fn preprocess_train(
    train_path: &Path,
    eval_path:  Option<&Path>,
    adapter:    &dyn TokenizeRows,
    tokenizer:  &Tokenizer,
    args:       &TrainArgs,
) -> Result<(TokenizedDataset, TokenizedDataset)> {
    args.validate()?;

    // ── Step 1: cached data short-circuits tokenisation ───────────────────────
    if args.load_preprocessed_data {
        if args.save_preprocessed_data {
            tracing::warn!(
                "both load_preprocessed_data and save_preprocessed_data are set; \
                 loading first, then saving the loaded data"
            );
        }
        let load_path = args.load_preprocessed_data_path.as_deref().ok_or_else(|| {
            Error::Configuration(
                "load_preprocessed_data is set but load_preprocessed_data_path is not".into(),
            )
        })?;
        let (train, eval) = PreprocessedStore::open(load_path)?.load_pair()?;
        save_pair_if_requested(args, &train, &eval)?;
        return Ok((train, eval));
    }

    // ── Step 2: load raw rows, split or take the explicit eval file ───────────
    let required = adapter.required_columns();
    let (train_raw, eval_raw) = match eval_path {
        Some(eval_path) => (
            load_rows(train_path, args.file_format, required)?,
            load_rows(eval_path, args.file_format, required)?,
        ),
        None => {
            let rows = load_rows(train_path, args.file_format, required)?;
            let (train, eval) = split_eval_ratio(rows.into_rows(), args.eval_ratio);
            (RawDataset::new(train), RawDataset::new(eval))
        }
    };
    tracing::info!(
        "Preprocessing {} train rows, {} eval rows",
        train_raw.len(),
        eval_raw.len()
    );

    // ── Step 3: tokenise both partitions ──────────────────────────────────────
    let train = adapter.adapt(&train_raw, tokenizer, args.preprocessing_threads)?;
    let eval  = adapter.adapt(&eval_raw, tokenizer, args.preprocessing_threads)?;

    save_pair_if_requested(args, &train, &eval)?;
    Ok((train, eval))
}

/// Produce the eval dataset for a standalone evaluation run.
pub fn preprocess_eval(
    eval_path: &Path,
    adapter:   &dyn TokenizeRows,
    tokenizer: &Tokenizer,
    args:      &EvalArgs,
) -> Result<TokenizedDataset> {
    args.validate()?;

    if args.load_preprocessed_data {
        if args.save_preprocessed_data {
            tracing::warn!(
                "both load_preprocessed_data and save_preprocessed_data are set; \
                 loading first, then saving the loaded data"
            );
        }
        let load_path = args.load_preprocessed_data_path.as_deref().ok_or_else(|| {
            Error::Configuration(
                "load_preprocessed_data is set but load_preprocessed_data_path is not".into(),
            )
        })?;
        let eval = PreprocessedStore::open(load_path)?.load_eval()?;
        save_eval_if_requested(args, &eval)?;
        return Ok(eval);
    }

    let rows = load_rows(eval_path, args.file_format, adapter.required_columns())?;
    tracing::info!("Preprocessing {} eval rows", rows.len());
    let eval = adapter.adapt(&rows, tokenizer, args.preprocessing_threads)?;

    save_eval_if_requested(args, &eval)?;
    Ok(eval)
}

fn save_pair_if_requested(
    args:  &TrainArgs,
    train: &TokenizedDataset,
    eval:  &TokenizedDataset,
) -> Result<()> {
    if !args.save_preprocessed_data {
        return Ok(());
    }
    let save_path = args.save_preprocessed_data_path.as_deref().ok_or_else(|| {
        Error::Configuration(
            "save_preprocessed_data is set but save_preprocessed_data_path is not".into(),
        )
    })?;
    PreprocessedStore::open(save_path)?.save_pair(train, eval)
}

fn save_eval_if_requested(args: &EvalArgs, eval: &TokenizedDataset) -> Result<()> {
    if !args.save_preprocessed_data {
        return Ok(());
    }
    let save_path = args.save_preprocessed_data_path.as_deref().ok_or_else(|| {
        Error::Configuration(
            "save_preprocessed_data is set but save_preprocessed_data_path is not".into(),
        )
    })?;
    PreprocessedStore::open(save_path)?.save_eval_only(eval)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::adapter::{ConcatenatingAdapter, LabelledTextAdapter};
    use crate::data::loader::FileFormat;
    use crate::infra::tokenizer_store::TokenizerStore;
    use std::fs;

    fn fixture_tokenizer(dir: &Path) -> Tokenizer {
        let corpus = vec![
            "the fee is due in january".to_string(),
            "our new laptop ships in march".to_string(),
            "please pay the invoice before friday".to_string(),
        ];
        TokenizerStore::new(dir).load_or_build(&corpus, 200).unwrap()
    }

    #[test]
    fn test_split_tokenise_and_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = fixture_tokenizer(dir.path());

        let data_path = dir.path().join("train.txt");
        fs::write(
            &data_path,
            "the fee is due in january\nour new laptop ships in march\nplease pay the invoice\nthe fee is paid\n",
        )
        .unwrap();

        let cache = dir.path().join("cache");
        let adapter = ConcatenatingAdapter::new(8);
        let args = TrainArgs {
            file_format:                 FileFormat::Text,
            eval_ratio:                  0.25,
            save_preprocessed_data:      true,
            save_preprocessed_data_path: Some(cache.clone()),
            ..Default::default()
        };

        let (train, eval) = preprocess_train(&data_path, None, &adapter, &tokenizer, &args).unwrap();

        // Second run loads the cache and never opens the raw file
        let reload_args = TrainArgs {
            load_preprocessed_data:      true,
            load_preprocessed_data_path: Some(cache),
            ..Default::default()
        };
        let bogus = dir.path().join("does-not-exist.txt");
        let (train2, eval2) =
            preprocess_train(&bogus, None, &adapter, &tokenizer, &reload_args).unwrap();

        assert_eq!(train.rows(), train2.rows());
        assert_eq!(eval.rows(), eval2.rows());
    }

    #[test]
    fn test_explicit_eval_file_is_used_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = fixture_tokenizer(dir.path());

        let train_path = dir.path().join("train.csv");
        let eval_path  = dir.path().join("eval.csv");
        fs::write(&train_path, "text,label\nthe fee is due,0\nthe invoice is due,1\n").unwrap();
        fs::write(
            &eval_path,
            "text,label\nour laptop ships,0\nthe fee is paid,1\nplease pay,2\n",
        )
        .unwrap();

        let adapter = LabelledTextAdapter::new(16);
        let args = TrainArgs::default();
        let (train, eval) =
            preprocess_train(&train_path, Some(&eval_path), &adapter, &tokenizer, &args).unwrap();

        assert_eq!(train.rows().len(), 2);
        let eval_labels: Vec<i64> = eval.rows().iter().map(|r| r.class_label.unwrap()).collect();
        assert_eq!(eval_labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_load_flag_also_resaves_when_both_are_set() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = fixture_tokenizer(dir.path());

        let data_path = dir.path().join("train.txt");
        fs::write(&data_path, "the fee is due in january\nthe fee is paid\n").unwrap();

        let first_cache = dir.path().join("cache-a");
        let adapter = ConcatenatingAdapter::new(4);
        let args = TrainArgs {
            file_format:                 FileFormat::Text,
            save_preprocessed_data:      true,
            save_preprocessed_data_path: Some(first_cache.clone()),
            ..Default::default()
        };
        preprocess_train(&data_path, None, &adapter, &tokenizer, &args).unwrap();

        let second_cache = dir.path().join("cache-b");
        let both = TrainArgs {
            load_preprocessed_data:      true,
            load_preprocessed_data_path: Some(first_cache),
            save_preprocessed_data:      true,
            save_preprocessed_data_path: Some(second_cache.clone()),
            ..Default::default()
        };
        preprocess_train(&data_path, None, &adapter, &tokenizer, &both).unwrap();

        assert!(second_cache.join("manifest.json").exists());
    }

    #[test]
    fn test_standalone_eval_preprocessing() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer = fixture_tokenizer(dir.path());

        let eval_path = dir.path().join("eval.txt");
        fs::write(&eval_path, "the fee is due in january\nour laptop ships in march\n").unwrap();

        let adapter = ConcatenatingAdapter::new(4);
        let args = EvalArgs { file_format: FileFormat::Text, ..Default::default() };
        let eval = preprocess_eval(&eval_path, &adapter, &tokenizer, &args).unwrap();
        assert!(!eval.is_empty());
    }
}
