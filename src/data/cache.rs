// ============================================================
// Preprocessed-Data Cache
// ============================================================
// Persists tokenised datasets so expensive preprocessing runs
// once. The cache is a DIRECTORY, not a single file:
//
//   <root>/
//     manifest.json   — format version + partition names/counts
//     train.jsonl     — one serialised TokenizedRow per line
//     eval.jsonl
//
// The manifest is written LAST, so its presence marks a complete
// write. Partition files without a manifest mean an interrupted
// save and are reported as corruption, never silently reloaded.
//
// The earlier single-file ".json" layout is retired; pointing the
// store at one is an error with migration guidance, not a parse
// attempt.
//
// Reference: serde_json crate documentation

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::data::dataset::{TokenizedDataset, TokenizedRow};
use crate::error::{Error, Result};

pub const TRAIN_PARTITION: &str = "train";
pub const EVAL_PARTITION:  &str = "eval";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    partitions:     Vec<PartitionEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PartitionEntry {
    name: String,
    rows: usize,
}

// ─── PreprocessedStore ────────────────────────────────────────────────────────

pub struct PreprocessedStore {
    root: PathBuf,
}

impl PreprocessedStore {
    /// Point the store at a cache directory. A path with a
    /// `.json` extension is the retired single-file layout and is
    /// rejected here, before any I/O.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let root = path.into();
        if root.extension().is_some_and(|ext| ext == "json") {
            return Err(Error::cache_format(
                &root,
                "single-file JSON caches are no longer supported; point at a cache \
                 directory and regenerate it with save_preprocessed_data",
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Write every partition, then the manifest.
    pub fn save(&self, partitions: &[(&str, &TokenizedDataset)]) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|e| Error::cache_write(&self.root, e.to_string()))?;

        let mut entries = Vec::with_capacity(partitions.len());
        for (name, data) in partitions {
            let path = self.root.join(format!("{name}.jsonl"));
            let file = File::create(&path)
                .map_err(|e| Error::cache_write(&path, e.to_string()))?;
            let mut writer = BufWriter::new(file);
            for row in data.rows() {
                let line = serde_json::to_string(row)
                    .map_err(|e| Error::cache_write(&path, e.to_string()))?;
                writeln!(writer, "{line}")
                    .map_err(|e| Error::cache_write(&path, e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| Error::cache_write(&path, e.to_string()))?;

            tracing::info!("Cached {} rows to '{}'", data.rows().len(), path.display());
            entries.push(PartitionEntry {
                name: (*name).to_string(),
                rows: data.rows().len(),
            });
        }

        // The manifest lands last; until it exists the cache is
        // considered incomplete.
        let manifest = Manifest { format_version: FORMAT_VERSION, partitions: entries };
        let path = self.root.join("manifest.json");
        let payload = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::cache_write(&path, e.to_string()))?;
        fs::write(&path, payload).map_err(|e| Error::cache_write(&path, e.to_string()))
    }

    /// Load one partition. Absent cache or absent partition is a
    /// CacheMiss; anything present-but-untrustworthy is CacheFormat.
    pub fn load_partition(&self, name: &str) -> Result<TokenizedDataset> {
        if !self.root.join("manifest.json").exists() {
            if self.has_partition_files() {
                return Err(Error::cache_format(
                    &self.root,
                    "partition files exist but there is no manifest; the cache write \
                     did not complete",
                ));
            }
            return Err(Error::cache_miss(&self.root, name));
        }

        let manifest = self.read_manifest()?;
        let Some(entry) = manifest.partitions.iter().find(|p| p.name == name) else {
            return Err(Error::cache_miss(&self.root, name));
        };

        let path = self.root.join(format!("{name}.jsonl"));
        let file = File::open(&path).map_err(|e| {
            Error::cache_format(
                &self.root,
                format!("manifest lists '{name}' but its file is unreadable: {e}"),
            )
        })?;

        let reader = BufReader::new(file);
        let mut rows = Vec::with_capacity(entry.rows);
        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| {
                Error::cache_format(&self.root, format!("{name}.jsonl line {}: {e}", n + 1))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let row: TokenizedRow = serde_json::from_str(&line).map_err(|e| {
                Error::cache_format(&self.root, format!("{name}.jsonl line {}: {e}", n + 1))
            })?;
            rows.push(row);
        }

        if rows.len() != entry.rows {
            return Err(Error::cache_format(
                &self.root,
                format!("'{name}' holds {} rows, manifest expects {}", rows.len(), entry.rows),
            ));
        }

        tracing::info!("Loaded {} cached rows from '{}'", rows.len(), path.display());
        Ok(TokenizedDataset::new(rows))
    }

    pub fn save_pair(&self, train: &TokenizedDataset, eval: &TokenizedDataset) -> Result<()> {
        self.save(&[(TRAIN_PARTITION, train), (EVAL_PARTITION, eval)])
    }

    pub fn load_pair(&self) -> Result<(TokenizedDataset, TokenizedDataset)> {
        Ok((
            self.load_partition(TRAIN_PARTITION)?,
            self.load_partition(EVAL_PARTITION)?,
        ))
    }

    pub fn save_eval_only(&self, eval: &TokenizedDataset) -> Result<()> {
        self.save(&[(EVAL_PARTITION, eval)])
    }

    pub fn load_eval(&self) -> Result<TokenizedDataset> {
        self.load_partition(EVAL_PARTITION)
    }

    fn read_manifest(&self) -> Result<Manifest> {
        let path = self.root.join("manifest.json");
        let payload = fs::read_to_string(&path)
            .map_err(|e| Error::cache_format(&self.root, format!("manifest: {e}")))?;
        let manifest: Manifest = serde_json::from_str(&payload)
            .map_err(|e| Error::cache_format(&self.root, format!("manifest: {e}")))?;
        if manifest.format_version > FORMAT_VERSION {
            return Err(Error::cache_format(
                &self.root,
                format!(
                    "manifest version {} is newer than this build understands",
                    manifest.format_version
                ),
            ));
        }
        Ok(manifest)
    }

    fn has_partition_files(&self) -> bool {
        fs::read_dir(&self.root)
            .map(|mut entries| {
                entries.any(|e| {
                    e.ok()
                        .is_some_and(|e| e.path().extension().is_some_and(|ext| ext == "jsonl"))
                })
            })
            .unwrap_or(false)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::IGNORE_LABEL;

    fn sample_data(n: usize) -> TokenizedDataset {
        let rows = (0..n)
            .map(|i| {
                TokenizedRow::new(
                    vec![101, 104 + i as u32, 102],
                    vec![0, 0, 0],
                    vec![IGNORE_LABEL, (104 + i as i64), IGNORE_LABEL],
                )
            })
            .collect();
        TokenizedDataset::new(rows)
    }

    #[test]
    fn test_save_and_load_pair_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreprocessedStore::open(dir.path().join("cache")).unwrap();

        let train = sample_data(5);
        let eval  = sample_data(2);
        store.save_pair(&train, &eval).unwrap();

        let (loaded_train, loaded_eval) = store.load_pair().unwrap();
        assert_eq!(loaded_train.rows(), train.rows());
        assert_eq!(loaded_eval.rows(), eval.rows());
    }

    #[test]
    fn test_missing_cache_is_a_miss_not_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreprocessedStore::open(dir.path().join("nothing-here")).unwrap();
        let err = store.load_partition(TRAIN_PARTITION).unwrap_err();
        assert!(matches!(err, Error::CacheMiss { .. }));
    }

    #[test]
    fn test_partition_files_without_manifest_are_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("cache");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("train.jsonl"), "{}\n").unwrap();

        let store = PreprocessedStore::open(&root).unwrap();
        let err = store.load_partition(TRAIN_PARTITION).unwrap_err();
        assert!(matches!(err, Error::CacheFormat { .. }));
        assert!(err.to_string().contains("did not complete"));
    }

    #[test]
    fn test_garbage_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreprocessedStore::open(dir.path().join("cache")).unwrap();
        store.save(&[(TRAIN_PARTITION, &sample_data(1))]).unwrap();

        // Corrupt the partition behind the manifest's back
        let path = dir.path().join("cache").join("train.jsonl");
        fs::write(&path, "this is not json\n").unwrap();

        let err = store.load_partition(TRAIN_PARTITION).unwrap_err();
        assert!(matches!(err, Error::CacheFormat { .. }));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_row_count_mismatch_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreprocessedStore::open(dir.path().join("cache")).unwrap();
        store.save(&[(TRAIN_PARTITION, &sample_data(3))]).unwrap();

        let path = dir.path().join("cache").join("train.jsonl");
        let kept: String = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .take(1)
            .map(|l| format!("{l}\n"))
            .collect();
        fs::write(&path, kept).unwrap();

        let err = store.load_partition(TRAIN_PARTITION).unwrap_err();
        assert!(matches!(err, Error::CacheFormat { .. }));
    }

    #[test]
    fn test_legacy_single_file_path_is_rejected_with_guidance() {
        let err = PreprocessedStore::open("/tmp/preprocessed.json").unwrap_err();
        assert!(matches!(err, Error::CacheFormat { .. }));
        assert!(err.to_string().contains("no longer supported"));
    }

    #[test]
    fn test_eval_only_cache_misses_train_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreprocessedStore::open(dir.path().join("cache")).unwrap();
        store.save_eval_only(&sample_data(2)).unwrap();

        assert!(store.load_eval().is_ok());
        let err = store.load_partition(TRAIN_PARTITION).unwrap_err();
        assert!(matches!(err, Error::CacheMiss { .. }));
    }
}
