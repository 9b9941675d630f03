// ============================================================
// Tokenised Dataset
// ============================================================
// One row schema serves every task family:
//
//   input_ids    — the encoded sequence, specials included
//   segment_ids  — 0 for the first segment (through the first
//                  [SEP]), 1 for the second segment
//   labels       — token-level targets; IGNORE_LABEL marks
//                  positions the loss must skip. For LM-style
//                  rows the label mirrors the input id and the
//                  masking collator decides per batch which of
//                  them are actually corrupted and scored.
//   class_label  — sequence-level target (classification)
//   answer_span  — token-level answer span (extractive QA)
//
// Rows are serde-serialisable on purpose: they are also the wire
// format of the preprocessed-data cache.

use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// Loss positions carrying this label are ignored.
pub const IGNORE_LABEL: i64 = -100;

/// One fully tokenised sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenizedRow {
    pub input_ids:   Vec<u32>,
    pub segment_ids: Vec<u32>,
    pub labels:      Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_label: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_span: Option<(usize, usize)>,
}

impl TokenizedRow {
    /// A row with per-token labels only (LM-style tasks).
    pub fn new(input_ids: Vec<u32>, segment_ids: Vec<u32>, labels: Vec<i64>) -> Self {
        Self { input_ids, segment_ids, labels, class_label: None, answer_span: None }
    }

    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// An in-memory collection of tokenised rows, usable as a Burn
/// dataset.
#[derive(Debug, Clone, Default)]
pub struct TokenizedDataset {
    rows: Vec<TokenizedRow>,
}

impl TokenizedDataset {
    pub fn new(rows: Vec<TokenizedRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[TokenizedRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<TokenizedRow> {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Dataset<TokenizedRow> for TokenizedDataset {
    fn get(&self, index: usize) -> Option<TokenizedRow> {
        self.rows.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_get_clones_rows() {
        let row = TokenizedRow::new(vec![101, 7, 102], vec![0, 0, 0], vec![-100, 7, -100]);
        let ds  = TokenizedDataset::new(vec![row.clone()]);
        assert_eq!(Dataset::len(&ds), 1);
        assert_eq!(ds.get(0), Some(row));
        assert_eq!(ds.get(1), None);
    }

    #[test]
    fn test_row_json_round_trip() {
        let row = TokenizedRow {
            input_ids:   vec![101, 5, 102, 9, 102],
            segment_ids: vec![0, 0, 0, 1, 1],
            labels:      vec![IGNORE_LABEL; 5],
            class_label: Some(2),
            answer_span: Some((3, 3)),
        };
        let json = serde_json::to_string(&row).unwrap();
        let back: TokenizedRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_optional_fields_default_when_absent() {
        let json = r#"{"input_ids":[1,2],"segment_ids":[0,0],"labels":[-100,-100]}"#;
        let row: TokenizedRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.class_label, None);
        assert_eq!(row.answer_span, None);
    }
}
