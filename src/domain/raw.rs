// ============================================================
// Raw Dataset Domain Types
// ============================================================
// A RawRow is one record of the input file before tokenisation:
// a mapping from column name to text. CSV files produce one row
// per record with one entry per column; plain-text files produce
// one row per line with a single "text" column.
//
// These are plain data structs with no behaviour beyond lookup —
// by the time a RawRow exists, all file-format concerns
// (quoting, headers, blank lines) have already been handled.
//
// Reference: Rust Book §8 (Collections)

use std::collections::HashMap;

/// One record of an input dataset: column name → text value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: HashMap<String, String>,
}

impl RawRow {
    pub fn new() -> Self {
        Self { fields: HashMap::new() }
    }

    /// Build a single-column row, as produced by line-delimited
    /// text files.
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut row = Self::new();
        row.insert("text", text);
        row
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }
}

/// An ordered sequence of raw rows. Order matters: the
/// tokenisation step must preserve it, so downstream rows can be
/// traced back to their source records.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    rows: Vec<RawRow>,
}

impl RawDataset {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<RawRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_text_creates_text_column() {
        let row = RawRow::from_text("hello world");
        assert_eq!(row.get("text"), Some("hello world"));
        assert_eq!(row.get("label"), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut row = RawRow::new();
        row.insert("question", "when?");
        row.insert("context", "now.");
        assert_eq!(row.get("question"), Some("when?"));
        assert_eq!(row.get("context"), Some("now."));
    }
}
