// ============================================================
// Result Domain Types
// ============================================================
// The terminal records handed back to callers. Each task family
// has its own shape, but they share two rules:
//   - Scores are f32 softmax outputs (or sums of them); higher
//     is better, and lists arrive sorted descending.
//   - Everything is Serialize/Deserialize so callers can log or
//     persist results without reaching into tensor types.
//
// Reference: Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

/// One ranked token for a masked position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordPredictionResult {
    /// The vocabulary token, as the tokenizer spells it
    pub token: String,
    /// Softmax score at the masked position. In restricted mode
    /// this is a SUM over the candidate's sub-tokens, which makes
    /// it a relative weight rather than a probability.
    pub score: f32,
}

/// One extracted answer span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// The answer exactly as it appears in the context
    pub text: String,
    /// start_prob * end_prob of the chosen span
    pub score: f32,
    /// Byte offset of the answer's first character in the context
    pub start: usize,
    /// Byte offset one past the answer's last character
    pub end: usize,
}

/// The verdict on whether sentence B follows sentence A.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NextSentenceResult {
    /// Softmax probability of the "is the continuation" class
    pub probability: f32,
}

impl NextSentenceResult {
    /// Boolean view at the conventional 0.5 threshold.
    pub fn is_continuation(&self) -> bool {
        self.probability >= 0.5
    }
}

/// One ranked label for a classified text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Outcome of an evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Mean per-batch loss over the eval partition
    pub loss: f32,
    /// Fraction of correct predictions, for task families that
    /// define one (classification); None otherwise
    pub accuracy: Option<f32>,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_sentence_threshold() {
        assert!(NextSentenceResult { probability: 0.5 }.is_continuation());
        assert!(NextSentenceResult { probability: 0.91 }.is_continuation());
        assert!(!NextSentenceResult { probability: 0.49 }.is_continuation());
    }

    #[test]
    fn test_eval_result_serialises() {
        let r = EvalResult { loss: 1.25, accuracy: Some(0.75) };
        let json = serde_json::to_string(&r).unwrap();
        let back: EvalResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
