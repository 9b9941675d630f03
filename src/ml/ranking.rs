// ============================================================
// Prediction Ranking
// ============================================================
// Pure score bookkeeping shared by every inference path. No
// tensors in here: callers hand over plain probability slices
// read back from the device, and get ordered (index, score)
// pairs out.
//
// Ordering is deterministic: descending by score, and the sort is
// stable so equal scores keep their original index order. Ranking
// an already-ranked list changes nothing.

/// One candidate with its probability mass.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub index: usize,
    pub score: f32,
}

/// Sort candidates by descending score. Stable on ties.
pub fn rank(mut candidates: Vec<Ranked>) -> Vec<Ranked> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// The `k` highest-scoring indices of a probability slice.
pub fn top_k(scores: &[f32], k: usize) -> Vec<Ranked> {
    let ranked = rank(
        scores
            .iter()
            .enumerate()
            .map(|(index, &score)| Ranked { index, score })
            .collect(),
    );
    ranked.into_iter().take(k).collect()
}

/// Score each candidate token sequence by summing the probability
/// mass of its pieces, then rank. Multi-token candidates compete
/// on their aggregate mass; the returned index points into
/// `candidates`.
pub fn score_candidates(scores: &[f32], candidates: &[Vec<u32>]) -> Vec<Ranked> {
    rank(
        candidates
            .iter()
            .enumerate()
            .map(|(index, ids)| {
                let score = ids
                    .iter()
                    .map(|&id| scores.get(id as usize).copied().unwrap_or(0.0))
                    .sum();
                Ranked { index, score }
            })
            .collect(),
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_by_descending_score() {
        let ranked = rank(vec![
            Ranked { index: 0, score: 0.1 },
            Ranked { index: 1, score: 0.7 },
            Ranked { index: 2, score: 0.2 },
        ]);
        let order: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_rank_is_idempotent() {
        let once = rank(vec![
            Ranked { index: 0, score: 0.3 },
            Ranked { index: 1, score: 0.9 },
        ]);
        let twice = rank(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ties_keep_original_index_order() {
        let ranked = rank(vec![
            Ranked { index: 5, score: 0.5 },
            Ranked { index: 2, score: 0.5 },
            Ranked { index: 9, score: 0.5 },
        ]);
        let order: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![5, 2, 9]);
    }

    #[test]
    fn test_top_k_truncates() {
        let top = top_k(&[0.1, 0.4, 0.2, 0.3], 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].index, 1);
        assert_eq!(top[1].index, 3);
    }

    #[test]
    fn test_multi_token_candidates_sum_their_pieces() {
        // candidate 0 = one strong token, candidate 1 = two weak
        // tokens whose sum wins
        let scores = [0.0, 0.4, 0.3, 0.3];
        let ranked = score_candidates(&scores, &[vec![1], vec![2, 3]]);
        assert_eq!(ranked[0].index, 1);
        assert!((ranked[0].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_ids_score_zero() {
        let ranked = score_candidates(&[0.5, 0.5], &[vec![99]]);
        assert_eq!(ranked[0].score, 0.0);
    }

    #[test]
    fn test_no_candidates_yields_empty_ranking() {
        assert!(score_candidates(&[0.5], &[]).is_empty());
    }
}
