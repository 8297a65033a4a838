//! Top-K selection over raw output scores.

/// One selected entry: index into the score buffer plus its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("requested top-{requested} from {available} scores")]
    NotEnoughElements { requested: usize, available: usize },

    #[error("no selectable score remaining after {selected} picks")]
    Exhausted { selected: usize },
}

/// Selects the `k` highest scores by repeated linear selection.
///
/// Each pass scans the not-yet-selected entries and keeps the current maximum
/// under strict `>`, so equal scores resolve to the lowest index. The running
/// maximum starts at negative infinity, keeping zero and negative scores
/// eligible; any finite seed (a -1.0, say) would silently misrank legitimate
/// negative scores. O(K*N); K is small here and N is bounded by the label
/// count.
pub fn top_k(scores: &[f32], k: usize) -> Result<Vec<ScoredIndex>, SelectionError> {
    if k > scores.len() {
        return Err(SelectionError::NotEnoughElements {
            requested: k,
            available: scores.len(),
        });
    }

    let mut selected = vec![false; scores.len()];
    let mut picks = Vec::with_capacity(k);
    for _ in 0..k {
        let mut best: Option<usize> = None;
        let mut max = f32::NEG_INFINITY;
        for (i, &score) in scores.iter().enumerate() {
            if selected[i] {
                continue;
            }
            if score > max {
                max = score;
                best = Some(i);
            }
        }
        // NaN never compares greater, so an all-NaN remainder exhausts here.
        let index = best.ok_or(SelectionError::Exhausted {
            selected: picks.len(),
        })?;
        selected[index] = true;
        picks.push(ScoredIndex {
            index,
            score: scores[index],
        });
    }
    Ok(picks)
}
