//! Assignment mapping between slide sequences.
//!
//! Builds an n x n similarity matrix, converts it to a minimization cost
//! matrix and solves the assignment with the Kuhn-Munkres algorithm in
//! its O(n^3) potential form. The augmentation loop carries an explicit
//! iteration budget; exhausting it falls back to a greedy row-by-row
//! minimum that still yields a valid bijection, trading optimality for
//! graceful degradation.

use std::collections::HashMap;

use tracing::warn;

use crate::error::PlanError;
use crate::model::image::MatchOptions;
use crate::model::Slide;

use super::similarity::get_similarity_for_mapping;

/// Which assignment path to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Kuhn-Munkres with greedy fallback on budget exhaustion.
    #[default]
    Hungarian,
    /// Greedy row-by-row minimum. Exists so a bug in the Hungarian step
    /// degrades gracefully; selectable directly for tests.
    Greedy,
}

/// Compute an optimal before-index to after-index bijection.
///
/// Requires equal-length inputs. The result covers every before index
/// exactly once and every after index exactly once.
pub fn map_slides(
    before: &[Slide],
    after: &[Slide],
    opts: &MatchOptions,
) -> Result<HashMap<usize, usize>, PlanError> {
    map_slides_with(before, after, opts, Strategy::Hungarian)
}

/// [`map_slides`] with an explicit strategy.
pub fn map_slides_with(
    before: &[Slide],
    after: &[Slide],
    opts: &MatchOptions,
    strategy: Strategy,
) -> Result<HashMap<usize, usize>, PlanError> {
    if before.len() != after.len() {
        return Err(PlanError::LengthMismatch {
            before: before.len(),
            after: after.len(),
        });
    }
    let n = before.len();
    if n == 0 {
        return Ok(HashMap::new());
    }

    // Score matrix, then flip into costs by subtracting from the max so
    // the minimizer maximizes total similarity.
    let mut max_score = i64::MIN;
    let mut scores = vec![vec![0i64; n]; n];
    for (i, b) in before.iter().enumerate() {
        for (j, a) in after.iter().enumerate() {
            let score = get_similarity_for_mapping(b, a, i, j, opts);
            scores[i][j] = score;
            max_score = max_score.max(score);
        }
    }
    let cost: Vec<Vec<i64>> = scores
        .iter()
        .map(|row| row.iter().map(|&s| max_score - s).collect())
        .collect();

    let assignment = match strategy {
        Strategy::Greedy => greedy(&cost),
        Strategy::Hungarian => hungarian(&cost).unwrap_or_else(|| {
            warn!("assignment budget exhausted for {n} slides, using greedy fallback");
            greedy(&cost)
        }),
    };

    let mut mapping = HashMap::with_capacity(n);
    for (row, col) in assignment.into_iter().enumerate() {
        mapping.insert(row, col);
    }
    Ok(mapping)
}

/// Kuhn-Munkres in the potential formulation.
///
/// Returns `assignment[row] = col` minimizing total cost, or `None` when
/// the iteration budget runs out before a complete matching is found.
fn hungarian(cost: &[Vec<i64>]) -> Option<Vec<usize>> {
    let n = cost.len();
    let mut budget = 4 * n * n + 64;

    // 1-indexed internals; index 0 is the virtual root column.
    let mut u = vec![0i64; n + 1];
    let mut v = vec![0i64; n + 1];
    let mut row_of = vec![0usize; n + 1]; // row assigned to column, 0 = free
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        row_of[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![i64::MAX; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            budget = budget.checked_sub(1)?;
            used[j0] = true;
            let i0 = row_of[j0];
            let mut delta = i64::MAX;
            let mut j1 = 0usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = cost[i0 - 1][j - 1] - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[row_of[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if row_of[j0] == 0 {
                break;
            }
        }

        // Unwind the augmenting path.
        loop {
            let j1 = way[j0];
            row_of[j0] = row_of[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=n {
        assignment[row_of[j] - 1] = j - 1;
    }
    Some(assignment)
}

/// Greedy fallback: each row takes the cheapest still-free column.
///
/// Not optimal, but always a bijection.
fn greedy(cost: &[Vec<i64>]) -> Vec<usize> {
    let n = cost.len();
    let mut taken = vec![false; n];
    let mut assignment = vec![0usize; n];

    for (row, costs) in cost.iter().enumerate() {
        let mut best: Option<(usize, i64)> = None;
        for (col, &c) in costs.iter().enumerate() {
            if taken[col] {
                continue;
            }
            if best.map(|(_, bc)| c < bc).unwrap_or(true) {
                best = Some((col, c));
            }
        }
        // A free column always exists: rows processed == columns taken.
        let (col, _) = best.unwrap_or((0, 0));
        taken[col] = true;
        assignment[row] = col;
    }
    assignment
}

// =============================================================================
// Tests
// =============================================================================
