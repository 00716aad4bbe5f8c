//! Length equalization.
//!
//! The assignment mapper needs square input. The shorter of (before,
//! after) is padded with deep copies of slides from the longer side,
//! flagged `new` (padding `before`: the slide must be appended) or
//! `delete` (padding `after`: the slide must be removed). Copying the
//! least-similar slides keeps the surrogates out of the way of real
//! matches, and because a surrogate is an exact copy of its source the
//! mapper pairs them at the identical-score sentinel.

use crate::model::image::MatchOptions;
use crate::model::Slide;

use super::similarity::get_similarity;

/// Pad the shorter sequence so both have equal length.
///
/// Returns independent copies; the caller's input is never mutated. The
/// appended surrogates form a trailing contiguous block, flagged `new`
/// on the before side or `delete` on the after side.
pub fn adjust_slide_count(
    before: &[Slide],
    after: &[Slide],
    opts: &MatchOptions,
) -> (Vec<Slide>, Vec<Slide>) {
    let mut before: Vec<Slide> = before.to_vec();
    let mut after: Vec<Slide> = after.to_vec();

    if after.len() < before.len() {
        let missing = before.len() - after.len();
        for idx in pick_least_similar(&before, &after, missing, opts) {
            let mut copy = before[idx].clone();
            copy.delete = true;
            after.push(copy);
        }
    } else if before.len() < after.len() {
        let missing = after.len() - before.len();
        for idx in pick_least_similar(&after, &before, missing, opts) {
            let mut copy = after[idx].clone();
            copy.new = true;
            before.push(copy);
        }
    }

    (before, after)
}

/// Indices of the `count` slides in `candidates` with the lowest total
/// similarity against `others`, in ascending index order.
///
/// Ties on total similarity prefer the later slide, so surplus deletions
/// land at the tail of the deck.
fn pick_least_similar(
    candidates: &[Slide],
    others: &[Slide],
    count: usize,
    opts: &MatchOptions,
) -> Vec<usize> {
    let mut totals: Vec<(usize, i64)> = candidates
        .iter()
        .enumerate()
        .map(|(idx, slide)| {
            let total: i64 = others.iter().map(|x| get_similarity(slide, x, opts)).sum();
            (idx, total)
        })
        .collect();

    totals.sort_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));

    let mut picked: Vec<usize> = totals.into_iter().take(count).map(|(idx, _)| idx).collect();
    picked.sort_unstable();
    picked
}

// =============================================================================
// Tests
// =============================================================================
