//! Slide similarity scoring.
//!
//! The mapper maximizes total similarity over an assignment, so the score
//! scale is chosen to make the right things dominate:
//!
//! - 500 is a sentinel strictly greater than any composite non-identical
//!   score; identical slides always win their assignment.
//! - Among non-identical pairs, a body match is worth the most because a
//!   body rewrite is the most expensive remote operation.
//! - A small position bonus biases ties toward keeping the deck in
//!   source order.

use crate::model::image::MatchOptions;
use crate::model::Slide;

/// Sentinel score for structural equality on all rendered fields.
pub const IDENTICAL: i64 = 500;

/// Score for a matching layout.
const LAYOUT_MATCH: i64 = 50;

/// Bonus for all titles matching exactly.
const TITLES_MATCH: i64 = 80;

/// Bonus for all subtitles matching exactly.
const SUBTITLES_MATCH: i64 = 20;

/// Bonus for structurally equal bodies.
const BODIES_MATCH: i64 = 160;

/// Similarity between two slides.
///
/// Returns [`IDENTICAL`] when the slides are structurally equal on all
/// rendered fields, 0 when the layouts differ or either is empty, and a
/// weighted component sum otherwise.
pub fn get_similarity(a: &Slide, b: &Slide, opts: &MatchOptions) -> i64 {
    if renders_equal(a, b, opts) {
        return IDENTICAL;
    }
    if a.layout != b.layout || a.layout.is_empty() || b.layout.is_empty() {
        return 0;
    }

    let mut score = LAYOUT_MATCH;
    if a.titles == b.titles {
        score += TITLES_MATCH;
    }
    if a.subtitles == b.subtitles {
        score += SUBTITLES_MATCH;
    }
    if a.bodies == b.bodies {
        score += BODIES_MATCH;
    }
    score
}

/// Similarity plus a position bonus for the assignment mapper.
///
/// The bonus is deliberately asymmetric: a slide staying in place gets
/// +8, moving later +4, moving earlier +6, so equally plausible
/// assignments break ties toward source order.
pub fn get_similarity_for_mapping(
    a: &Slide,
    b: &Slide,
    i: usize,
    j: usize,
    opts: &MatchOptions,
) -> i64 {
    let bonus = if i == j {
        8
    } else if i < j {
        4
    } else {
        6
    };
    get_similarity(a, b, opts) + bonus
}

/// Structural equality on all rendered fields.
///
/// Layout, titles, subtitles, bodies, images by equivalence, block
/// quotes, tables and the speaker note. The `freeze`/`skip` flags and
/// planner markers are not rendered content.
pub fn renders_equal(a: &Slide, b: &Slide, opts: &MatchOptions) -> bool {
    a.layout == b.layout
        && a.titles == b.titles
        && a.subtitles == b.subtitles
        && a.bodies == b.bodies
        && images_equivalent(a, b, opts)
        && a.block_quotes == b.block_quotes
        && a.tables == b.tables
        && a.speaker_note == b.speaker_note
}

fn images_equivalent(a: &Slide, b: &Slide, opts: &MatchOptions) -> bool {
    a.images.len() == b.images.len()
        && a.images
            .iter()
            .zip(b.images.iter())
            .all(|(x, y)| x.equivalent(y, opts))
}

// =============================================================================
// Tests
// =============================================================================
