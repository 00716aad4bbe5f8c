//! The diff planner.
//!
//! Given a "before" slide sequence (the hosted presentation) and an
//! "after" sequence (the desired state), produce an ordered list of
//! primitive [`Action`]s whose application transforms before into after
//! with minimal remote churn.
//!
//! # Pipeline
//!
//! ```text
//! before, after
//!     │ equalize  - pad the shorter side with flagged surrogates
//!     ▼
//! before', after'         (equal length)
//!     │ map       - Hungarian assignment on the similarity matrix
//!     ▼
//! bijection before-index → after-index
//!     │ generate  - propagate deletes, emit deletes back-to-front,
//!     │             moves left-to-right, updates/appends left-to-right
//!     ▼
//! [Delete ..] [Move ..] [Update | Append ..]
//! ```
//!
//! Identical pairs (similarity at the 500 sentinel) produce no action at
//! all; that silent reuse is the whole point of the assignment step.

pub mod assign;
pub mod equalize;
pub mod similarity;

use std::collections::HashMap;

use tracing::debug;

use crate::error::PlanError;
use crate::model::image::MatchOptions;
use crate::model::Slide;

pub use assign::{map_slides, map_slides_with, Strategy};
pub use equalize::adjust_slide_count;
pub use similarity::{get_similarity, get_similarity_for_mapping, IDENTICAL};

// =============================================================================
// Actions
// =============================================================================

/// One primitive step of a plan.
///
/// Indices refer to the before sequence as it evolves while the plan is
/// applied: deletes renumber, moves relocate, appends go to the end.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create a new slide at the end of the deck with this content.
    Append { slide: Slide },

    /// Rewrite the slide at `index` to match `slide`.
    Update { index: usize, slide: Slide },

    /// Relocate the slide at `index` so it ends up at `move_to`.
    Move {
        index: usize,
        move_to: usize,
        slide: Slide,
    },

    /// Remove the slide at `index`.
    Delete { index: usize },
}

impl Action {
    /// Short human-readable form for logs.
    pub fn describe(&self) -> String {
        match self {
            Action::Append { .. } => "append".to_string(),
            Action::Update { index, .. } => format!("update {index}"),
            Action::Move { index, move_to, .. } => format!("move {index} -> {move_to}"),
            Action::Delete { index } => format!("delete {index}"),
        }
    }
}

// =============================================================================
// Plan generation
// =============================================================================

/// Compute the action list transforming `before` into `after`.
///
/// Neither input is mutated. Uses the default assignment strategy.
pub fn generate_actions(
    before: &[Slide],
    after: &[Slide],
    opts: &MatchOptions,
) -> Result<Vec<Action>, PlanError> {
    generate_actions_with(before, after, opts, Strategy::default())
}

/// [`generate_actions`] with an explicit assignment strategy.
pub fn generate_actions_with(
    before: &[Slide],
    after: &[Slide],
    opts: &MatchOptions,
    strategy: Strategy,
) -> Result<Vec<Action>, PlanError> {
    let (mut before, mut after) = adjust_slide_count(before, after, opts);
    let mut mapping = map_slides_with(&before, &after, opts, strategy)?;

    assert_surrogates_identical(&before, &after, &mapping, opts)?;

    let mut actions = Vec::new();

    // Phase 1: propagate delete flags onto the mapped before slides.
    for (&i, &j) in &mapping {
        if after[j].delete {
            before[i].delete = true;
        }
    }

    // Phase 2: emit deletes back-to-front, renumbering the mapping as
    // the local sequence shrinks so indices stay aligned with the
    // remote sequence while deletes are applied.
    for i in (0..before.len()).rev() {
        if !before[i].delete {
            continue;
        }
        actions.push(Action::Delete { index: i });
        before.remove(i);
        mapping.remove(&i);
        mapping = mapping
            .into_iter()
            .map(|(k, v)| if k > i { (k - 1, v) } else { (k, v) })
            .collect();
    }

    // Later phases must not see the delete surrogates in after; they are
    // a trailing block, so the remaining mapping values stay dense.
    after.retain(|s| !s.delete);
    debug_assert_eq!(before.len(), after.len());

    // Phase 3: emit moves left-to-right. Each move applies the same
    // positional arithmetic the remote performs when a single slide is
    // repositioned, and the mapping is re-derived to match.
    for j in 0..after.len() {
        let i = mapping
            .iter()
            .find(|&(_, &v)| v == j)
            .map(|(&k, _)| k)
            .ok_or_else(|| PlanError::MappingAssertion(format!("no slide maps to index {j}")))?;
        if i == j {
            continue;
        }

        actions.push(Action::Move {
            index: i,
            move_to: j,
            slide: after[j].clone_clean(),
        });

        let moved = before.remove(i);
        before.insert(j, moved);

        mapping = mapping
            .into_iter()
            .map(|(k, v)| {
                let k = if k == i {
                    j
                } else if i > j && k >= j && k < i {
                    k + 1
                } else if i < j && k > i && k <= j {
                    k - 1
                } else {
                    k
                };
                (k, v)
            })
            .collect();
    }

    // Phase 4: appends for the `new` surrogates, updates for changed
    // pairs, nothing for identical ones. Frozen slides are left alone.
    for i in 0..before.len() {
        if before[i].new {
            actions.push(Action::Append {
                slide: after[i].clone_clean(),
            });
        } else if !after[i].freeze && get_similarity(&before[i], &after[i], opts) < IDENTICAL {
            actions.push(Action::Update {
                index: i,
                slide: after[i].clone_clean(),
            });
        }
    }

    debug!(
        actions = actions.len(),
        "planned {}",
        actions
            .iter()
            .map(Action::describe)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(actions)
}

/// Post-equalization invariant: every `new`/`delete` surrogate must pair
/// with its source at the identical-score sentinel.
fn assert_surrogates_identical(
    before: &[Slide],
    after: &[Slide],
    mapping: &HashMap<usize, usize>,
    opts: &MatchOptions,
) -> Result<(), PlanError> {
    for (&i, &j) in mapping {
        let b = before
            .get(i)
            .ok_or_else(|| PlanError::MappingAssertion(format!("before index {i} out of range")))?;
        let a = after
            .get(j)
            .ok_or_else(|| PlanError::MappingAssertion(format!("after index {j} out of range")))?;
        if (b.new || a.delete) && get_similarity(b, a, opts) != IDENTICAL {
            return Err(PlanError::SurrogateNotIdentical { index: i });
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
