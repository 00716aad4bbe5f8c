//! Planner properties and the concrete reordering scenarios.
//!
//! Property checks use the independent emulator from `test_utils`, not
//! the executor, so a planner bug cannot be masked by a matching
//! executor bug.

use deck_sync::model::image::MatchOptions;
use deck_sync::plan::Strategy;
use deck_sync::{
    adjust_slide_count, convert_to_slide, generate_actions, generate_actions_with, get_similarity,
    map_slides, Action, Slide, IDENTICAL,
};

use super::test_utils::{body_slide, deck, emulate, mock_pair, slide, titles};

fn plan(before: &[Slide], after: &[Slide]) -> Vec<Action> {
    generate_actions(before, after, &MatchOptions::default()).unwrap()
}

/// Property 1: applying the plan to before yields after.
fn assert_transforms(before: &[Slide], after: &[Slide]) {
    let actions = plan(before, after);
    let result = emulate(before, &actions);
    assert_eq!(
        titles(&result),
        titles(after),
        "plan {:?} does not transform {:?} into {:?}",
        actions.iter().map(Action::describe).collect::<Vec<_>>(),
        titles(before),
        titles(after),
    );
}

#[test]
fn test_transformation_property_over_assorted_pairs() {
    let cases: Vec<(Vec<&str>, Vec<&str>)> = vec![
        (vec![], vec![]),
        (vec![], vec!["A"]),
        (vec!["A"], vec![]),
        (vec!["A"], vec!["A"]),
        (vec!["A", "B"], vec!["B", "A"]),
        (vec!["A", "B", "C"], vec!["C", "A", "B"]),
        (vec!["A", "B", "C", "D"], vec!["D", "B", "A", "C"]),
        (vec!["1", "2", "3", "4", "5"], vec!["NA", "2", "NB", "4"]),
        (vec!["A", "A", "B", "A"], vec!["A", "B", "A", "A"]),
        (vec!["A", "B"], vec!["X", "Y", "Z"]),
        (vec!["A", "B", "C", "D", "E"], vec!["E", "D", "C", "B", "A"]),
        (vec!["A", "B", "C"], vec!["B"]),
        (vec!["X"], vec!["A", "X", "B"]),
        (vec!["A", "B", "B", "A"], vec!["B", "A", "A", "B"]),
    ];
    for (before, after) in cases {
        assert_transforms(&deck(&before), &deck(&after));
    }
}

#[test]
fn test_transformation_property_with_greedy_fallback() {
    let before = deck(&["A", "B", "C", "D", "E"]);
    let after = deck(&["E", "C", "X", "A"]);
    let actions =
        generate_actions_with(&before, &after, &MatchOptions::default(), Strategy::Greedy)
            .unwrap();
    assert_eq!(titles(&emulate(&before, &actions)), titles(&after));
}

/// Property 2: no Update action pairs identical slides.
#[test]
fn test_no_update_on_identical_slides() {
    let opts = MatchOptions::default();
    let before = deck(&["A", "B", "C", "D"]);
    let after = deck(&["D", "C", "B", "A"]);

    let actions = plan(&before, &after);
    let mut current = before.clone();
    for action in &actions {
        if let Action::Update { index, slide } = action {
            assert!(
                get_similarity(&current[*index], slide, &opts) < IDENTICAL,
                "update at {index} pairs identical slides"
            );
        }
        current = emulate(&current, std::slice::from_ref(action));
    }
}

/// Property 3: planning never mutates its inputs.
#[test]
fn test_inputs_unchanged_by_planning() {
    let before = vec![
        slide("A"),
        body_slide("B", &["line one", "line two"]),
        slide("C"),
    ];
    let after = vec![body_slide("B", &["line one"]), slide("D")];
    let before_snapshot = before.clone();
    let after_snapshot = after.clone();

    let _ = plan(&before, &after);

    assert_eq!(before, before_snapshot);
    assert_eq!(after, after_snapshot);
}

/// Property 4: equalization squares the lengths and mapping is a
/// bijection over the full index range.
#[test]
fn test_equalization_and_mapping_bijection() {
    let opts = MatchOptions::default();
    let before = deck(&["A", "B", "C", "D", "E"]);
    let after = deck(&["C", "X"]);

    let (b, a) = adjust_slide_count(&before, &after, &opts);
    assert_eq!(b.len(), a.len());
    assert_eq!(b.len(), 5);

    let mapping = map_slides(&b, &a, &opts).unwrap();
    assert_eq!(mapping.len(), 5);
    let mut covered = vec![false; 5];
    for (&i, &j) in &mapping {
        assert!(i < 5 && j < 5);
        assert!(!covered[j], "after index {j} covered twice");
        covered[j] = true;
    }
    assert!(covered.into_iter().all(|c| c));
}

/// Property 5 rides inside the emulator: every index is validated at
/// the moment of application. Exercise it over a churny pair.
#[test]
fn test_indices_valid_throughout_application() {
    let before = deck(&["A", "B", "C", "D", "E", "F"]);
    let after = deck(&["F", "X", "B", "Y"]);
    let actions = plan(&before, &after);
    // Panics inside emulate on any out-of-range index.
    let result = emulate(&before, &actions);
    assert_eq!(titles(&result), titles(&after));
}

/// Property 7: a snapshot-converted deck diffed against itself plans
/// nothing.
#[tokio::test]
async fn test_converted_snapshot_self_diff_is_empty() {
    let (remote, _uploader) = mock_pair();
    remote.seed_title_pages(&["Intro", "Middle", "End"]);

    let presentation = deck_sync::RemoteSlides::presentation(remote.as_ref())
        .await
        .unwrap();
    let converted: Vec<Slide> = presentation
        .slides
        .iter()
        .map(|p| convert_to_slide(p, &presentation))
        .collect();

    let actions = plan(&converted, &converted.clone());
    assert!(actions.is_empty(), "got {actions:?}");
}

// =============================================================================
// Concrete scenarios
// =============================================================================

#[test]
fn test_scenario_append_into_empty_deck() {
    let actions = plan(&deck(&[]), &deck(&["A"]));
    assert_eq!(actions.len(), 1);
    assert!(matches!(&actions[0], Action::Append { slide } if slide.titles[0] == "A"));
}

#[test]
fn test_scenario_delete_last_slide() {
    let actions = plan(&deck(&["A"]), &deck(&[]));
    assert_eq!(actions, vec![Action::Delete { index: 0 }]);
}

#[test]
fn test_scenario_swap_two() {
    let actions = plan(&deck(&["A", "B"]), &deck(&["B", "A"]));
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        Action::Move {
            index: 1,
            move_to: 0,
            ..
        }
    ));
}

#[test]
fn test_scenario_rotate_three() {
    let actions = plan(&deck(&["A", "B", "C"]), &deck(&["C", "A", "B"]));
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        Action::Move {
            index: 2,
            move_to: 0,
            ..
        }
    ));
}

#[test]
fn test_scenario_double_move() {
    let actions = plan(&deck(&["A", "B", "C", "D"]), &deck(&["D", "B", "A", "C"]));
    assert_eq!(actions.len(), 2);
    assert!(matches!(
        actions[0],
        Action::Move {
            index: 3,
            move_to: 0,
            ..
        }
    ));
    assert!(matches!(
        actions[1],
        Action::Move {
            index: 2,
            move_to: 1,
            ..
        }
    ));
}

#[test]
fn test_scenario_delete_and_rewrite() {
    let before = deck(&["1", "2", "3", "4", "5"]);
    let after = deck(&["NA", "2", "NB", "4"]);
    let actions = plan(&before, &after);

    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0], Action::Delete { index: 4 });
    let updates: Vec<(usize, &str)> = actions[1..]
        .iter()
        .filter_map(|a| match a {
            Action::Update { index, slide } => Some((*index, slide.titles[0].as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![(0, "NA"), (2, "NB")]);
    assert_eq!(titles(&emulate(&before, &actions)), titles(&after));
}

#[test]
fn test_scenario_duplicate_titles_single_move() {
    let actions = plan(&deck(&["A", "A", "B", "A"]), &deck(&["A", "B", "A", "A"]));
    assert_eq!(actions.len(), 1);
    assert!(matches!(
        actions[0],
        Action::Move {
            index: 2,
            move_to: 1,
            ..
        }
    ));
}

#[test]
fn test_frozen_slide_is_never_updated() {
    let before = deck(&["A", "B"]);
    let mut after = deck(&["A", "B-changed"]);
    after[1].freeze = true;

    let actions = plan(&before, &after);
    assert!(
        actions.is_empty(),
        "frozen slide produced actions: {actions:?}"
    );
}

#[test]
fn test_body_change_produces_update_not_churn() {
    let before = vec![slide("A"), body_slide("B", &["old"])];
    let after = vec![slide("A"), body_slide("B", &["new"])];

    let actions = plan(&before, &after);
    assert_eq!(actions.len(), 1);
    assert!(matches!(actions[0], Action::Update { index: 1, .. }));
}
