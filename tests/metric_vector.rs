//! Properties of the 3-slot metric selection vector.

use proptest::prelude::*;

use statpipe::stats::metric_vector;
use statpipe::stats::models::{selected_slots, METRIC_SLOTS};

#[test]
fn example_selection_from_the_submission_contract() {
    // Submitting metrics=[2] selects only the total-offers slot
    assert_eq!(metric_vector(&[2]).unwrap(), [0, 1, 0]);
}

#[test]
fn one_and_three_select_the_outer_slots() {
    assert_eq!(metric_vector(&[1, 3]).unwrap(), [1, 0, 1]);
}

proptest! {
    #[test]
    fn order_never_matters(mut selection in prop::collection::vec(1i32..=3, 1..10)) {
        let forward = metric_vector(&selection).unwrap();
        selection.reverse();
        let backward = metric_vector(&selection).unwrap();
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn duplicates_never_matter(selection in prop::collection::vec(1i32..=3, 1..10)) {
        let once = metric_vector(&selection).unwrap();

        let mut doubled = selection.clone();
        doubled.extend_from_slice(&selection);
        let twice = metric_vector(&doubled).unwrap();

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn selected_slots_inverts_the_vector(selection in prop::collection::vec(1i32..=3, 1..10)) {
        let vector = metric_vector(&selection).unwrap();
        let slots = selected_slots(&vector);

        let mut expected: Vec<usize> = selection.iter().map(|&i| i as usize).collect();
        expected.sort_unstable();
        expected.dedup();

        prop_assert_eq!(slots, expected);
    }

    #[test]
    fn out_of_range_indices_always_fail(index in prop_oneof![i32::MIN..=0, 4..=i32::MAX]) {
        prop_assert!(metric_vector(&[index]).is_err());
    }

    #[test]
    fn vectors_only_carry_flags(selection in prop::collection::vec(1i32..=3, 1..10)) {
        let vector = metric_vector(&selection).unwrap();
        prop_assert_eq!(vector.len(), METRIC_SLOTS);
        prop_assert!(vector.iter().all(|&flag| flag == 0 || flag == 1));
    }
}
