use std::rc::Rc;

use rstest::rstest;

use super::*;

#[test]
fn strict_first_call_is_different() {
    let mut eq = strict::<i32>();
    assert!(!eq(&1));
    assert!(eq(&1));
    assert!(!eq(&2));
    assert!(eq(&2));
}

#[rstest]
#[case(&[1, 2, 3], &[1, 2, 3], true)]
#[case(&[1, 2, 3], &[1, 2], false)]
#[case(&[1, 2, 3], &[1, 9, 3], false)]
#[case(&[], &[], true)]
fn shallow_vec_cases(#[case] first: &[i32], #[case] second: &[i32], #[case] same: bool) {
    let mut eq = shallow_vec::<i32>();
    assert!(!eq(&first.to_vec()));
    assert_eq!(eq(&second.to_vec()), same);
}

#[test]
fn shallow_vec_equal_on_fresh_allocation() {
    let mut eq = shallow_vec::<i32>();
    assert!(!eq(&vec![1, 2]));
    // A different allocation with the same elements is still "same".
    assert!(eq(&vec![1, 2]));
}

#[test]
fn shallow_vec_snapshot_updates_only_on_difference() {
    let mut eq = shallow_vec::<i32>();
    assert!(!eq(&vec![1]));
    assert!(!eq(&vec![2]));
    // The snapshot now holds [2]; [1] must read as different again.
    assert!(!eq(&vec![1]));
}

#[test]
fn identity_tracks_pointers_not_contents() {
    let a = Rc::new(10);
    let b = Rc::new(10);
    let mut eq = identity::<i32>();
    assert!(!eq(&a));
    assert!(eq(&a));
    assert!(!eq(&b));
}

#[test]
fn shallow_vec_identity_compares_each_pointer() {
    let a = Rc::new(1);
    let b = Rc::new(2);
    let mut eq = shallow_vec_identity::<i32>();
    assert!(!eq(&vec![a.clone(), b.clone()]));
    assert!(eq(&vec![a.clone(), b.clone()]));
    assert!(!eq(&vec![b, a]));
}

#[derive(Clone)]
struct Unit {
    id: u32,
    hp: u32,
    label: &'static str,
}

const UNIT_FIELDS: &[FieldEq<Unit>] = &[|a, b| a.id == b.id, |a, b| a.hp == b.hp];

#[test]
fn by_fields_checks_only_declared_fields() {
    let mut eq = by_fields(UNIT_FIELDS);
    let unit = Unit {
        id: 1,
        hp: 10,
        label: "alpha",
    };
    assert!(!eq(&unit));
    // `label` is not declared, so changing it is invisible.
    assert!(eq(&Unit {
        label: "beta",
        ..unit.clone()
    }));
    assert!(!eq(&Unit { hp: 9, ..unit }));
}

#[test]
fn vec_by_fields_compares_length_first() {
    let mut eq = vec_by_fields(UNIT_FIELDS);
    let one = Unit {
        id: 1,
        hp: 10,
        label: "alpha",
    };
    assert!(!eq(&vec![one.clone()]));
    assert!(eq(&vec![one.clone()]));
    assert!(!eq(&vec![one.clone(), one]));
}

#[rstest]
#[case(None, None, true)]
#[case(None, Some(1), false)]
#[case(Some(1), None, false)]
#[case(Some(1), Some(1), true)]
#[case(Some(1), Some(2), false)]
fn optional_cases(#[case] first: Option<i32>, #[case] second: Option<i32>, #[case] same: bool) {
    let mut eq = optional(strict::<i32>);
    assert!(!eq(&first));
    assert_eq!(eq(&second), same);
}

#[test]
fn optional_reseeds_inner_snapshot_across_absence() {
    let mut eq = optional(strict::<i32>);
    assert!(!eq(&Some(1)));
    assert!(!eq(&None));
    // Returning to the remembered inner value: the absence in between made
    // the transition different, but the snapshot still holds 1.
    assert!(!eq(&Some(1)));
    assert!(eq(&Some(1)));
}

#[test]
fn instances_from_one_factory_are_independent() {
    let mut a = strict::<i32>();
    let mut b = strict::<i32>();
    assert!(!a(&1));
    assert!(!b(&1));
    assert!(a(&1));
    assert!(b(&1));
}

#[test]
fn never_always_differs() {
    let mut eq = never::<i32>();
    assert!(!eq(&1));
    assert!(!eq(&1));
}
