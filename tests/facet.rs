use std::{
    cell::Cell,
    panic::{catch_unwind, AssertUnwindSafe},
    rc::Rc,
};

use assert_call::{call, CallRecorder};
use facets::{batch, equality, WritableFacet};

#[test]
fn observe_delivers_current_value_synchronously() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(1);
    let _s = f.observe(|v| call!("{v}"));
    cr.verify("1");
}

#[test]
fn observe_on_unset_facet_stays_silent_until_first_value() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::<i32>::new_unset();
    let _s = f.observe(|v| call!("{v}"));
    cr.verify(());

    f.set(5);
    cr.verify("5");
}

#[test]
fn observers_run_in_registration_order() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(0);
    let _a = f.observe(|v| call!("a {v}"));
    let _b = f.observe(|v| call!("b {v}"));
    cr.verify(["a 0", "b 0"]);

    f.set(1);
    cr.verify(["a 1", "b 1"]);
}

#[test]
fn setting_the_same_value_twice_notifies_once() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(0);
    let _s = f.observe(|v| call!("{v}"));
    cr.verify("0");

    f.set(7);
    f.set(7);
    cr.verify("7");
}

#[test]
fn shallow_equal_replacement_is_suppressed() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::with_equality(vec![1, 2], equality::shallow_vec);
    let _s = f.observe(|v: &Vec<i32>| call!("{v:?}"));
    cr.verify("[1, 2]");

    // A different allocation with equal elements does not propagate.
    f.set(vec![1, 2]);
    cr.verify(());

    f.set(vec![1, 2, 3]);
    cr.verify("[1, 2, 3]");
}

#[test]
fn dropping_the_subscription_stops_delivery() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(0);
    let s = f.observe(|v| call!("{v}"));
    cr.verify("0");

    drop(s);
    f.set(1);
    cr.verify(());
}

#[test]
fn unsubscribing_during_a_pass_suppresses_that_observer() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(0);
    let second: Rc<Cell<Option<facets::Subscription>>> = Rc::new(Cell::new(None));
    let _a = f.observe({
        let second = second.clone();
        move |v| {
            call!("a {v}");
            // Cancel the later observer while the pass is delivering.
            second.take();
        }
    });
    let b = f.observe(|v| call!("b {v}"));
    cr.verify(["a 0", "b 0"]);

    second.set(Some(b));
    f.set(1);
    cr.verify("a 1");
}

#[test]
fn reentrant_set_is_deferred_and_fifo() {
    let mut cr = CallRecorder::new();
    let first = WritableFacet::new(0);
    let second = WritableFacet::new(0);

    let _cascade = first.observe({
        let second = second.clone();
        move |v| {
            call!("first {v}");
            if *v == 1 {
                second.set(10);
                second.set(20);
                call!("first done");
            }
        }
    });
    let _watch = second.observe(|v| call!("second {v}"));
    cr.verify(["first 0", "second 0"]);

    first.set(1);
    cr.verify(["first 1", "first done", "second 10", "second 20"]);
}

#[test]
fn batch_coalesces_into_one_pass() {
    let mut cr = CallRecorder::new();
    let a = WritableFacet::new(0);
    let b = WritableFacet::new(0);
    let _oa = a.observe(|v| call!("a {v}"));
    let _ob = b.observe(|v| call!("b {v}"));
    cr.verify(["a 0", "b 0"]);

    batch(|| {
        a.set(1);
        b.set(2);
        a.set(3);
        call!("batched");
    });
    // One delivery per facet, with the final values.
    cr.verify(["batched", "a 3", "b 2"]);
}

#[test]
fn panicking_observer_does_not_starve_the_rest() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(0);
    let _a = f.observe(|v| {
        if *v > 0 {
            panic!("observer failure");
        }
        call!("a {v}");
    });
    let _b = f.observe(|v| call!("b {v}"));
    cr.verify(["a 0", "b 0"]);

    let result = catch_unwind(AssertUnwindSafe(|| f.set(1)));
    assert!(result.is_err());
    // The sibling observer still received the update, and the graph
    // continues to work afterwards.
    cr.verify("b 1");
    f.set(0);
    cr.verify(["a 0", "b 0"]);
}

#[test]
fn update_handles_unset_and_chains() {
    let f = WritableFacet::<i32>::new_unset();
    f.update(|prev| prev.copied().unwrap_or(100));
    f.update(|prev| prev.copied().unwrap_or(0) + 1);
    assert_eq!(f.get(), Some(101));
}

#[test]
fn observers_keep_the_graph_alive_without_handles() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(1);
    let mapped = f.facet().map(|v| v * 2);
    let s = mapped.observe(|v| call!("{v}"));
    drop(mapped);
    cr.verify("2");

    f.set(2);
    cr.verify("4");
    drop(s);
}

#[test]
fn observing_from_inside_an_observer_works() {
    let mut cr = CallRecorder::new();
    let f = WritableFacet::new(1);
    let g = WritableFacet::new(10);
    let nested: Rc<Cell<Option<facets::Subscription>>> = Rc::new(Cell::new(None));
    let _s = f.observe({
        let g = g.clone();
        let nested = nested.clone();
        move |v| {
            call!("f {v}");
            if *v == 2 {
                nested.set(Some(g.observe(|w| call!("g {w}"))));
            }
        }
    });
    cr.verify("f 1");

    f.set(2);
    cr.verify(["f 2", "g 10"]);

    g.set(11);
    cr.verify("g 11");
}
