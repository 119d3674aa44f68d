use std::{cell::Cell, rc::Rc};

use assert_call::{call, CallRecorder};
use facets::{map_items, map_keyed, Facet, Subscription, WritableFacet};

/// A per-row artifact whose lifetime mirrors its entry: watching the row's
/// facet while alive, reporting teardown on drop.
#[derive(Clone)]
struct Row {
    name: &'static str,
    _watch: Rc<Subscription>,
    _teardown: Rc<Teardown>,
}

struct Teardown(&'static str);
impl Drop for Teardown {
    fn drop(&mut self) {
        call!("teardown {}", self.0);
    }
}

fn row(name: &'static str, facet: &Facet<(&'static str, i32)>) -> Row {
    Row {
        name,
        _watch: Rc::new(facet.observe(move |(_, hp)| call!("render {name} {hp}"))),
        _teardown: Rc::new(Teardown(name)),
    }
}

#[test]
fn keyed_entries_are_created_once_per_key() {
    let mut cr = CallRecorder::new();
    let rows = WritableFacet::new(vec![("a", 1), ("b", 2)]);
    let mapped = map_keyed(&rows.facet(), |item| item.0, |facet, key| row(*key, facet));
    let _s = mapped.observe(|_| {});
    cr.verify(["render a 1", "render b 2"]);

    // "a" keeps its entry: only its changed value renders, at flush time.
    // "c" is new: its factory runs during the rebuild. "b" disappeared.
    rows.set(vec![("a", 5), ("c", 3)]);
    cr.verify(["render c 3", "teardown b", "render a 5"]);
}

#[test]
fn keyed_entry_survives_unchanged_item() {
    let mut cr = CallRecorder::new();
    let rows = WritableFacet::new(vec![("a", 1), ("b", 2)]);
    let mapped = map_keyed(&rows.facet(), |item| item.0, |facet, key| row(*key, facet));
    let _s = mapped.observe(|_| {});
    cr.verify(["render a 1", "render b 2"]);

    // The outer sequence was replaced, but both items are equal: nothing
    // re-renders and nothing is torn down.
    rows.set(vec![("a", 1), ("b", 2)]);
    cr.verify(());
}

#[test]
fn keyed_output_follows_input_order() {
    let mut cr = CallRecorder::new();
    let rows = WritableFacet::new(vec![("a", 1), ("b", 2)]);
    let mapped = map_keyed(
        &rows.facet(),
        |item| item.0,
        |facet, key| row(*key, facet),
    );
    let _s = mapped.observe(|_| {});
    cr.verify(["render a 1", "render b 2"]);
    let names = |items: &Vec<Row>| items.iter().map(|r| r.name).collect::<Vec<_>>();
    assert_eq!(mapped.with_value(names).unwrap(), ["a", "b"]);

    rows.set(vec![("b", 2), ("a", 1)]);
    assert_eq!(mapped.with_value(names).unwrap(), ["b", "a"]);
    // Reordering reused both entries; nothing rendered or tore down.
    cr.verify(());
}

#[test]
fn duplicate_keys_last_occurrence_wins() {
    let rows = WritableFacet::new(vec![("a", 1), ("a", 9)]);
    let mapped = map_keyed(&rows.facet(), |item| item.0, |facet, _key| facet.clone());
    let _s = mapped.observe(|_| {});

    let items = mapped.get().unwrap();
    assert_eq!(items.len(), 2);
    // Both positions render from the single "a" entry, holding the value
    // of the last occurrence.
    assert_eq!(items[0].get(), Some(("a", 9)));
    assert_eq!(items[1].get(), Some(("a", 9)));
}

#[test]
fn deactivated_keyed_mapping_releases_entries() {
    let mut cr = CallRecorder::new();
    let rows = WritableFacet::new(vec![("a", 1)]);
    let mapped = map_keyed(&rows.facet(), |item| item.0, |facet, key| row(*key, facet));
    let s = mapped.observe(|_| {});
    cr.verify("render a 1");

    drop(s);
    cr.verify("teardown a");

    // Re-observing rebuilds entries from the current sequence.
    let _s = mapped.observe(|_| {});
    cr.verify("render a 1");
}

#[test]
fn lightweight_mapping_recomputes_from_scratch() {
    let factory_runs = Rc::new(Cell::new(0));
    let rows = WritableFacet::new(vec![1, 2]);
    let mapped = map_items(&rows.facet(), {
        let factory_runs = factory_runs.clone();
        move |v| {
            factory_runs.set(factory_runs.get() + 1);
            v * 10
        }
    });
    let _s = mapped.observe(|_| {});
    assert_eq!(mapped.get(), Some(vec![10, 20]));
    assert_eq!(factory_runs.get(), 2);

    // No per-item reuse: every element is transformed again.
    rows.set(vec![1, 2, 3]);
    assert_eq!(mapped.get(), Some(vec![10, 20, 30]));
    assert_eq!(factory_runs.get(), 5);
}
