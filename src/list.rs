//! Operators mapping a facet of a sequence to a sequence of derived
//! results, one per item.
//!
//! [`map_keyed`] is the cached variant: per-item state survives sequence
//! updates as long as the item's key stays present. [`map_items`] is the
//! lightweight variant: it rebuilds the mapped sequence on every change and
//! keeps no per-item state.

use std::{
    cell::RefCell,
    collections::HashMap,
    hash::Hash,
    mem::take,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use crate::{
    core::{BindKey, BindSink, BindSource, Dirty, NotifyLevel, SinkBindings, SourceBinding},
    equality,
    facet::{Facet, FacetNode},
    writable::ValueNode,
};


/// Maps a sequence facet through a per-item factory, keyed by `key_of`.
///
/// On every sequence update, entries whose key is still present are reused:
/// the new item value is fed through the existing per-item facet (its
/// comparator decides whether anything downstream re-renders) and the
/// factory is *not* called again. Entries for new keys are created, entries
/// for disappeared keys are dropped, which runs any teardown owned by the
/// factory's result. Output order follows the input sequence.
///
/// Duplicate keys within one sequence value violate the keying contract;
/// the deterministic policy is that the last occurrence wins: all positions
/// with that key render from one entry holding the last occurrence's value.
///
/// The mapped facet is demand-driven only while observed; while it has no
/// consumers it reads as unset and holds no entries.
pub fn map_keyed<T, K, R>(
    source: &Facet<Vec<T>>,
    key_of: impl Fn(&T) -> K + 'static,
    factory: impl FnMut(&Facet<T>, &K) -> R + 'static,
) -> Facet<Vec<R>>
where
    T: PartialEq + Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
{
    map_keyed_with_equality(source, key_of, factory, equality::strict::<T>)
}

/// [`map_keyed`] with an explicit comparator factory for the per-item
/// facets. The factory runs once per entry, so each entry's comparator
/// state is its own.
pub fn map_keyed_with_equality<T, K, R, C>(
    source: &Facet<Vec<T>>,
    key_of: impl Fn(&T) -> K + 'static,
    factory: impl FnMut(&Facet<T>, &K) -> R + 'static,
    make_item_equality: impl Fn() -> C + 'static,
) -> Facet<Vec<R>>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    Facet::from_node(KeyedListNode::new(
        source,
        key_of,
        factory,
        make_item_equality,
    ))
}

/// Maps a sequence facet element-wise with no persistent per-item state.
///
/// The whole mapped sequence is rebuilt on every source change; delivery is
/// suppressed when the result is element-wise equal to the previous one.
/// Cheaper than [`map_keyed`] when per-item identity does not matter.
pub fn map_items<T, U>(source: &Facet<Vec<T>>, f: impl Fn(&T) -> U + 'static) -> Facet<Vec<U>>
where
    T: 'static,
    U: PartialEq + Clone + 'static,
{
    source.map_with_equality(
        move |items: &Vec<T>| items.iter().map(&f).collect(),
        equality::shallow_vec::<U>,
    )
}

struct KeyedEntry<T: 'static, R> {
    item: Rc<ValueNode<T>>,
    result: R,
}

struct KeyedState<T: 'static, K, R> {
    entries: HashMap<K, KeyedEntry<T, R>>,
    value: Option<Vec<R>>,
    dirty: Dirty,
    binding: Option<SourceBinding>,
}

struct KeyedListNode<T, K, R, KF, FF, EF, C>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
    KF: Fn(&T) -> K + 'static,
    FF: FnMut(&Facet<T>, &K) -> R + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    source: Facet<Vec<T>>,
    key_of: KF,
    factory: RefCell<FF>,
    make_item_equality: EF,
    state: RefCell<KeyedState<T, K, R>>,
    sinks: RefCell<SinkBindings>,
}

impl<T, K, R, KF, FF, EF, C> KeyedListNode<T, K, R, KF, FF, EF, C>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
    KF: Fn(&T) -> K + 'static,
    FF: FnMut(&Facet<T>, &K) -> R + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn new(source: &Facet<Vec<T>>, key_of: KF, factory: FF, make_item_equality: EF) -> Rc<Self> {
        Rc::new(KeyedListNode {
            source: source.clone(),
            key_of,
            factory: RefCell::new(factory),
            make_item_equality,
            state: RefCell::new(KeyedState {
                entries: HashMap::new(),
                value: None,
                dirty: Dirty::Clean,
                binding: None,
            }),
            sinks: RefCell::new(SinkBindings::new()),
        })
    }

    fn activate(self: &Rc<Self>) {
        let binding = SourceBinding::new(
            self.source.source(),
            Rc::downgrade(self) as Weak<dyn BindSink>,
        );
        let mut state = self.state.borrow_mut();
        state.binding = Some(binding);
        state.dirty = Dirty::Dirty;
    }

    fn deactivate(&self) {
        let (binding, entries) = {
            let mut state = self.state.borrow_mut();
            state.value = None;
            state.dirty = Dirty::Clean;
            (take(&mut state.binding), take(&mut state.entries))
        };
        // Entry drop runs the teardown owned by factory results.
        drop(entries);
        if let Some(binding) = binding {
            binding.unbind();
        }
    }

    fn update(self: &Rc<Self>) {
        let dirty = self.state.borrow().dirty;
        if dirty.is_clean() {
            return;
        }
        let edge = self
            .state
            .borrow()
            .binding
            .as_ref()
            .map(SourceBinding::parts);
        let source_changed = edge.is_some_and(|(source, key)| source.check(key));
        if dirty == Dirty::MaybeDirty && !source_changed {
            self.state.borrow_mut().dirty = Dirty::Clean;
            self.sinks.borrow_mut().settle(false);
            return;
        }

        let items = self.source.get();
        // A panicking factory reaches the mutating caller; the node settles
        // as "unchanged" first so later passes rebuild from scratch.
        let changed = match catch_unwind(AssertUnwindSafe(|| self.rebuild(items))) {
            Ok(changed) => changed,
            Err(payload) => {
                self.state.borrow_mut().dirty = Dirty::Clean;
                self.sinks.borrow_mut().settle(false);
                resume_unwind(payload);
            }
        };
        self.state.borrow_mut().dirty = Dirty::Clean;
        self.sinks.borrow_mut().settle(changed);
    }

    fn rebuild(self: &Rc<Self>, items: Option<Vec<T>>) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(items) = items else {
            let had_value = state.value.take().is_some();
            drop(take(&mut state.entries));
            return had_value;
        };
        let mut old = take(&mut state.entries);
        let mut entries = HashMap::with_capacity(items.len());
        let mut out = Vec::with_capacity(items.len());
        let mut factory = self.factory.borrow_mut();
        for item in &items {
            let key = (self.key_of)(item);
            if !entries.contains_key(&key) {
                let entry = old.remove(&key).unwrap_or_else(|| {
                    // The per-item facet starts out already holding the item,
                    // so the factory observes a set facet.
                    let item_node = ValueNode::seeded(
                        item.clone(),
                        Box::new((self.make_item_equality)()),
                    );
                    let facet = Facet::from_node(item_node.clone() as Rc<dyn FacetNode<Value = T>>);
                    let result = (&mut *factory)(&facet, &key);
                    KeyedEntry {
                        item: item_node,
                        result,
                    }
                });
                entries.insert(key.clone(), entry);
            }
            let entry = &entries[&key];
            entry.item.store(item.clone());
            out.push(entry.result.clone());
        }
        drop(old);
        state.entries = entries;
        state.value = Some(out);
        true
    }
}

impl<T, K, R, KF, FF, EF, C> BindSink for KeyedListNode<T, K, R, KF, FF, EF, C>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
    KF: Fn(&T) -> K + 'static,
    FF: FnMut(&Facet<T>, &K) -> R + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn notify(self: Rc<Self>, level: NotifyLevel) {
        let needs_forward = {
            let mut state = self.state.borrow_mut();
            let needs = state.dirty.needs_notify();
            state.dirty |= level;
            needs
        };
        if needs_forward {
            let targets = self.sinks.borrow_mut().mark(NotifyLevel::MaybeChanged);
            for sink in targets {
                sink.notify(NotifyLevel::MaybeChanged);
            }
        }
    }
}

impl<T, K, R, KF, FF, EF, C> BindSource for KeyedListNode<T, K, R, KF, FF, EF, C>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
    KF: Fn(&T) -> K + 'static,
    FF: FnMut(&Facet<T>, &K) -> R + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn attach(self: Rc<Self>, sink: Weak<dyn BindSink>) -> BindKey {
        let first = self.sinks.borrow().is_empty();
        let key = self.sinks.borrow_mut().attach(sink);
        if first {
            self.activate();
        }
        key
    }

    fn detach(self: Rc<Self>, key: BindKey) {
        let empty = {
            let mut sinks = self.sinks.borrow_mut();
            sinks.detach(key);
            sinks.is_empty()
        };
        if empty {
            self.deactivate();
        }
    }

    fn check(self: Rc<Self>, key: BindKey) -> bool {
        self.update();
        self.sinks.borrow_mut().take(key)
    }
}

impl<T, K, R, KF, FF, EF, C> FacetNode for KeyedListNode<T, K, R, KF, FF, EF, C>
where
    T: Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    R: Clone + 'static,
    KF: Fn(&T) -> K + 'static,
    FF: FnMut(&Facet<T>, &K) -> R + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    type Value = Vec<R>;

    fn read(self: Rc<Self>, read: &mut dyn FnMut(&Vec<R>)) {
        if self.sinks.borrow().is_empty() {
            return;
        }
        self.update();
        let state = self.state.borrow();
        if let Some(value) = state.value.as_ref() {
            read(value);
        }
    }
}
