use std::{
    cell::RefCell,
    fmt,
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;
use serde::{Deserialize, Serialize};

use crate::{
    core::{self, BindKey, BindSink, BindSource, NotifyLevel, SinkBindings},
    equality,
    facet::{Facet, FacetNode},
    subscription::Subscription,
};


pub(crate) type BoxedEquality<T> = Box<dyn FnMut(&T) -> bool>;

/// Root settable container.
///
/// Mutations propagate synchronously: every currently registered consumer
/// reachable from this facet is delivered to before `set` returns. A
/// mutation issued from inside an observer is queued and applied, in FIFO
/// order, right after the in-progress pass.
///
/// The container starts unset when built with [`new_unset`](Self::new_unset)
/// and never returns to the unset state once a value is stored.
#[derive_ex(Clone, bound())]
pub struct WritableFacet<T: 'static>(Rc<ValueNode<T>>);

impl<T: PartialEq + Clone + 'static> WritableFacet<T> {
    /// A facet holding `initial`, suppressing via `==`.
    pub fn new(initial: T) -> Self {
        Self::with_equality(initial, equality::strict::<T>)
    }

    /// An unset facet suppressing via `==`.
    pub fn new_unset() -> Self {
        Self::unset_with_equality(equality::strict::<T>)
    }
}

impl<T: 'static> WritableFacet<T> {
    /// A facet holding `initial` with an explicit comparator factory.
    pub fn with_equality<C>(initial: T, make_equality: impl FnOnce() -> C) -> Self
    where
        C: FnMut(&T) -> bool + 'static,
    {
        WritableFacet(ValueNode::seeded(initial, Box::new(make_equality())))
    }

    /// An unset facet with an explicit comparator factory.
    pub fn unset_with_equality<C>(make_equality: impl FnOnce() -> C) -> Self
    where
        C: FnMut(&T) -> bool + 'static,
    {
        WritableFacet(ValueNode::new(None, Box::new(make_equality())))
    }

    /// Stores `value` and notifies observers, unless the comparator judges
    /// it equal to the last delivered value.
    pub fn set(&self, value: T) {
        let node = self.0.clone();
        core::update(move || {
            node.store(value);
        });
    }

    /// Computes the next value from the previous one. The updater receives
    /// `None` while the facet is unset and handles that case itself.
    pub fn update(&self, f: impl FnOnce(Option<&T>) -> T + 'static) {
        let node = self.0.clone();
        core::update(move || {
            node.store_with(f);
        });
    }

    /// Mutates the stored value in place. The comparator runs on the
    /// mutated value, so shallow snapshot comparators still detect the
    /// change. No-op while unset.
    pub fn mutate(&self, f: impl FnOnce(&mut T) + 'static) {
        let node = self.0.clone();
        core::update(move || {
            node.mutate_in_place(f);
        });
    }

    /// Current value, or `None` while unset.
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.facet().get()
    }

    /// See [`Facet::observe`].
    pub fn observe(&self, on_value: impl FnMut(&T) + 'static) -> Subscription {
        self.facet().observe(on_value)
    }

    /// The read-only handle feeding derivation and rendering.
    pub fn facet(&self) -> Facet<T> {
        Facet::from_node(self.0.clone())
    }
}

impl<T: Default + PartialEq + Clone + 'static> Default for WritableFacet<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for WritableFacet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.value.try_borrow() {
            Ok(value) => match &*value {
                Some(value) => fmt::Debug::fmt(value, f),
                None => f.write_str("<unset>"),
            },
            Err(_) => f.write_str("<borrowed>"),
        }
    }
}

impl<T> Serialize for WritableFacet<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        match self.0.value.try_borrow() {
            Ok(value) => Option::<T>::serialize(&*value, serializer),
            Err(_) => Err(serde::ser::Error::custom("borrowed")),
        }
    }
}

impl<'de, T> Deserialize<'de> for WritableFacet<T>
where
    T: Deserialize<'de> + PartialEq + Clone + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<WritableFacet<T>, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => WritableFacet::new(value),
            None => WritableFacet::new_unset(),
        })
    }
}

/// Storage node backing [`WritableFacet`] and the per-item facets of the
/// list operators.
pub(crate) struct ValueNode<T: 'static> {
    value: RefCell<Option<T>>,
    equality: RefCell<BoxedEquality<T>>,
    sinks: RefCell<SinkBindings>,
}

impl<T: 'static> ValueNode<T> {
    pub fn new(value: Option<T>, equality: BoxedEquality<T>) -> Rc<Self> {
        Rc::new(ValueNode {
            value: RefCell::new(value),
            equality: RefCell::new(equality),
            sinks: RefCell::new(SinkBindings::new()),
        })
    }

    /// A node holding `value` with the comparator snapshot already seeded,
    /// so feeding the same value back in is recognized as unchanged.
    pub fn seeded(value: T, mut equality: BoxedEquality<T>) -> Rc<Self> {
        let _ = equality(&value);
        Self::new(Some(value), equality)
    }

    /// Applies the comparator and, when the value is judged different,
    /// stores it and marks every downstream edge. Must run inside a pass.
    pub fn store(self: &Rc<Self>, value: T) -> bool {
        if (*self.equality.borrow_mut())(&value) {
            return false;
        }
        *self.value.borrow_mut() = Some(value);
        self.mark_changed();
        true
    }

    pub fn store_with(self: &Rc<Self>, f: impl FnOnce(Option<&T>) -> T) -> bool {
        let next = f(self.value.borrow().as_ref());
        self.store(next)
    }

    pub fn mutate_in_place(self: &Rc<Self>, f: impl FnOnce(&mut T)) -> bool {
        let changed = {
            let mut slot = self.value.borrow_mut();
            let Some(value) = slot.as_mut() else {
                return false;
            };
            f(value);
            !(*self.equality.borrow_mut())(value)
        };
        if changed {
            self.mark_changed();
        }
        changed
    }

    fn mark_changed(&self) {
        let targets = self.sinks.borrow_mut().mark(NotifyLevel::Changed);
        for sink in targets {
            sink.notify(NotifyLevel::Changed);
        }
    }
}

impl<T: 'static> BindSource for ValueNode<T> {
    fn attach(self: Rc<Self>, sink: Weak<dyn BindSink>) -> BindKey {
        self.sinks.borrow_mut().attach(sink)
    }
    fn detach(self: Rc<Self>, key: BindKey) {
        self.sinks.borrow_mut().detach(key);
    }
    fn check(self: Rc<Self>, key: BindKey) -> bool {
        self.sinks.borrow_mut().take(key)
    }
}

impl<T: 'static> FacetNode for ValueNode<T> {
    type Value = T;

    fn read(self: Rc<Self>, read: &mut dyn FnMut(&T)) {
        let value = self.value.borrow();
        if let Some(value) = value.as_ref() {
            read(value);
        }
    }
}
