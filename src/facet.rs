use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use derive_ex::derive_ex;

use crate::{
    core::{self, BindKey, BindSink, BindSource, NotifyLevel, Task},
    derive, equality,
    stream::{self, FacetStream},
    subscription::Subscription,
};

/// A node a [`Facet`] handle points at.
///
/// Implementations are the root container, derived nodes, and the per-item
/// nodes of the list operators. Everything else consumes facets through the
/// handle.
pub(crate) trait FacetNode: BindSource {
    type Value: 'static;

    /// Calls `read` with the current value, or not at all while unset.
    /// Active derived nodes settle themselves before answering.
    fn read(self: Rc<Self>, read: &mut dyn FnMut(&Self::Value));
}

/// Readable, observable handle to a reactive value.
///
/// Handles are cheap to clone and all clones address the same node. A facet
/// that has never produced a value is *unset*: `get` returns `None` and
/// observers stay silent until a real value arrives.
#[derive_ex(Clone, bound())]
pub struct Facet<T: 'static>(Rc<dyn FacetNode<Value = T>>);

impl<T: 'static> Facet<T> {
    pub(crate) fn from_node(node: Rc<dyn FacetNode<Value = T>>) -> Self {
        Facet(node)
    }
    pub(crate) fn source(&self) -> Rc<dyn BindSource> {
        self.0.clone()
    }

    /// Current value, or `None` while unset.
    pub fn get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.with_value(T::clone)
    }

    /// Borrowed read without cloning; returns `None` while unset.
    pub fn with_value<U>(&self, f: impl FnOnce(&T) -> U) -> Option<U> {
        // Reads run as a pass: pulling a derived chain up to date may
        // schedule deliveries, which then flush before this returns.
        core::batch(|| {
            let mut f = Some(f);
            let mut out = None;
            self.0.clone().read(&mut |value| {
                if let Some(f) = f.take() {
                    out = Some(f(value));
                }
            });
            out
        })
    }

    /// Registers `on_value` and delivers the current value synchronously
    /// unless the facet is unset. Every later delivery happens before the
    /// mutation that caused it returns. Observers registered earlier are
    /// always delivered to first.
    ///
    /// Dropping the returned guard unsubscribes; an observer that does so
    /// during a propagation pass is not delivered to again in that pass.
    pub fn observe(&self, on_value: impl FnMut(&T) + 'static) -> Subscription {
        core::batch(|| {
            let node = ObserverNode::new(self.0.clone(), Box::new(on_value));
            node.deliver();
            Subscription::from_rc(node)
        })
    }

    /// Derives a facet through a pure transform. The transform reruns on
    /// every source change; delivery downstream is suppressed when the
    /// result compares equal to the previously delivered one.
    pub fn map<U>(&self, f: impl Fn(&T) -> U + 'static) -> Facet<U>
    where
        U: PartialEq + Clone + 'static,
    {
        self.map_with_equality(f, equality::strict::<U>)
    }

    /// [`map`](Self::map) with an explicit comparator factory. The factory
    /// runs once per activation, so comparator state lives exactly as long
    /// as the subscription that needs it.
    pub fn map_with_equality<U, C>(
        &self,
        f: impl Fn(&T) -> U + 'static,
        make_equality: impl Fn() -> C + 'static,
    ) -> Facet<U>
    where
        U: 'static,
        C: FnMut(&U) -> bool + 'static,
    {
        derive::map(self, f, make_equality)
    }

    /// Bridges the facet onto an async consumer. The stream yields the
    /// current value immediately (unless unset) and then every delivered
    /// change; it never terminates on its own.
    pub fn to_stream(&self) -> FacetStream<T>
    where
        T: Clone,
    {
        stream::to_stream(self)
    }
}

/// Leaf sink carrying a user callback. It schedules itself when notified
/// and pulls the settled value at flush time, so one logical update invokes
/// the callback at most once.
struct ObserverNode<T: 'static> {
    source: Rc<dyn FacetNode<Value = T>>,
    key: Cell<Option<BindKey>>,
    on_value: RefCell<Box<dyn FnMut(&T)>>,
    scheduled: Cell<bool>,
}

impl<T: 'static> ObserverNode<T> {
    fn new(source: Rc<dyn FacetNode<Value = T>>, on_value: Box<dyn FnMut(&T)>) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let key = source.clone().attach(this.clone() as Weak<dyn BindSink>);
            ObserverNode {
                source,
                key: Cell::new(Some(key)),
                on_value: RefCell::new(on_value),
                scheduled: Cell::new(false),
            }
        })
    }

    fn deliver(self: &Rc<Self>) {
        let mut on_value = self.on_value.borrow_mut();
        self.source.clone().read(&mut |value| (*on_value)(value));
    }
}

impl<T: 'static> BindSink for ObserverNode<T> {
    fn notify(self: Rc<Self>, _level: NotifyLevel) {
        if !self.scheduled.replace(true) {
            core::schedule(Rc::downgrade(&self) as Weak<dyn Task>);
        }
    }
}

impl<T: 'static> Task for ObserverNode<T> {
    fn run(self: Rc<Self>) {
        self.scheduled.set(false);
        let Some(key) = self.key.get() else {
            return;
        };
        if self.source.clone().check(key) {
            self.deliver();
        }
    }
}

impl<T: 'static> Drop for ObserverNode<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.source.clone().detach(key);
        }
    }
}
