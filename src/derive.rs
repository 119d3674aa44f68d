use std::{
    cell::RefCell,
    mem::take,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use crate::{
    core::{BindKey, BindSink, BindSource, Dirty, NotifyLevel, SinkBindings, SourceBinding},
    equality,
    facet::{Facet, FacetNode},
};


pub(crate) fn map<T, U, C>(
    source: &Facet<T>,
    f: impl Fn(&T) -> U + 'static,
    make_equality: impl Fn() -> C + 'static,
) -> Facet<U>
where
    T: 'static,
    U: 'static,
    C: FnMut(&U) -> bool + 'static,
{
    let src = source.clone();
    let compute = move || src.with_value(&f);
    Facet::from_node(DerivedNode::new(
        vec![source.source()],
        compute,
        make_equality,
    ))
}

macro_rules! combine_fns {
    ($(($combine:ident, $combine_eq:ident, $($T:ident $source:ident $value:ident),+));* $(;)?) => {
        $(
            /// Derives a facet from several sources through a pure transform,
            /// suppressing via `==` on the result. While any source is unset
            /// the derived facet is unset and the transform does not run.
            ///
            /// A single root mutation reaching this facet over several paths
            /// still recomputes and delivers at most once.
            pub fn $combine<$($T,)* U>(
                $($source: &Facet<$T>,)*
                f: impl Fn($(&$T,)*) -> U + 'static,
            ) -> Facet<U>
            where
                $($T: Clone + 'static,)*
                U: PartialEq + Clone + 'static,
            {
                $combine_eq($($source,)* f, equality::strict::<U>)
            }

            /// Multi-source derivation with an explicit comparator factory.
            pub fn $combine_eq<$($T,)* U, C>(
                $($source: &Facet<$T>,)*
                f: impl Fn($(&$T,)*) -> U + 'static,
                make_equality: impl Fn() -> C + 'static,
            ) -> Facet<U>
            where
                $($T: Clone + 'static,)*
                U: 'static,
                C: FnMut(&U) -> bool + 'static,
            {
                let sources = vec![$($source.source(),)*];
                $(let $source = $source.clone();)*
                let compute = move || {
                    $(let $value = $source.get()?;)*
                    Some(f($(&$value,)*))
                };
                Facet::from_node(DerivedNode::new(sources, compute, make_equality))
            }
        )*
    };
}

combine_fns!(
    (combine, combine_with_equality, A a va, B b vb);
    (combine3, combine3_with_equality, A a va, B b vb, C3 c vc);
    (combine4, combine4_with_equality, A a va, B b vb, C3 c vc, D d vd);
);

struct DerivedState<U, C> {
    value: Option<U>,
    equality: Option<C>,
    dirty: Dirty,
    bindings: Vec<SourceBinding>,
}

/// A facet computed from one or more sources.
///
/// The node is cold: it holds no source subscriptions and no cache until
/// its first sink attaches, and releases both when the last one detaches.
/// While active it follows the mark/settle discipline of [`crate::core`],
/// so a diamond-shaped graph recomputes it at most once per pass.
pub(crate) struct DerivedNode<U, F, EF, C>
where
    U: 'static,
    F: Fn() -> Option<U> + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&U) -> bool + 'static,
{
    sources: Vec<Rc<dyn BindSource>>,
    compute: F,
    make_equality: EF,
    state: RefCell<DerivedState<U, C>>,
    sinks: RefCell<SinkBindings>,
}

impl<U, F, EF, C> DerivedNode<U, F, EF, C>
where
    U: 'static,
    F: Fn() -> Option<U> + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&U) -> bool + 'static,
{
    pub fn new(sources: Vec<Rc<dyn BindSource>>, compute: F, make_equality: EF) -> Rc<Self> {
        Rc::new(DerivedNode {
            sources,
            compute,
            make_equality,
            state: RefCell::new(DerivedState {
                value: None,
                equality: None,
                dirty: Dirty::Clean,
                bindings: Vec::new(),
            }),
            sinks: RefCell::new(SinkBindings::new()),
        })
    }

    fn activate(self: &Rc<Self>) {
        let sink = Rc::downgrade(self) as Weak<dyn BindSink>;
        let bindings = self
            .sources
            .iter()
            .map(|source| SourceBinding::new(source.clone(), sink.clone()))
            .collect();
        let mut state = self.state.borrow_mut();
        state.bindings = bindings;
        state.equality = Some((self.make_equality)());
        state.value = None;
        state.dirty = Dirty::Dirty;
    }

    fn deactivate(&self) {
        let bindings = {
            let mut state = self.state.borrow_mut();
            state.equality = None;
            state.value = None;
            state.dirty = Dirty::Clean;
            take(&mut state.bindings)
        };
        for binding in bindings {
            binding.unbind();
        }
    }

    /// Brings the cache up to date and settles downstream edges. Runs the
    /// transform at most once per pass.
    fn update(self: &Rc<Self>) {
        let dirty = self.state.borrow().dirty;
        if dirty.is_clean() {
            return;
        }
        // Every source edge is consumed even after one already answered,
        // so later passes see settled edges.
        let edges: Vec<_> = self
            .state
            .borrow()
            .bindings
            .iter()
            .map(SourceBinding::parts)
            .collect();
        let mut any_changed = false;
        for (source, key) in edges {
            any_changed |= source.check(key);
        }
        if dirty == Dirty::MaybeDirty && !any_changed {
            self.state.borrow_mut().dirty = Dirty::Clean;
            self.sinks.borrow_mut().settle(false);
            return;
        }

        // A panicking transform reaches the mutating caller, but this node
        // settles as "unchanged" first so the graph stays consistent and
        // later passes propagate normally.
        let next = match catch_unwind(AssertUnwindSafe(&self.compute)) {
            Ok(next) => next,
            Err(payload) => {
                self.state.borrow_mut().dirty = Dirty::Clean;
                self.sinks.borrow_mut().settle(false);
                resume_unwind(payload);
            }
        };
        let mut state = self.state.borrow_mut();
        let changed = match &next {
            Some(value) => !state
                .equality
                .as_mut()
                .expect("active derived facet has a comparator")(value),
            None => false,
        };
        if changed {
            state.value = next;
        }
        state.dirty = Dirty::Clean;
        drop(state);
        self.sinks.borrow_mut().settle(changed);
    }
}

impl<U, F, EF, C> BindSink for DerivedNode<U, F, EF, C>
where
    U: 'static,
    F: Fn() -> Option<U> + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&U) -> bool + 'static,
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

impl<U, F, EF, C> BindSource for DerivedNode<U, F, EF, C>
where
    U: 'static,
    F: Fn() -> Option<U> + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&U) -> bool + 'static,
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

impl<U, F, EF, C> FacetNode for DerivedNode<U, F, EF, C>
where
    U: 'static,
    F: Fn() -> Option<U> + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&U) -> bool + 'static,
{
    type Value = U;

    fn read(self: Rc<Self>, read: &mut dyn FnMut(&U)) {
        if self.sinks.borrow().is_empty() {
            // Cold read: compute on demand without caching or subscribing.
            if let Some(value) = (self.compute)() {
                read(&value);
            }
            return;
        }
        self.update();
        let state = self.state.borrow();
        if let Some(value) = state.value.as_ref() {
            read(value);
        }
    }
}
