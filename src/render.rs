//! Incremental reconciliation of a sequence facet onto a render-tree
//! backend: one mounted slot per index, minimal mount/unmount churn, and no
//! output-tree diffing — a slot re-renders only when its own item fails its
//! equality check.

use std::{
    cell::{Cell, RefCell},
    rc::{Rc, Weak},
};

use crate::{
    core::{self, BindSink, NotifyLevel, SourceBinding, Task},
    equality,
    facet::{Facet, FacetNode},
    subscription::Subscription,
    writable::ValueNode,
};

/// Boundary to whatever turns rendered output into visible UI.
///
/// The reconciler guarantees `unmount` is called for every slot it ever
/// mounted — at shrink time for removed indices, and for all remaining
/// slots when the subscription returned by [`render_list`] is dropped —
/// before it considers the slot's resources reclaimed.
pub trait RenderBackend<T>: 'static {
    /// What the render function produces.
    type Output;
    /// The backend's receipt for one mounted slot.
    type Handle;

    fn mount(&mut self, index: usize, output: Self::Output) -> Self::Handle;
    fn unmount(&mut self, index: usize, handle: Self::Handle);
}

/// Renders a sequence facet through `backend`, one slot per index.
///
/// `render` runs once per slot lifetime, receiving the slot's item facet
/// and index. On each sequence update of length `n` against the previous
/// `m`: indices `[m, n)` are rendered and mounted, indices `[n, m)` are
/// unmounted back to front, and every surviving index is fed the new raw
/// item through its slot facet — the item comparator (here: `==`) decides
/// whether anything downstream of that slot re-renders.
///
/// Identity is index-based. Reordering items without a key discipline
/// redistributes values over existing slots; per-slot state then follows
/// the index, not the logical item. That is the documented contract.
///
/// An unset sequence facet renders zero slots.
pub fn render_list<T, B>(
    source: &Facet<Vec<T>>,
    backend: B,
    render: impl FnMut(&Facet<T>, usize) -> B::Output + 'static,
) -> Subscription
where
    T: PartialEq + Clone + 'static,
    B: RenderBackend<T>,
{
    render_list_with_equality(source, backend, render, equality::strict::<T>)
}

/// [`render_list`] with an explicit comparator factory; each slot gets its
/// own comparator instance.
pub fn render_list_with_equality<T, B, C>(
    source: &Facet<Vec<T>>,
    backend: B,
    render: impl FnMut(&Facet<T>, usize) -> B::Output + 'static,
    make_item_equality: impl Fn() -> C + 'static,
) -> Subscription
where
    T: Clone + 'static,
    B: RenderBackend<T>,
    C: FnMut(&T) -> bool + 'static,
{
    core::batch(|| {
        let node = RenderListNode::new(source, backend, render, make_item_equality);
        node.reconcile();
        Subscription::from_rc(node)
    })
}

struct RenderSlot<T: 'static, H> {
    item: Rc<ValueNode<T>>,
    handle: H,
}

struct RenderListNode<T, B, RF, EF, C>
where
    T: Clone + 'static,
    B: RenderBackend<T>,
    RF: FnMut(&Facet<T>, usize) -> B::Output + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    source: Facet<Vec<T>>,
    binding: RefCell<Option<SourceBinding>>,
    backend: RefCell<B>,
    render: RefCell<RF>,
    make_item_equality: EF,
    slots: RefCell<Vec<RenderSlot<T, B::Handle>>>,
    scheduled: Cell<bool>,
}

impl<T, B, RF, EF, C> RenderListNode<T, B, RF, EF, C>
where
    T: Clone + 'static,
    B: RenderBackend<T>,
    RF: FnMut(&Facet<T>, usize) -> B::Output + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn new(source: &Facet<Vec<T>>, backend: B, render: RF, make_item_equality: EF) -> Rc<Self> {
        Rc::new_cyclic(|this: &Weak<Self>| {
            let binding =
                SourceBinding::new(source.source(), this.clone() as Weak<dyn BindSink>);
            RenderListNode {
                source: source.clone(),
                binding: RefCell::new(Some(binding)),
                backend: RefCell::new(backend),
                render: RefCell::new(render),
                make_item_equality,
                slots: RefCell::new(Vec::new()),
                scheduled: Cell::new(false),
            }
        })
    }

    fn reconcile(self: &Rc<Self>) {
        let items = self.source.get().unwrap_or_default();
        let next_len = items.len();

        // Surviving indices: push the raw item through the slot facet and
        // let its comparator decide whether the slot re-renders.
        {
            let slots = self.slots.borrow();
            for (slot, item) in slots.iter().zip(&items) {
                slot.item.store(item.clone());
            }
        }

        // Grow: one render and one mount per new index.
        let mounted = self.slots.borrow().len();
        for (index, item) in items.into_iter().enumerate().skip(mounted) {
            let item_node = ValueNode::seeded(item, Box::new((self.make_item_equality)()));
            let facet = Facet::from_node(item_node.clone() as Rc<dyn FacetNode<Value = T>>);
            let output = (&mut *self.render.borrow_mut())(&facet, index);
            let handle = self.backend.borrow_mut().mount(index, output);
            self.slots.borrow_mut().push(RenderSlot {
                item: item_node,
                handle,
            });
        }

        // Shrink: unmount removed indices back to front.
        loop {
            let popped = {
                let mut slots = self.slots.borrow_mut();
                if slots.len() <= next_len {
                    break;
                }
                slots.pop().map(|slot| (slots.len(), slot))
            };
            if let Some((index, slot)) = popped {
                self.backend.borrow_mut().unmount(index, slot.handle);
            }
        }
    }
}

impl<T, B, RF, EF, C> BindSink for RenderListNode<T, B, RF, EF, C>
where
    T: Clone + 'static,
    B: RenderBackend<T>,
    RF: FnMut(&Facet<T>, usize) -> B::Output + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn notify(self: Rc<Self>, _level: NotifyLevel) {
        if !self.scheduled.replace(true) {
            core::schedule(Rc::downgrade(&self) as Weak<dyn Task>);
        }
    }
}

impl<T, B, RF, EF, C> Task for RenderListNode<T, B, RF, EF, C>
where
    T: Clone + 'static,
    B: RenderBackend<T>,
    RF: FnMut(&Facet<T>, usize) -> B::Output + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn run(self: Rc<Self>) {
        self.scheduled.set(false);
        let changed = {
            let binding = self.binding.borrow();
            binding.as_ref().is_some_and(SourceBinding::check)
        };
        if changed {
            self.reconcile();
        }
    }
}

impl<T, B, RF, EF, C> Drop for RenderListNode<T, B, RF, EF, C>
where
    T: Clone + 'static,
    B: RenderBackend<T>,
    RF: FnMut(&Facet<T>, usize) -> B::Output + 'static,
    EF: Fn() -> C + 'static,
    C: FnMut(&T) -> bool + 'static,
{
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get_mut().take() {
            binding.unbind();
        }
        let backend = self.backend.get_mut();
        for (index, slot) in self.slots.get_mut().drain(..).enumerate().rev() {
            backend.unmount(index, slot.handle);
        }
    }
}
