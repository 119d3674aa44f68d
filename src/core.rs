use std::{
    any::Any,
    cell::{Cell, RefCell},
    cmp::max,
    collections::VecDeque,
    ops::{BitOr, BitOrAssign},
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    rc::{Rc, Weak},
};


/// Per-node and per-edge invalidation state.
///
/// `MaybeDirty` means an upstream value changed but an equality check in
/// between may still suppress the change. It is resolved to `Clean` or
/// `Dirty` when the node in between settles.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Dirty {
    Clean,
    MaybeDirty,
    Dirty,
}

impl Dirty {
    pub fn from_is_dirty(is_dirty: bool) -> Self {
        if is_dirty {
            Dirty::Dirty
        } else {
            Dirty::Clean
        }
    }
    pub fn is_clean(self) -> bool {
        self == Dirty::Clean
    }

    /// Whether dependants still need to hear about an incoming notification.
    ///
    /// Only the clean -> dirty transition is forwarded; a node that is
    /// already marked has already propagated downstream in this pass.
    pub fn needs_notify(self) -> bool {
        self.is_clean()
    }
}

impl BitOr for Dirty {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        max(self, rhs)
    }
}
impl BitOrAssign for Dirty {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

/// Strength of an invalidation notification.
///
/// Root containers send `Changed` because their own equality check already
/// ran; derived nodes forward `MaybeChanged` because theirs runs later.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum NotifyLevel {
    Changed,
    MaybeChanged,
}

impl From<NotifyLevel> for Dirty {
    fn from(level: NotifyLevel) -> Self {
        match level {
            NotifyLevel::Changed => Dirty::Dirty,
            NotifyLevel::MaybeChanged => Dirty::MaybeDirty,
        }
    }
}
impl BitOr<NotifyLevel> for Dirty {
    type Output = Self;
    fn bitor(self, rhs: NotifyLevel) -> Self {
        max(self, rhs.into())
    }
}
impl BitOrAssign<NotifyLevel> for Dirty {
    fn bitor_assign(&mut self, rhs: NotifyLevel) {
        *self = *self | rhs;
    }
}

/// Identifies one downstream edge of a source. Keys are handed out in
/// strictly increasing order and never reused, so iterating edges by key
/// equals iterating observers in registration order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct BindKey(u64);

/// A node that can be invalidated from upstream.
pub(crate) trait BindSink: 'static {
    /// Marks this node. No user code runs during notification; leaf nodes
    /// schedule themselves on the runtime queue instead.
    fn notify(self: Rc<Self>, level: NotifyLevel);
}

/// A node whose value downstream edges depend on.
pub(crate) trait BindSource: 'static {
    fn attach(self: Rc<Self>, sink: Weak<dyn BindSink>) -> BindKey;
    /// Removing the last edge deactivates a derived source.
    fn detach(self: Rc<Self>, key: BindKey);
    /// Brings this source up to date and consumes the edge's dirty flag,
    /// reporting whether the value delivered over it actually changed.
    fn check(self: Rc<Self>, key: BindKey) -> bool;
}

struct SinkEntry {
    key: BindKey,
    sink: Weak<dyn BindSink>,
    dirty: Dirty,
}

/// Downstream edges of one source, in registration order.
#[derive(Default)]
pub(crate) struct SinkBindings {
    entries: Vec<SinkEntry>,
    next_key: u64,
}

impl SinkBindings {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn attach(&mut self, sink: Weak<dyn BindSink>) -> BindKey {
        let key = BindKey(self.next_key);
        self.next_key += 1;
        self.entries.push(SinkEntry {
            key,
            sink,
            dirty: Dirty::Clean,
        });
        key
    }
    pub fn detach(&mut self, key: BindKey) {
        if let Ok(index) = self.entries.binary_search_by_key(&key, |e| e.key) {
            self.entries.remove(index);
        }
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Marks every edge and returns the sinks that took a clean -> dirty
    /// transition. The caller forwards the notification after releasing its
    /// borrow of this table, so downstream marking never re-enters it.
    #[must_use]
    pub fn mark(&mut self, level: NotifyLevel) -> Vec<Rc<dyn BindSink>> {
        let mut to_notify = Vec::new();
        self.entries.retain_mut(|entry| match entry.sink.upgrade() {
            Some(sink) => {
                if entry.dirty.needs_notify() {
                    to_notify.push(sink);
                }
                entry.dirty |= level;
                true
            }
            None => false,
        });
        to_notify
    }

    /// Resolves the provisional marks left by a `MaybeChanged` pass once the
    /// source recomputed and knows whether its value actually changed.
    pub fn settle(&mut self, changed: bool) {
        for entry in &mut self.entries {
            if entry.dirty == Dirty::MaybeDirty {
                entry.dirty = Dirty::from_is_dirty(changed);
            }
        }
    }

    /// Consumes an edge's dirty flag.
    pub fn take(&mut self, key: BindKey) -> bool {
        let Ok(index) = self.entries.binary_search_by_key(&key, |e| e.key) else {
            return false;
        };
        let entry = &mut self.entries[index];
        match entry.dirty {
            Dirty::Clean => false,
            Dirty::Dirty => {
                entry.dirty = Dirty::Clean;
                true
            }
            Dirty::MaybeDirty => panic!("edge consumed before its source settled"),
        }
    }
}

/// An established edge from a sink to one of its sources.
pub(crate) struct SourceBinding {
    source: Rc<dyn BindSource>,
    key: BindKey,
}

impl SourceBinding {
    pub fn new(source: Rc<dyn BindSource>, sink: Weak<dyn BindSink>) -> Self {
        let key = source.clone().attach(sink);
        SourceBinding { source, key }
    }
    pub fn check(&self) -> bool {
        self.source.clone().check(self.key)
    }
    pub fn parts(&self) -> (Rc<dyn BindSource>, BindKey) {
        (self.source.clone(), self.key)
    }
    pub fn unbind(self) {
        self.source.clone().detach(self.key);
    }
}

/// A leaf scheduled for the flush phase of the current pass.
pub(crate) trait Task: 'static {
    fn run(self: Rc<Self>);
}

#[derive(Default)]
struct Runtime {
    depth: Cell<usize>,
    flushing: Cell<bool>,
    tasks: RefCell<VecDeque<Weak<dyn Task>>>,
    deferred: RefCell<VecDeque<Box<dyn FnOnce()>>>,
    panic_payload: RefCell<Option<Box<dyn Any + Send>>>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

impl Runtime {
    /// Drains the task queue, then the deferred mutations, until both are
    /// empty. Each task and mutation is isolated: a panic is recorded and
    /// the remaining work of the pass still runs.
    fn flush(&self) {
        self.flushing.set(true);
        loop {
            let task = self.tasks.borrow_mut().pop_front();
            if let Some(task) = task {
                if let Some(task) = task.upgrade() {
                    self.isolate(|| task.run());
                }
                continue;
            }
            let mutation = self.deferred.borrow_mut().pop_front();
            if let Some(mutation) = mutation {
                self.isolate(mutation);
                continue;
            }
            break;
        }
        self.flushing.set(false);
    }

    fn isolate(&self, f: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
            let mut slot = self.panic_payload.borrow_mut();
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
    }

    fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.panic_payload.borrow_mut().take()
    }
}

/// Schedules a leaf for the current pass. Idempotence is the caller's job;
/// nodes keep a `scheduled` flag so one logical update runs them once.
pub(crate) fn schedule(task: Weak<dyn Task>) {
    RUNTIME.with(|rt| rt.tasks.borrow_mut().push_back(task));
}

/// Runs a root mutation. Inside a flush the mutation is deferred and applied
/// in FIFO order after the in-progress pass delivered everything; otherwise
/// it runs now and, at the outermost level, flushes before returning.
pub(crate) fn update(f: impl FnOnce() + 'static) {
    RUNTIME.with(|rt| {
        if rt.flushing.get() {
            rt.deferred.borrow_mut().push_back(Box::new(f));
            return;
        }
        run_pass(rt, f);
    });
}

/// Defers the flush until the outermost batch closure ends, so several root
/// mutations propagate as a single pass and every consumer sees only the
/// final state.
///
/// A panic raised by an observer during the flush is re-raised here after
/// the remaining observers of the pass received their notification.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| {
        if rt.flushing.get() {
            // Opened from inside an observer: the closure runs immediately
            // and each mutation it performs is deferred individually.
            return f();
        }
        let mut result = None;
        run_pass(rt, {
            let out = &mut result;
            || *out = Some(f())
        });
        result.unwrap()
    })
}

fn run_pass(rt: &Runtime, f: impl FnOnce()) {
    rt.depth.set(rt.depth.get() + 1);
    let result = catch_unwind(AssertUnwindSafe(f));
    rt.depth.set(rt.depth.get() - 1);
    let deferred_panic = if rt.depth.get() == 0 {
        rt.flush();
        rt.take_panic()
    } else {
        None
    };
    match result {
        Err(payload) => resume_unwind(payload),
        Ok(()) => {
            if let Some(payload) = deferred_panic {
                resume_unwind(payload);
            }
        }
    }
}
