use std::{any::Any, mem::take, rc::Rc};


/// Keeps an observation alive. Dropping the guard unsubscribes; there is no
/// other teardown step, so unsubscribing is idempotent by construction and
/// safe at any point, including from inside another observer's callback.
#[derive(Default)]
#[must_use]
pub struct Subscription(RawSubscription);

impl Subscription {
    /// A guard that owns nothing. Useful as a placeholder slot.
    pub fn empty() -> Self {
        Subscription(RawSubscription::Empty)
    }
    /// Runs `f` when the guard is dropped.
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Subscription(RawSubscription::Fn(Box::new(f)))
    }
    /// Keeps `rc` alive until the guard is dropped. The observation ends
    /// through `rc`'s own `Drop`.
    pub fn from_rc(rc: Rc<dyn Any>) -> Self {
        Subscription(RawSubscription::Rc(rc))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        match take(&mut self.0) {
            RawSubscription::Empty => {}
            RawSubscription::Fn(f) => f(),
            RawSubscription::Rc(_) => {}
        }
    }
}

#[derive(Default)]
enum RawSubscription {
    #[default]
    Empty,
    Fn(Box<dyn FnOnce() + 'static>),
    Rc(#[allow(unused)] Rc<dyn Any>),
}
