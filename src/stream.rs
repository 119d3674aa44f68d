//! Bridges a facet onto an async consumer.

use std::{
    cell::RefCell,
    collections::VecDeque,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

use futures::Stream;

use crate::{facet::Facet, subscription::Subscription};

/// Asynchronous view of a facet, created by [`Facet::to_stream`].
///
/// Yields the value current at creation time (unless the facet was unset)
/// followed by every delivered change, in delivery order. The stream holds
/// its own observation, so it keeps the facet's graph active, and it never
/// terminates on its own — dropping it is the way to unsubscribe.
pub struct FacetStream<T: 'static> {
    inbox: Rc<RefCell<Inbox<T>>>,
    _subscription: Subscription,
}

struct Inbox<T> {
    queue: VecDeque<T>,
    waker: Option<Waker>,
}

pub(crate) fn to_stream<T: Clone + 'static>(facet: &Facet<T>) -> FacetStream<T> {
    let inbox = Rc::new(RefCell::new(Inbox {
        queue: VecDeque::new(),
        waker: None,
    }));
    let subscription = facet.observe({
        let inbox = inbox.clone();
        move |value: &T| {
            let mut inbox = inbox.borrow_mut();
            inbox.queue.push_back(value.clone());
            if let Some(waker) = inbox.waker.take() {
                waker.wake();
            }
        }
    });
    FacetStream {
        inbox,
        _subscription: subscription,
    }
}

impl<T: 'static> Stream for FacetStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut inbox = self.inbox.borrow_mut();
        if let Some(value) = inbox.queue.pop_front() {
            return Poll::Ready(Some(value));
        }
        inbox.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
