use futures::{executor::block_on, FutureExt, StreamExt};

use facets::WritableFacet;

#[test]
fn stream_yields_current_value_then_changes() {
    let f = WritableFacet::new(1);
    let mut stream = f.facet().to_stream();
    f.set(2);
    f.set(3);

    assert_eq!(block_on(stream.next()), Some(1));
    assert_eq!(block_on(stream.next()), Some(2));
    assert_eq!(block_on(stream.next()), Some(3));
    // Nothing further was delivered.
    assert_eq!(stream.next().now_or_never(), None);
}

#[test]
fn stream_on_unset_facet_starts_empty() {
    let f = WritableFacet::<i32>::new_unset();
    let mut stream = f.facet().to_stream();
    assert_eq!(stream.next().now_or_never(), None);

    f.set(9);
    assert_eq!(block_on(stream.next()), Some(9));
}

#[test]
fn stream_skips_suppressed_updates() {
    let f = WritableFacet::new(1);
    let mut stream = f.facet().to_stream();
    f.set(1);
    f.set(2);

    assert_eq!(block_on(stream.next()), Some(1));
    assert_eq!(block_on(stream.next()), Some(2));
    assert_eq!(stream.next().now_or_never(), None);
}

#[test]
fn dropping_the_stream_unsubscribes() {
    let f = WritableFacet::new(1);
    let stream = f.facet().to_stream();
    drop(stream);
    // No observer left; the set simply stores the value.
    f.set(2);
    assert_eq!(f.get(), Some(2));
}
