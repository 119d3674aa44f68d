//! Stateful comparator factories.
//!
//! A comparator is a closure `FnMut(&T) -> bool` returned by one of these
//! factories. It answers "is this value equivalent to the one I saw on the
//! previous call?" — the first call always answers `false`, and any `false`
//! answer updates the remembered snapshot. Two instances produced by the
//! same factory are independent.
//!
//! Sequence comparators are intentionally shallow: lengths first, then one
//! comparison per element. A value mutated in place without replacing the
//! elements a comparator snapshots is invisible to it; that is the
//! documented contract, not a defect.

use std::rc::Rc;

#[cfg(test)]
mod tests;

/// Compares one declared field of `T`. Field lists are plain function
/// pointers so a comparator's shape is fixed at the call site.
pub type FieldEq<T> = fn(&T, &T) -> bool;

/// Suppresses nothing. For values with no usable comparison.
pub fn never<T: ?Sized>() -> impl FnMut(&T) -> bool {
    |_| false
}

/// `PartialEq` against the previously delivered value.
pub fn strict<T: PartialEq + Clone>() -> impl FnMut(&T) -> bool {
    let mut prev: Option<T> = None;
    move |next| {
        if prev.as_ref() == Some(next) {
            true
        } else {
            prev = Some(next.clone());
            false
        }
    }
}

/// Pointer identity on shared values.
pub fn identity<T: ?Sized + 'static>() -> impl FnMut(&Rc<T>) -> bool {
    let mut prev: Option<Rc<T>> = None;
    move |next| {
        if prev.as_ref().is_some_and(|p| Rc::ptr_eq(p, next)) {
            true
        } else {
            prev = Some(next.clone());
            false
        }
    }
}

/// Length first, then element-wise `PartialEq`.
pub fn shallow_vec<T: PartialEq + Clone>() -> impl FnMut(&Vec<T>) -> bool {
    let mut prev: Option<Vec<T>> = None;
    move |next| {
        let same = prev
            .as_ref()
            .is_some_and(|p| p.len() == next.len() && p.iter().zip(next).all(|(a, b)| a == b));
        if !same {
            prev = Some(next.clone());
        }
        same
    }
}

/// Length first, then element-wise pointer identity.
pub fn shallow_vec_identity<T: ?Sized + 'static>() -> impl FnMut(&Vec<Rc<T>>) -> bool {
    let mut prev: Option<Vec<Rc<T>>> = None;
    move |next| {
        let same = prev.as_ref().is_some_and(|p| {
            p.len() == next.len() && p.iter().zip(next).all(|(a, b)| Rc::ptr_eq(a, b))
        });
        if !same {
            prev = Some(next.clone());
        }
        same
    }
}

/// Per-field comparison over a statically declared field list. Fields not
/// named in the list do not participate.
pub fn by_fields<T: Clone>(fields: &'static [FieldEq<T>]) -> impl FnMut(&T) -> bool {
    let mut prev: Option<T> = None;
    move |next| {
        let same = prev
            .as_ref()
            .is_some_and(|p| fields.iter().all(|eq| eq(p, next)));
        if !same {
            prev = Some(next.clone());
        }
        same
    }
}

/// Element-wise [`by_fields`] over a sequence.
pub fn vec_by_fields<T: Clone>(fields: &'static [FieldEq<T>]) -> impl FnMut(&Vec<T>) -> bool {
    let mut prev: Option<Vec<T>> = None;
    move |next| {
        let same = prev.as_ref().is_some_and(|p| {
            p.len() == next.len()
                && p.iter()
                    .zip(next)
                    .all(|(a, b)| fields.iter().all(|eq| eq(a, b)))
        });
        if !same {
            prev = Some(next.clone());
        }
        same
    }
}

#[derive(Clone, Copy)]
enum Prev {
    Never,
    Absent,
    Present,
}

/// Nullable wrapper around another comparator: both values absent compare
/// equal, exactly one absent compares different, both present defer to the
/// inner comparator.
pub fn optional<T, C>(inner: impl FnOnce() -> C) -> impl FnMut(&Option<T>) -> bool
where
    C: FnMut(&T) -> bool,
{
    let mut inner = inner();
    let mut prev = Prev::Never;
    move |next| match (prev, next) {
        (Prev::Never, None) => {
            prev = Prev::Absent;
            false
        }
        (Prev::Absent, None) => true,
        (Prev::Present, None) => {
            prev = Prev::Absent;
            false
        }
        (Prev::Present, Some(value)) => inner(value),
        (Prev::Never | Prev::Absent, Some(value)) => {
            prev = Prev::Present;
            // Seed the inner snapshot; the absent -> present transition is
            // different regardless of what the inner comparator answers.
            let _ = inner(value);
            false
        }
    }
}
