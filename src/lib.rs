//! Fine-grained reactive state propagation for UI trees.
//!
//! The central primitive is the [`Facet`]: an observable container holding
//! a current value or nothing at all. Roots are [`WritableFacet`]s;
//! [`Facet::map`] and the [`combine`] family derive new facets through pure
//! transforms; [`map_keyed`]/[`map_items`] lift facets over sequences; and
//! [`render_list`] reconciles a sequence facet onto a render backend with
//! minimal mount/unmount churn.
//!
//! Propagation is synchronous and single-threaded: a `set` call delivers to
//! every reachable, currently subscribed consumer before it returns, in
//! dependency order and without glitches — a consumer never observes a
//! value computed from a partially updated set of sources. Derived facets
//! are cold: they subscribe to their sources only while someone observes
//! them, and every delivery is filtered through a pluggable, stateful
//! equality check (see [`equality`]) so redundant updates stop as early in
//! the graph as possible.
//!
//! ```
//! use facets::WritableFacet;
//!
//! let hp = WritableFacet::new(10);
//! let label = hp.facet().map(|hp| format!("{hp} HP"));
//!
//! let _sub = label.observe(|text| println!("{text}"));
//! hp.set(7); // prints "7 HP" before `set` returns
//! hp.set(7); // suppressed: the value did not change
//! ```

mod core;
mod derive;
mod facet;
mod instrument;
mod list;
mod render;
mod stream;
mod subscription;
mod writable;

pub mod equality;

pub use crate::core::batch;
pub use crate::derive::{
    combine, combine3, combine3_with_equality, combine4, combine4_with_equality,
    combine_with_equality,
};
pub use crate::facet::Facet;
pub use crate::instrument::{FacetFactory, FacetId, ProbeEvent, ProbeSink};
pub use crate::list::{map_items, map_keyed, map_keyed_with_equality};
pub use crate::render::{render_list, render_list_with_equality, RenderBackend};
pub use crate::stream::FacetStream;
pub use crate::subscription::Subscription;
pub use crate::writable::WritableFacet;
