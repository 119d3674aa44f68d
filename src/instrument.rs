//! Optional instrumentation for tooling that wants to watch an
//! application's facet graph come into being.
//!
//! There is no process-wide registry: a [`ProbeSink`] is handed to a
//! [`FacetFactory`] explicitly, and only facets created through that
//! factory report events to it.

use std::{cell::Cell, rc::Rc};

use parse_display::Display;

use crate::WritableFacet;


/// Identifies a facet within one [`FacetFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("facet #{0}")]
pub struct FacetId(pub u64);

/// A lifecycle event reported to a [`ProbeSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ProbeEvent {
    /// A root facet was created.
    #[display("created {id} ({label})")]
    Created { id: FacetId, label: &'static str },
}

/// Receives probe events. Implementations typically record or forward them
/// to developer tooling.
pub trait ProbeSink: 'static {
    fn record(&self, event: ProbeEvent);
}

/// Creates root facets, optionally reporting their creation to an injected
/// probe.
#[derive(Default)]
pub struct FacetFactory {
    probe: Option<Rc<dyn ProbeSink>>,
    next_id: Cell<u64>,
}

impl FacetFactory {
    /// A factory with no probe; behaves exactly like calling the
    /// [`WritableFacet`] constructors directly.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(probe: Rc<dyn ProbeSink>) -> Self {
        FacetFactory {
            probe: Some(probe),
            next_id: Cell::new(0),
        }
    }

    pub fn writable<T: PartialEq + Clone + 'static>(
        &self,
        label: &'static str,
        initial: T,
    ) -> WritableFacet<T> {
        self.record_created(label);
        WritableFacet::new(initial)
    }

    pub fn writable_unset<T: PartialEq + Clone + 'static>(
        &self,
        label: &'static str,
    ) -> WritableFacet<T> {
        self.record_created(label);
        WritableFacet::new_unset()
    }

    fn record_created(&self, label: &'static str) {
        let id = FacetId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        if let Some(probe) = &self.probe {
            probe.record(ProbeEvent::Created { id, label });
        }
    }
}
