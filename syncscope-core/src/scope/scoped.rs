//! Scoped Store
//!
//! A redirected view of another store. Each of the three store primitives
//! resolves its atom argument through the scope's router and then delegates
//! to the wrapped store, returning whatever it returns. Errors from the
//! wrapped store pass through untouched.

use std::fmt::Debug;

use serde_json::Value;
use tracing::trace;

use super::router::AtomRouter;
use crate::atom::Atom;
use crate::error::StoreError;
use crate::store::{next_store_id, AtomStore, Listener, StoreHandle, Subscription};

/// Store handle that redirects atoms before delegating.
pub struct ScopedStore {
    id: u64,
    inner: StoreHandle,
    router: AtomRouter,
}

impl ScopedStore {
    pub fn new(inner: StoreHandle, router: AtomRouter) -> Self {
        Self {
            id: next_store_id(),
            inner,
            router,
        }
    }

    /// The wrapped store, for anything the scope does not intercept.
    pub fn inner(&self) -> &StoreHandle {
        &self.inner
    }

    pub fn router(&self) -> &AtomRouter {
        &self.router
    }

    /// The atom this scope hands to the wrapped store in place of `atom`.
    pub fn resolve(&self, atom: &Atom) -> Atom {
        self.router.resolve(atom)
    }
}

impl AtomStore for ScopedStore {
    fn store_id(&self) -> u64 {
        self.id
    }

    fn get(&self, atom: &Atom) -> Result<Value, StoreError> {
        self.inner.get(&self.router.resolve(atom))
    }

    fn set(&self, atom: &Atom, value: Value) -> Result<Value, StoreError> {
        let resolved = self.router.resolve(atom);
        trace!(atom = %atom.id(), resolved = %resolved.id(), "scoped set");
        self.inner.set(&resolved, value)
    }

    fn subscribe(&self, atom: &Atom, listener: Listener) -> Subscription {
        self.inner.subscribe(&self.router.resolve(atom), listener)
    }
}

impl Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("id", &self.id)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
