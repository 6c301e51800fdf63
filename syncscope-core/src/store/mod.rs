//! Atom Stores
//!
//! A store owns atom values. Everything in this crate talks to stores through
//! the `AtomStore` trait, which has exactly three primitives:
//!
//! - `get(atom)` reads an atom's current value,
//! - `set(atom, value)` writes to an atom and returns the write's result,
//! - `subscribe(atom, listener)` registers interest in an atom's changes.
//!
//! Scoped handles (`crate::scope::ScopedStore`) implement the same trait by
//! rewriting the atom argument and delegating to the store they wrap, so a
//! consumer cannot tell a scoped handle from the root store.
//!
//! `Store` is a small reference implementation of the host side: it keeps
//! storage slots, evaluates derived atoms and notifies subscribers. It is not
//! a reactive engine (no batching, no scheduling, no memoization).

mod root;
mod tracking;

pub use root::Store;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::atom::Atom;
use crate::error::StoreError;

/// Callback invoked when a subscribed atom changes.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Shared handle to any store.
pub type StoreHandle = Arc<dyn AtomStore>;

/// Counter for generating unique store IDs, shared by every store kind.
static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// The store primitives that scopes intercept.
pub trait AtomStore: Send + Sync {
    /// Identity of the underlying store.
    ///
    /// Handles that share one store report the same id, whatever `Arc`
    /// wraps them.
    fn store_id(&self) -> u64;

    /// Read the current value of `atom`.
    fn get(&self, atom: &Atom) -> Result<Value, StoreError>;

    /// Write `value` to `atom`, returning the write function's result.
    fn set(&self, atom: &Atom, value: Value) -> Result<Value, StoreError>;

    /// Call `listener` whenever the value of `atom` changes.
    fn subscribe(&self, atom: &Atom, listener: Listener) -> Subscription;

    /// Read `atom`, then write `f(current)` back to it.
    fn update(&self, atom: &Atom, f: &dyn Fn(&Value) -> Value) -> Result<Value, StoreError> {
        let current = self.get(atom)?;
        self.set(atom, f(&current))
    }
}

/// Handle to an active subscription.
///
/// Dropping this handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new<F>(unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Unsubscribe now.
    pub fn unsubscribe(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
