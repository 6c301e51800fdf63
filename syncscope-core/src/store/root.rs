//! Root Store
//!
//! The reference host store. It owns one storage slot per storage key and
//! evaluates derived atoms on demand.
//!
//! # How Reads Work
//!
//! 1. A primitive atom reads its slot, falling back to its initial value.
//!
//! 2. A derived atom runs its read function. Nested `get` calls on an atom
//!    with the same storage key as the one being evaluated read the slot
//!    directly; everything else recurses through `get`.
//!
//! # How Writes Work
//!
//! 1. A primitive atom overwrites its slot.
//!
//! 2. A writable derived atom runs its write function. Nested `set` calls on
//!    its own storage key write the slot; everything else recurses through
//!    `set`.
//!
//! 3. Every slot write re-evaluates the subscriptions that read that slot and
//!    calls the listeners whose value actually changed.
//!
//! # Locking
//!
//! No lock is held while user read/write functions or listeners run, so they
//! are free to call back into the store.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

use super::tracking::EvalGuard;
use super::{next_store_id, AtomStore, Listener, Subscription};
use crate::atom::{Atom, AtomId, AtomKind, Getter, ReadFn, Setter, WriteFn};
use crate::error::StoreError;

struct SubscriptionEntry {
    id: u64,
    atom: Atom,
    /// Storage keys the atom read during its last evaluation.
    deps: HashSet<AtomId>,
    /// Value seen by the last evaluation, `None` if it failed.
    last: Option<Value>,
    listener: Listener,
}

struct StoreInner {
    id: u64,
    slots: DashMap<AtomId, Value>,
    subscriptions: RwLock<Vec<SubscriptionEntry>>,
    next_subscription: AtomicU64,
}

/// The root atom store.
///
/// Cloning a `Store` shares the same slots and subscriptions.
///
/// # Example
///
/// ```rust
/// use syncscope_core::{Atom, AtomStore, Store};
///
/// let store = Store::new();
/// let count = Atom::primitive(1);
/// store.set(&count, 2.into()).unwrap();
/// assert_eq!(store.get(&count).unwrap(), 2);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: next_store_id(),
                slots: DashMap::new(),
                subscriptions: RwLock::new(Vec::new()),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }

    /// Whether a value was ever written to `atom`'s storage slot.
    pub fn has_slot(&self, atom: &Atom) -> bool {
        self.inner.slots.contains_key(&atom.storage_key())
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    fn read_slot(&self, key: AtomId, init: Option<&Value>) -> Result<Value, StoreError> {
        EvalGuard::track(key);
        if let Some(value) = self.inner.slots.get(&key).map(|v| v.value().clone()) {
            return Ok(value);
        }
        init.cloned().ok_or(StoreError::NoInitialValue { atom: key })
    }

    fn write_slot(&self, key: AtomId, value: Value) {
        trace!(atom = %key, store = self.inner.id, "write slot");
        self.inner.slots.insert(key, value);
        self.notify(key);
    }

    /// Evaluate `atom` without pushing an evaluation frame for it.
    fn evaluate(&self, atom: &Atom) -> Result<Value, StoreError> {
        match atom.kind() {
            AtomKind::Primitive { init } => self.read_slot(atom.storage_key(), Some(init)),
            AtomKind::ReadOnly { read } | AtomKind::ReadWrite { read, .. } => {
                self.run_read(atom, read)
            }
        }
    }

    fn run_read(&self, atom: &Atom, read: &ReadFn) -> Result<Value, StoreError> {
        let owner = atom.storage_key();
        let get = |a: &Atom| {
            if a.storage_key() == owner {
                self.read_slot(owner, a.kind().init())
            } else {
                self.get(a)
            }
        };
        read(&Getter::new(&get))
    }

    fn run_write(&self, atom: &Atom, write: &WriteFn, value: Value) -> Result<Value, StoreError> {
        let owner = atom.storage_key();
        let get = |a: &Atom| {
            if a.storage_key() == owner {
                self.read_slot(owner, a.kind().init())
            } else {
                self.get(a)
            }
        };
        let set = |a: &Atom, v: Value| {
            if a.storage_key() != owner {
                return self.set(a, v);
            }
            if a.kind().init().is_none() {
                return Err(StoreError::NoInitialValue { atom: owner });
            }
            self.write_slot(owner, v);
            Ok(Value::Null)
        };
        write(&Getter::new(&get), &Setter::new(&set), value)
    }

    /// Evaluate `atom` in a fresh frame and return the storage keys it read.
    fn evaluate_tracked(&self, atom: &Atom) -> (Result<Value, StoreError>, HashSet<AtomId>) {
        match EvalGuard::enter(atom.id()) {
            Ok(guard) => {
                let value = self.evaluate(atom);
                let deps = guard.dependencies().into_iter().collect();
                (value, deps)
            }
            Err(err) => (Err(err), HashSet::new()),
        }
    }

    /// Re-evaluate every subscription reading `key` and fire the listeners
    /// whose value changed.
    fn notify(&self, key: AtomId) {
        let affected: Vec<(u64, Atom)> = self
            .inner
            .subscriptions
            .read()
            .iter()
            .filter(|entry| entry.deps.contains(&key))
            .map(|entry| (entry.id, entry.atom.clone()))
            .collect();

        for (id, atom) in affected {
            let (value, deps) = self.evaluate_tracked(&atom);
            let value = value.ok();

            let listener = {
                let mut subscriptions = self.inner.subscriptions.write();
                let Some(entry) = subscriptions.iter_mut().find(|entry| entry.id == id) else {
                    // Unsubscribed by an earlier listener.
                    continue;
                };
                entry.deps = deps;
                if entry.last == value {
                    None
                } else {
                    entry.last = value;
                    Some(entry.listener.clone())
                }
            };

            if let Some(listener) = listener {
                listener();
            }
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomStore for Store {
    fn store_id(&self) -> u64 {
        self.inner.id
    }

    fn get(&self, atom: &Atom) -> Result<Value, StoreError> {
        let _guard = match atom.kind() {
            AtomKind::Primitive { .. } => None,
            _ => Some(EvalGuard::enter(atom.id())?),
        };
        self.evaluate(atom)
    }

    fn set(&self, atom: &Atom, value: Value) -> Result<Value, StoreError> {
        match atom.kind() {
            AtomKind::Primitive { .. } => {
                self.write_slot(atom.storage_key(), value);
                Ok(Value::Null)
            }
            AtomKind::ReadOnly { .. } => Err(StoreError::NotWritable { atom: atom.id() }),
            AtomKind::ReadWrite { write, .. } => self.run_write(atom, write, value),
        }
    }

    fn subscribe(&self, atom: &Atom, listener: Listener) -> Subscription {
        let (value, deps) = self.evaluate_tracked(atom);
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        debug!(atom = %atom.id(), deps = deps.len(), store = self.inner.id, "subscribe");

        self.inner.subscriptions.write().push(SubscriptionEntry {
            id,
            atom: atom.clone(),
            deps,
            last: value.ok(),
            listener,
        });

        let store = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = store.upgrade() {
                inner.subscriptions.write().retain(|entry| entry.id != id);
            }
        })
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("slots", &self.inner.slots.len())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
