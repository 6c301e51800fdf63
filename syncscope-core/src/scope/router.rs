//! Atom Router
//!
//! The router decides which atom a scoped store actually hands to the store
//! it wraps.
//!
//! # Resolution
//!
//! 1. Substitute: a target atom is replaced by its source (following chains
//!    declared in the same scope).
//!
//! 2. Reuse: if the atom was resolved before and produced a clone, return
//!    that same clone. Stores key subscriptions on identity, so a fresh clone
//!    per call would leak subscriptions.
//!
//! 3. Clone: a derived atom may read or write a target somewhere inside its
//!    functions, and there is no way to know without running them. Every
//!    derived atom is therefore cloned. The clone runs the same functions
//!    with a getter/setter that resolves each nested atom through this
//!    router before passing it on. Atoms sharing the clone's storage key
//!    pass through untouched, so an atom referring to itself keeps reaching
//!    its own slot instead of being routed again.
//!
//! 4. Primitive atoms never need a clone: substitution already produced the
//!    final answer.
//!
//! # Cache lifetime
//!
//! Cache entries hold their key atom weakly. Clones hold the router weakly and
//! never hold their original, so dropping an atom makes its entry prunable.
//! A clone that outlives its router can still reach its own slot, but any
//! nested atom it reads or writes fails with `StoreError::ScopeGone` rather
//! than silently skipping the scope's redirection.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use super::pairs::TargetMap;
use crate::atom::{Atom, AtomId, AtomKind, Getter, ReadFn, Setter, WeakAtom, WriteFn};
use crate::error::StoreError;

struct CacheEntry {
    key: WeakAtom,
    clone: Atom,
}

struct RouterInner {
    targets: TargetMap,
    clones: Mutex<HashMap<AtomId, CacheEntry>>,
}

/// Resolves atoms for one committed scope state.
///
/// Cloning an `AtomRouter` shares the same target map and clone cache.
#[derive(Clone)]
pub struct AtomRouter {
    inner: Arc<RouterInner>,
}

impl AtomRouter {
    pub fn new(targets: TargetMap) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                targets,
                clones: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn targets(&self) -> &TargetMap {
        &self.inner.targets
    }

    /// The atom to hand to the wrapped store in place of `atom`.
    pub fn resolve(&self, atom: &Atom) -> Atom {
        RouterInner::resolve(&self.inner, atom)
    }

    /// Number of cached clones, including entries whose key was dropped but
    /// not yet pruned.
    pub fn cached_clones(&self) -> usize {
        self.inner.clones.lock().len()
    }

    /// Drop cache entries whose key atom no longer exists. Returns how many
    /// were removed.
    pub fn prune(&self) -> usize {
        let removed = prune_dead(&mut self.inner.clones.lock());
        if removed > 0 {
            debug!(removed, "pruned scoped clones");
        }
        removed
    }
}

impl RouterInner {
    fn resolve(this: &Arc<Self>, atom: &Atom) -> Atom {
        let substituted = this.targets.substitute(atom);
        if !substituted.is_derived() {
            return substituted;
        }

        if let Some(entry) = this.clones.lock().get(&atom.id()) {
            return entry.clone.clone();
        }

        // Building the clone runs no user code, so nothing can insert the
        // same key between the two locks.
        let clone = clone_routed(this, &substituted);
        trace!(
            atom = %atom.id(),
            source = %substituted.id(),
            clone = %clone.id(),
            "cloned atom for scope"
        );

        let mut clones = this.clones.lock();
        prune_dead(&mut clones);
        clones
            .entry(atom.id())
            .or_insert(CacheEntry {
                key: atom.downgrade(),
                clone,
            })
            .clone
            .clone()
    }
}

fn prune_dead(clones: &mut HashMap<AtomId, CacheEntry>) -> usize {
    let before = clones.len();
    clones.retain(|_, entry| entry.key.is_alive());
    before - clones.len()
}

/// Nested-atom rewriting used by a clone's functions.
#[derive(Clone)]
struct Route {
    router: Weak<RouterInner>,
    /// Storage key of the cloned atom; atoms sharing it pass through.
    owner: AtomId,
}

impl Route {
    fn apply(&self, atom: &Atom) -> Result<Atom, StoreError> {
        if atom.storage_key() == self.owner {
            return Ok(atom.clone());
        }
        match self.router.upgrade() {
            Some(router) => Ok(RouterInner::resolve(&router, atom)),
            None => {
                debug!(owner = %self.owner, atom = %atom.id(), "scoped clone outlived its router");
                Err(StoreError::ScopeGone { atom: self.owner })
            }
        }
    }
}

fn clone_routed(router: &Arc<RouterInner>, original: &Atom) -> Atom {
    let route = Route {
        router: Arc::downgrade(router),
        owner: original.storage_key(),
    };

    let kind = match original.kind() {
        AtomKind::Primitive { init } => AtomKind::Primitive { init: init.clone() },
        AtomKind::ReadOnly { read } => AtomKind::ReadOnly {
            read: routed_read(read.clone(), route),
        },
        AtomKind::ReadWrite { init, read, write } => AtomKind::ReadWrite {
            init: init.clone(),
            read: routed_read(read.clone(), route.clone()),
            write: routed_write(write.clone(), route),
        },
    };

    original.routed_clone(kind)
}

fn routed_read(read: ReadFn, route: Route) -> ReadFn {
    Arc::new(move |get: &Getter<'_>| {
        let routed_get = |atom: &Atom| get.get(&route.apply(atom)?);
        read(&Getter::new(&routed_get))
    })
}

fn routed_write(write: WriteFn, route: Route) -> WriteFn {
    Arc::new(move |get: &Getter<'_>, set: &Setter<'_>, value: Value| {
        let routed_get = |atom: &Atom| get.get(&route.apply(atom)?);
        let routed_set = |atom: &Atom, value: Value| set.set(&route.apply(atom)?, value);
        write(&Getter::new(&routed_get), &Setter::new(&routed_set), value)
    })
}

impl Debug for AtomRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomRouter")
            .field("targets", &self.inner.targets)
            .field("cached_clones", &self.cached_clones())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
