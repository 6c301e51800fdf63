//! Scope Provider
//!
//! A `ScopeProvider` is the per-subtree owner of one scope's redirection
//! state. The host calls `activate` every time the subtree is (re)built,
//! passing the enclosing `ScopeContext` and the current pair list; the
//! returned context is what descendants should use.
//!
//! # When the state is rebuilt
//!
//! The target map, clone cache and scoped handle are rebuilt from scratch
//! when
//!
//! - the provider has never been activated,
//! - the enclosing store differs from the one captured last time (compared
//!   by `AtomStore::store_id`, not by handle address), or
//! - the pair list is not set-equal to the committed target map.
//!
//! Otherwise the committed handle is returned as-is, which keeps clone
//! identities stable across activations.
//!
//! # Nesting
//!
//! The enclosing context already names the nearest scoped handle, so a
//! nested provider wraps its parent scope instead of the root store. Atoms
//! the inner scope does not redirect fall through to the outer scope.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::pairs::{SyncPair, TargetMap};
use super::router::AtomRouter;
use super::scoped::ScopedStore;
use crate::error::ScopeError;
use crate::store::{AtomStore, StoreHandle};

/// The store a subtree should use, passed down explicitly.
#[derive(Clone)]
pub struct ScopeContext {
    root: StoreHandle,
    /// Nearest enclosing scope's handle, if any.
    scoped: Option<StoreHandle>,
}

impl ScopeContext {
    /// Context for a subtree with no enclosing scope.
    pub fn root(store: StoreHandle) -> Self {
        Self { root: store, scoped: None }
    }

    /// The store descendants should use: the nearest scope, else the root.
    pub fn store(&self) -> &StoreHandle {
        self.scoped.as_ref().unwrap_or(&self.root)
    }

    pub fn root_store(&self) -> &StoreHandle {
        &self.root
    }

    pub fn enclosing_scope(&self) -> Option<&StoreHandle> {
        self.scoped.as_ref()
    }

    fn child(&self, scoped: StoreHandle) -> Self {
        Self {
            root: self.root.clone(),
            scoped: Some(scoped),
        }
    }
}

impl Debug for ScopeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeContext")
            .field("scoped", &self.scoped.is_some())
            .finish_non_exhaustive()
    }
}

/// Whether two handles reach the same store.
fn same_store(a: &StoreHandle, b: &StoreHandle) -> bool {
    a.store_id() == b.store_id()
}

/// Committed scope state.
struct ScopeState {
    enclosing: StoreHandle,
    handle: Arc<ScopedStore>,
}

/// Owner of one scope's redirection state.
pub struct ScopeProvider {
    state: Mutex<Option<ScopeState>>,
    generation: AtomicU64,
}

impl ScopeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Activate the scope under `enclosing` with `pairs`, rebuilding its
    /// state if needed, and return the context for descendants.
    ///
    /// On error the previously committed state is kept.
    pub fn activate(
        &self,
        enclosing: &ScopeContext,
        pairs: &[SyncPair],
    ) -> Result<ScopeContext, ScopeError> {
        let store = enclosing.store();
        let mut state = self.state.lock();

        if let Some(committed) = state.as_ref() {
            if same_store(&committed.enclosing, store)
                && committed.handle.router().targets().matches(pairs)
            {
                return Ok(enclosing.child(committed.handle.clone()));
            }
        }

        let targets = TargetMap::build(pairs)?;
        let handle = Arc::new(ScopedStore::new(store.clone(), AtomRouter::new(targets)));
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            generation,
            pairs = pairs.len(),
            nested = enclosing.enclosing_scope().is_some(),
            "rebuilt scope state"
        );

        *state = Some(ScopeState {
            enclosing: store.clone(),
            handle: handle.clone(),
        });
        Ok(enclosing.child(handle))
    }

    /// The committed scoped handle, if the provider was activated.
    pub fn handle(&self) -> Option<Arc<ScopedStore>> {
        self.state.lock().as_ref().map(|state| state.handle.clone())
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Number of times the state was rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}

impl Default for ScopeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ScopeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeProvider")
            .field("generation", &self.generation())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::store::Store;
    use serde_json::json;

    fn pair(source: &Atom, target: &Atom) -> SyncPair {
        SyncPair::new(source.clone(), target.clone()).unwrap()
    }

    fn root_context() -> (Store, ScopeContext) {
        let store = Store::new();
        let context = ScopeContext::root(Arc::new(store.clone()));
        (store, context)
    }

    #[test]
    fn root_context_uses_root_store() {
        let (_, context) = root_context();
        assert!(context.enclosing_scope().is_none());
        assert!(same_store(context.store(), context.root_store()));
    }

    #[test]
    fn first_activation_builds_state() {
        let (_, context) = root_context();
        let (s, t) = (Atom::primitive(0), Atom::primitive(0));
        let provider = ScopeProvider::new();
        assert!(!provider.is_active());

        let child = provider.activate(&context, &[pair(&s, &t)]).unwrap();
        assert!(provider.is_active());
        assert_eq!(provider.generation(), 1);
        assert!(child.enclosing_scope().is_some());
        assert!(same_store(child.root_store(), context.root_store()));
    }

    #[test]
    fn equal_pairs_keep_state() {
        let (_, context) = root_context();
        let (s1, t1, s2, t2) = (
            Atom::primitive(0),
            Atom::primitive(0),
            Atom::primitive(0),
            Atom::primitive(0),
        );
        let provider = ScopeProvider::new();

        let first = provider
            .activate(&context, &[pair(&s1, &t1), pair(&s2, &t2)])
            .unwrap();
        let second = provider
            .activate(&context, &[pair(&s2, &t2), pair(&s1, &t1)])
            .unwrap();

        assert_eq!(provider.generation(), 1);
        assert!(same_store(first.store(), second.store()));
    }

    #[test]
    fn changed_pairs_rebuild_state() {
        let (_, context) = root_context();
        let (s1, s2, t) = (Atom::primitive(0), Atom::primitive(0), Atom::primitive(0));
        let provider = ScopeProvider::new();

        let first = provider.activate(&context, &[pair(&s1, &t)]).unwrap();
        let second = provider.activate(&context, &[pair(&s2, &t)]).unwrap();

        assert_eq!(provider.generation(), 2);
        assert!(!same_store(first.store(), second.store()));
    }

    #[test]
    fn changed_enclosing_store_rebuilds_state() {
        let (_, first_root) = root_context();
        let (_, second_root) = root_context();
        let (s, t) = (Atom::primitive(0), Atom::primitive(0));
        let provider = ScopeProvider::new();

        provider.activate(&first_root, &[pair(&s, &t)]).unwrap();
        provider.activate(&first_root, &[pair(&s, &t)]).unwrap();
        provider.activate(&second_root, &[pair(&s, &t)]).unwrap();
        assert_eq!(provider.generation(), 2);
    }

    #[test]
    fn rewrapped_root_store_keeps_state() {
        let store = Store::new();
        let (s, t) = (Atom::primitive(0), Atom::primitive(0));
        let provider = ScopeProvider::new();

        let first = provider
            .activate(&ScopeContext::root(Arc::new(store.clone())), &[pair(&s, &t)])
            .unwrap();
        let second = provider
            .activate(&ScopeContext::root(Arc::new(store.clone())), &[pair(&s, &t)])
            .unwrap();

        assert_eq!(provider.generation(), 1);
        assert!(same_store(first.store(), second.store()));
    }

    #[test]
    fn invalid_pairs_keep_previous_state() {
        let (store, context) = root_context();
        let (s, t, other) = (Atom::primitive(1), Atom::primitive(0), Atom::primitive(2));
        let provider = ScopeProvider::new();

        provider.activate(&context, &[pair(&s, &t)]).unwrap();
        let err = provider
            .activate(&context, &[pair(&s, &t), pair(&other, &t)])
            .unwrap_err();
        assert_eq!(err, ScopeError::DuplicateTarget { target: t.id() });
        assert_eq!(provider.generation(), 1);

        let handle = provider.handle().unwrap();
        assert_eq!(handle.get(&t).unwrap(), json!(1));
        assert_eq!(store.get(&t).unwrap(), json!(0));
    }

    #[test]
    fn nested_provider_wraps_parent_scope() {
        let (_, context) = root_context();
        let (s, t, n) = (Atom::primitive(0), Atom::primitive(0), Atom::primitive(0));
        let outer = ScopeProvider::new();
        let inner = ScopeProvider::new();

        let outer_context = outer.activate(&context, &[pair(&s, &t)]).unwrap();
        let inner_context = inner.activate(&outer_context, &[pair(&t, &n)]).unwrap();

        let inner_handle = inner.handle().unwrap();
        assert!(same_store(inner_handle.inner(), outer_context.store()));
        assert!(same_store(inner_context.root_store(), context.root_store()));
    }

    #[test]
    fn rebuilt_outer_scope_rebuilds_inner() {
        let (_, context) = root_context();
        let (s1, s2, t, n) = (
            Atom::primitive(0),
            Atom::primitive(0),
            Atom::primitive(0),
            Atom::primitive(0),
        );
        let outer = ScopeProvider::new();
        let inner = ScopeProvider::new();

        let outer_context = outer.activate(&context, &[pair(&s1, &t)]).unwrap();
        inner.activate(&outer_context, &[pair(&t, &n)]).unwrap();

        let outer_context = outer.activate(&context, &[pair(&s2, &t)]).unwrap();
        inner.activate(&outer_context, &[pair(&t, &n)]).unwrap();
        assert_eq!(inner.generation(), 2);
    }
}
