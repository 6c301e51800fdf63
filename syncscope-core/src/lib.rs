//! SyncScope Core
//!
//! This crate provides scoped atom aliasing for reactive atom stores.
//! It implements:
//!
//! - Atoms (primitive, read-only derived, read-write derived)
//! - A small reference store with subscriptions
//! - Scopes that redirect a target atom to a source atom, including inside
//!   every derived atom that reads or writes the target
//! - Nested scopes that compose with their enclosing scope
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `atom`: Atom handles and their read/write functions
//! - `store`: The `AtomStore` trait and the root `Store`
//! - `scope`: Target maps, the atom router, scoped stores and providers
//! - `error`: Store and configuration errors
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use syncscope_core::{Atom, AtomStore, ScopeContext, ScopeProvider, Store, SyncPair};
//!
//! let store = Store::new();
//! let source = Atom::primitive(0);
//! let target = Atom::primitive(0);
//!
//! let root = ScopeContext::root(Arc::new(store.clone()));
//! let provider = ScopeProvider::new();
//! let scope = provider
//!     .activate(&root, &[SyncPair::new(source.clone(), target.clone()).unwrap()])
//!     .unwrap();
//!
//! // Inside the scope, writing the target writes the source.
//! scope.store().set(&target, 10.into()).unwrap();
//! assert_eq!(store.get(&source).unwrap(), 10);
//! ```

pub mod atom;
pub mod error;
pub mod scope;
pub mod store;

pub use atom::{Atom, AtomId, AtomKind, Getter, Setter, WeakAtom};
pub use error::{ScopeError, StoreError};
pub use scope::{AtomRouter, ScopeContext, ScopeProvider, ScopedStore, SyncPair, TargetMap};
pub use store::{AtomStore, Listener, Store, StoreHandle, Subscription};
