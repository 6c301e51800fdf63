//! Scopes
//!
//! This module implements atom aliasing: within a scope, reads and writes of
//! a *target* atom are redirected to a *source* atom, and so is every derived
//! atom that touches the target somewhere inside its own functions.
//!
//! # Concepts
//!
//! ## Sync pairs and the target map
//!
//! A scope is configured with a list of `SyncPair`s. The list is inverted
//! into a `TargetMap` (target -> source), validated eagerly: duplicate
//! targets and aliasing cycles are rejected when the map is built.
//!
//! ## Routing
//!
//! The `AtomRouter` turns any atom into the atom the wrapped store should
//! see. Targets become their sources; derived atoms become memoized clones
//! whose nested reads and writes are routed the same way, at every depth.
//!
//! ## Scoped stores
//!
//! A `ScopedStore` is an `AtomStore` that routes every atom argument and
//! delegates to the store it wraps. Wrapping another `ScopedStore` is how
//! nested scopes compose.
//!
//! ## Providers
//!
//! A `ScopeProvider` owns one scope's state and decides when it must be
//! rebuilt. Enclosing scopes are passed explicitly through `ScopeContext`.

mod pairs;
mod provider;
mod router;
mod scoped;

pub use pairs::{SyncPair, TargetMap};
pub use provider::{ScopeContext, ScopeProvider};
pub use router::AtomRouter;
pub use scoped::ScopedStore;
