//! Atoms
//!
//! An atom is an addressable reactive state cell. Atoms are created by
//! application code and handed to a store, which owns their values. The atom
//! itself only describes *how* its value is obtained:
//!
//! - `Primitive` atoms hold a value directly.
//! - `ReadOnly` atoms compute their value from other atoms.
//! - `ReadWrite` atoms also translate incoming writes into writes on other
//!   atoms. When they carry an initial value they own a storage slot of their
//!   own, which their functions reach by referring to the atom itself.
//!
//! # Identity
//!
//! Atoms are compared by identity, never by value. Every atom gets a unique
//! `AtomId` at creation, and cloning an `Atom` handle shares the same cell.
//! Stores key all of their bookkeeping on identity, which is why scoped
//! clones must be memoized.
//!
//! # Storage keys
//!
//! A scoped clone of an atom is a new identity that reads and writes the
//! original's storage slot. `Atom::storage_key` names that slot: the clone
//! reports its origin's key, so both behave as "self" for each other.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use serde_json::Value;

use crate::error::StoreError;

/// Unique identifier for an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

impl AtomId {
    /// Generate a new unique atom ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for AtomId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for AtomId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read access handed to an atom's read and write functions.
pub struct Getter<'a> {
    get: &'a dyn Fn(&Atom) -> Result<Value, StoreError>,
}

impl<'a> Getter<'a> {
    pub fn new(get: &'a dyn Fn(&Atom) -> Result<Value, StoreError>) -> Self {
        Self { get }
    }

    /// Read `atom` through whatever store is evaluating the caller.
    pub fn get(&self, atom: &Atom) -> Result<Value, StoreError> {
        (self.get)(atom)
    }
}

/// Write access handed to an atom's write function.
pub struct Setter<'a> {
    set: &'a dyn Fn(&Atom, Value) -> Result<Value, StoreError>,
}

impl<'a> Setter<'a> {
    pub fn new(set: &'a dyn Fn(&Atom, Value) -> Result<Value, StoreError>) -> Self {
        Self { set }
    }

    /// Write `value` to `atom` through whatever store is evaluating the caller.
    pub fn set(&self, atom: &Atom, value: Value) -> Result<Value, StoreError> {
        (self.set)(atom, value)
    }
}

/// Read function of a derived atom.
pub type ReadFn = Arc<dyn Fn(&Getter<'_>) -> Result<Value, StoreError> + Send + Sync>;

/// Write function of a writable derived atom.
pub type WriteFn =
    Arc<dyn Fn(&Getter<'_>, &Setter<'_>, Value) -> Result<Value, StoreError> + Send + Sync>;

/// The shape of an atom.
#[derive(Clone)]
pub enum AtomKind {
    /// Holds a value directly.
    Primitive { init: Value },

    /// Computed from other atoms.
    ReadOnly { read: ReadFn },

    /// Computed from other atoms, with a custom write. `init` is set when the
    /// atom owns a storage slot.
    ReadWrite {
        init: Option<Value>,
        read: ReadFn,
        write: WriteFn,
    },
}

impl AtomKind {
    /// Short name of the variant, used in logs and debug output.
    pub fn name(&self) -> &'static str {
        match self {
            AtomKind::Primitive { .. } => "primitive",
            AtomKind::ReadOnly { .. } => "read-only",
            AtomKind::ReadWrite { .. } => "read-write",
        }
    }

    /// Initial value of the atom's storage slot, if it has one.
    pub fn init(&self) -> Option<&Value> {
        match self {
            AtomKind::Primitive { init } => Some(init),
            AtomKind::ReadOnly { .. } => None,
            AtomKind::ReadWrite { init, .. } => init.as_ref(),
        }
    }
}

struct AtomInner {
    id: AtomId,
    /// Storage key of the atom this one was cloned from.
    origin: Option<AtomId>,
    label: OnceLock<String>,
    kind: AtomKind,
}

/// A handle to an atom. Cheap to clone; clones share identity.
#[derive(Clone)]
pub struct Atom(Arc<AtomInner>);

impl Atom {
    /// Create an atom from an explicit kind.
    pub fn new(kind: AtomKind) -> Self {
        Self(Arc::new(AtomInner {
            id: AtomId::new(),
            origin: None,
            label: OnceLock::new(),
            kind,
        }))
    }

    /// Create a primitive atom holding `init`.
    pub fn primitive(init: impl Into<Value>) -> Self {
        Self::new(AtomKind::Primitive { init: init.into() })
    }

    /// Create a read-only derived atom.
    pub fn derived<R>(read: R) -> Self
    where
        R: Fn(&Getter<'_>) -> Result<Value, StoreError> + Send + Sync + 'static,
    {
        Self::new(AtomKind::ReadOnly {
            read: Arc::new(read),
        })
    }

    /// Create a writable derived atom without a storage slot of its own.
    pub fn writable<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&Getter<'_>) -> Result<Value, StoreError> + Send + Sync + 'static,
        W: Fn(&Getter<'_>, &Setter<'_>, Value) -> Result<Value, StoreError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(AtomKind::ReadWrite {
            init: None,
            read: Arc::new(read),
            write: Arc::new(write),
        })
    }

    /// Create an atom whose functions can refer to the atom itself.
    ///
    /// `build` receives a weak handle to the atom under construction. It must
    /// not be upgraded inside `build`; capture it in the read/write closures
    /// instead.
    pub fn new_cyclic<F>(build: F) -> Self
    where
        F: FnOnce(&WeakAtom) -> AtomKind,
    {
        let id = AtomId::new();
        Self(Arc::new_cyclic(|weak| {
            let this = WeakAtom {
                id,
                inner: weak.clone(),
            };
            AtomInner {
                id,
                origin: None,
                label: OnceLock::new(),
                kind: build(&this),
            }
        }))
    }

    /// Create an atom that stores its own value but runs every write through
    /// `write`, which receives the atom itself so it can store into it.
    pub fn with_write<W>(init: impl Into<Value>, write: W) -> Self
    where
        W: Fn(&Atom, &Getter<'_>, &Setter<'_>, Value) -> Result<Value, StoreError>
            + Send
            + Sync
            + 'static,
    {
        let init = init.into();
        Self::new_cyclic(move |this| {
            let read_this = this.clone();
            let write_this = this.clone();
            AtomKind::ReadWrite {
                init: Some(init),
                read: Arc::new(move |get: &Getter<'_>| get.get(&read_this.upgrade_or_err()?)),
                write: Arc::new(move |get: &Getter<'_>, set: &Setter<'_>, value| {
                    write(&write_this.upgrade_or_err()?, get, set, value)
                }),
            }
        })
    }

    /// Attach a debug label. Only the first label sticks.
    pub fn labeled(self, label: impl Into<String>) -> Self {
        let _ = self.0.label.set(label.into());
        self
    }

    /// Build a clone of this atom with a new identity and a replacement kind.
    ///
    /// The clone shares this atom's storage slot.
    pub(crate) fn routed_clone(&self, kind: AtomKind) -> Self {
        let clone = Self(Arc::new(AtomInner {
            id: AtomId::new(),
            origin: Some(self.storage_key()),
            label: OnceLock::new(),
            kind,
        }));
        if let Some(label) = self.label() {
            let _ = clone.0.label.set(format!("{label}@scoped"));
        }
        clone
    }

    /// Get the atom's unique ID.
    pub fn id(&self) -> AtomId {
        self.0.id
    }

    /// The ID of the atom owning this atom's storage slot.
    pub fn storage_key(&self) -> AtomId {
        self.0.origin.unwrap_or(self.0.id)
    }

    /// Storage key of the atom this one was cloned from, if it is a clone.
    pub fn origin(&self) -> Option<AtomId> {
        self.0.origin
    }

    pub fn label(&self) -> Option<&str> {
        self.0.label.get().map(String::as_str)
    }

    pub fn kind(&self) -> &AtomKind {
        &self.0.kind
    }

    /// Whether the atom accepts writes.
    pub fn is_writable(&self) -> bool {
        !matches!(self.0.kind, AtomKind::ReadOnly { .. })
    }

    /// Whether the atom runs user functions (and so may need routing).
    pub fn is_derived(&self) -> bool {
        !matches!(self.0.kind, AtomKind::Primitive { .. })
    }

    /// Whether two handles point at the same allocation.
    pub fn ptr_eq(a: &Atom, b: &Atom) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakAtom {
        WeakAtom {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Atom {}

impl std::hash::Hash for Atom {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Atom");
        s.field("id", &self.0.id);
        if let Some(label) = self.label() {
            s.field("label", &label);
        }
        if let Some(origin) = self.0.origin {
            s.field("origin", &origin);
        }
        s.field("kind", &self.0.kind.name()).finish()
    }
}

/// A non-owning atom handle.
#[derive(Clone)]
pub struct WeakAtom {
    id: AtomId,
    inner: Weak<AtomInner>,
}

impl WeakAtom {
    /// ID of the referenced atom, available even after it was dropped.
    pub fn id(&self) -> AtomId {
        self.id
    }

    pub fn upgrade(&self) -> Option<Atom> {
        self.inner.upgrade().map(Atom)
    }

    /// Upgrade, failing with `StoreError::Dropped` if the atom is gone.
    pub fn upgrade_or_err(&self) -> Result<Atom, StoreError> {
        self.upgrade().ok_or(StoreError::Dropped)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl Debug for WeakAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakAtom")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
