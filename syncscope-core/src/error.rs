//! Error types.
//!
//! Two families live here. `StoreError` comes from the host store and is
//! forwarded unchanged through every scoped handle. `ScopeError` is raised
//! eagerly while a scope's target map is built, so misconfiguration shows up
//! at activation time instead of as a confusing failure during a later read.

use crate::atom::AtomId;

/// Errors raised by an atom store while reading or writing atoms.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The atom has no write function.
    #[error("atom {atom} is not writable")]
    NotWritable { atom: AtomId },

    /// A write function tried to store into its own slot, but the atom was
    /// declared without an initial value.
    #[error("atom {atom} has no initial value and cannot store into itself")]
    NoInitialValue { atom: AtomId },

    /// Evaluating the atom re-entered the same atom.
    #[error("cyclic read while evaluating atom {atom}")]
    Cycle { atom: AtomId },

    /// A weak atom handle was used after the atom was dropped.
    #[error("atom was dropped while still referenced")]
    Dropped,

    /// A scoped clone was evaluated after its scope's state was discarded.
    #[error("scoped clone of atom {atom} outlived its scope")]
    ScopeGone { atom: AtomId },

    /// Error raised by a user read or write function.
    #[error("{0}")]
    Custom(String),
}

impl StoreError {
    /// Build an error from a user-supplied message.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Errors raised while configuring a scope.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// Two sync pairs declare the same target atom.
    #[error("atom {target} is declared as a target more than once")]
    DuplicateTarget { target: AtomId },

    /// Following target -> source substitutions loops back to `atom`.
    #[error("sync pairs form an aliasing cycle through atom {atom}")]
    AliasCycle { atom: AtomId },

    /// A sync pair member is read-only.
    #[error("atom {atom} cannot be synced because it is read-only")]
    NotWritable { atom: AtomId },
}
