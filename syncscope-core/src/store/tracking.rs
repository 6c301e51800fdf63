//! Evaluation Tracking
//!
//! The root store evaluates derived atoms recursively: a read function calls
//! `get`, which may run another read function, and so on. This module keeps a
//! thread-local stack of the atoms currently being evaluated so the store can
//!
//! - record which storage slots an evaluation touched (subscriptions use
//!   this to decide whom to notify), and
//! - refuse to re-enter an atom that is already on the stack.
//!
//! Dependencies collected by a nested evaluation are merged into the
//! enclosing frame when the nested frame is popped, so the outermost frame
//! ends up with the transitive set of storage slots.

use std::cell::RefCell;

use smallvec::SmallVec;

use crate::atom::AtomId;
use crate::error::StoreError;

thread_local! {
    static EVAL_STACK: RefCell<Vec<Frame>> = RefCell::new(Vec::new());
}

type Deps = SmallVec<[AtomId; 4]>;

#[derive(Debug)]
struct Frame {
    atom: AtomId,
    /// Storage keys read during this evaluation.
    deps: Deps,
}

/// Guard for one evaluation frame. Pops the frame when dropped.
pub(crate) struct EvalGuard {
    atom: AtomId,
}

impl EvalGuard {
    /// Push a frame for `atom`.
    ///
    /// Fails with `StoreError::Cycle` if `atom` is already being evaluated.
    pub(crate) fn enter(atom: AtomId) -> Result<Self, StoreError> {
        EVAL_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|frame| frame.atom == atom) {
                return Err(StoreError::Cycle { atom });
            }
            stack.push(Frame {
                atom,
                deps: SmallVec::new(),
            });
            Ok(Self { atom })
        })
    }

    /// Record a read of the storage slot `key` in the innermost frame.
    pub(crate) fn track(key: AtomId) {
        EVAL_STACK.with(|stack| {
            if let Some(frame) = stack.borrow_mut().last_mut() {
                if !frame.deps.contains(&key) {
                    frame.deps.push(key);
                }
            }
        });
    }

    pub(crate) fn is_active() -> bool {
        EVAL_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Storage keys collected so far by this guard's frame.
    pub(crate) fn dependencies(&self) -> Vec<AtomId> {
        EVAL_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|frame| frame.deps.to_vec())
                .unwrap_or_default()
        })
    }
}

impl Drop for EvalGuard {
    fn drop(&mut self) {
        EVAL_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let popped = stack.pop();

            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.atom, self.atom,
                    "EvalGuard mismatch: expected {:?}, got {:?}",
                    self.atom, frame.atom
                );
                if let Some(parent) = stack.last_mut() {
                    for key in frame.deps {
                        if !parent.deps.contains(&key) {
                            parent.deps.push(key);
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_pushes_and_pops() {
        assert!(!EvalGuard::is_active());
        {
            let _guard = EvalGuard::enter(AtomId::new()).unwrap();
            assert!(EvalGuard::is_active());
        }
        assert!(!EvalGuard::is_active());
    }

    #[test]
    fn tracks_unique_dependencies() {
        let guard = EvalGuard::enter(AtomId::new()).unwrap();
        let (a, b) = (AtomId::from(1), AtomId::from(2));
        EvalGuard::track(a);
        EvalGuard::track(b);
        EvalGuard::track(a);
        assert_eq!(guard.dependencies(), vec![a, b]);
    }

    #[test]
    fn nested_frames_merge_into_parent() {
        let (a, b) = (AtomId::from(10), AtomId::from(11));
        let outer = EvalGuard::enter(AtomId::new()).unwrap();
        EvalGuard::track(a);
        {
            let inner = EvalGuard::enter(AtomId::new()).unwrap();
            EvalGuard::track(b);
            assert_eq!(inner.dependencies(), vec![b]);
        }
        assert_eq!(outer.dependencies(), vec![a, b]);
    }

    #[test]
    fn reentering_an_atom_is_a_cycle() {
        let id = AtomId::new();
        let _outer = EvalGuard::enter(id).unwrap();
        assert_eq!(
            EvalGuard::enter(id).err(),
            Some(StoreError::Cycle { atom: id })
        );
    }

    #[test]
    fn tracking_without_frame_is_ignored() {
        EvalGuard::track(AtomId::from(99));
        assert!(!EvalGuard::is_active());
    }
}
