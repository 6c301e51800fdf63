//! Sync pairs and the target map built from them.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use indexmap::IndexMap;

use crate::atom::{Atom, AtomId};
use crate::error::ScopeError;

/// Declares that, inside a scope, `target` is an alias of `source`.
#[derive(Clone)]
pub struct SyncPair {
    source: Atom,
    target: Atom,
}

impl SyncPair {
    /// Pair two writable atoms.
    pub fn new(source: Atom, target: Atom) -> Result<Self, ScopeError> {
        for atom in [&source, &target] {
            if !atom.is_writable() {
                return Err(ScopeError::NotWritable { atom: atom.id() });
            }
        }
        Ok(Self { source, target })
    }

    pub fn source(&self) -> &Atom {
        &self.source
    }

    pub fn target(&self) -> &Atom {
        &self.target
    }
}

impl PartialEq for SyncPair {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.target == other.target
    }
}

impl Eq for SyncPair {}

impl Debug for SyncPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SyncPair")
            .field(&self.source.id())
            .field(&self.target.id())
            .finish()
    }
}

/// Target -> source lookup for one scope.
///
/// Building the map validates the pair list: every target must be unique and
/// following substitutions must never loop.
///
/// Targets are keyed by storage key, so a scoped clone of a target (minted by
/// a nested scope) is still recognized as that target.
#[derive(Clone, Default)]
pub struct TargetMap {
    sources: IndexMap<AtomId, Atom>,
}

impl TargetMap {
    /// Invert `pairs` into a target map.
    pub fn build(pairs: &[SyncPair]) -> Result<Self, ScopeError> {
        let mut sources = IndexMap::with_capacity(pairs.len());
        for pair in pairs {
            if sources
                .insert(pair.target.storage_key(), pair.source.clone())
                .is_some()
            {
                return Err(ScopeError::DuplicateTarget {
                    target: pair.target.id(),
                });
            }
        }

        let map = Self { sources };
        map.check_cycles()?;
        Ok(map)
    }

    fn check_cycles(&self) -> Result<(), ScopeError> {
        for (start, first) in &self.sources {
            let mut seen = HashSet::from([*start]);
            let mut current = first;
            while let Some(next) = self.sources.get(&current.storage_key()) {
                if !seen.insert(current.storage_key()) {
                    return Err(ScopeError::AliasCycle { atom: current.id() });
                }
                current = next;
            }
        }
        Ok(())
    }

    /// The source directly paired with `atom`, if `atom` is a target.
    pub fn source_of(&self, atom: &Atom) -> Option<&Atom> {
        self.sources.get(&atom.storage_key())
    }

    pub fn is_target(&self, atom: &Atom) -> bool {
        self.sources.contains_key(&atom.storage_key())
    }

    /// Follow target -> source substitutions until reaching an atom that is
    /// not a target. Returns `atom` itself when it is not a target.
    pub fn substitute(&self, atom: &Atom) -> Atom {
        let mut current = atom;
        while let Some(source) = self.sources.get(&current.storage_key()) {
            current = source;
        }
        current.clone()
    }

    /// Whether `pairs` declares exactly the same target -> source entries,
    /// ignoring order.
    pub fn matches(&self, pairs: &[SyncPair]) -> bool {
        pairs.len() == self.sources.len()
            && pairs
                .iter()
                .all(|pair| self.source_of(&pair.target) == Some(&pair.source))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Entries as (target storage key, source) id pairs, in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (AtomId, AtomId)> + '_ {
        self.sources.iter().map(|(target, source)| (*target, source.id()))
    }
}

impl PartialEq for TargetMap {
    fn eq(&self, other: &Self) -> bool {
        let theirs: HashMap<AtomId, AtomId> = other.entries().collect();
        self.len() == other.len()
            && self
                .entries()
                .all(|(target, source)| theirs.get(&target) == Some(&source))
    }
}

impl Eq for TargetMap {}

impl Debug for TargetMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(source: &Atom, target: &Atom) -> SyncPair {
        SyncPair::new(source.clone(), target.clone()).unwrap()
    }

    #[test]
    fn read_only_atoms_cannot_be_paired() {
        let source = Atom::primitive(0);
        let read_only = Atom::derived(|_| Ok(json!(0)));
        assert_eq!(
            SyncPair::new(source, read_only.clone()).unwrap_err(),
            ScopeError::NotWritable { atom: read_only.id() }
        );
    }

    #[test]
    fn build_inverts_pairs() {
        let (s, t, other) = (Atom::primitive(0), Atom::primitive(0), Atom::primitive(0));
        let map = TargetMap::build(&[pair(&s, &t)]).unwrap();

        assert_eq!(map.len(), 1);
        assert!(map.is_target(&t));
        assert!(!map.is_target(&s));
        assert_eq!(map.source_of(&t), Some(&s));
        assert_eq!(map.substitute(&t), s);
        assert_eq!(map.substitute(&other), other);
    }

    #[test]
    fn scoped_clone_of_target_is_a_target() {
        let s = Atom::primitive(1);
        let t = Atom::with_write(0, |this, _, set, value| set.set(this, value));
        let map = TargetMap::build(&[pair(&s, &t)]).unwrap();

        let clone = t.routed_clone(t.kind().clone());
        let clone_of_clone = clone.routed_clone(clone.kind().clone());
        assert!(map.is_target(&clone));
        assert_eq!(map.source_of(&clone), Some(&s));
        assert_eq!(map.substitute(&clone), s);
        assert_eq!(map.substitute(&clone_of_clone), s);
    }

    #[test]
    fn many_targets_may_share_a_source() {
        let (s, t1, t2) = (Atom::primitive(0), Atom::primitive(0), Atom::primitive(0));
        let map = TargetMap::build(&[pair(&s, &t1), pair(&s, &t2)]).unwrap();
        assert_eq!(map.substitute(&t1), s);
        assert_eq!(map.substitute(&t2), s);
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let (s1, s2, t) = (Atom::primitive(0), Atom::primitive(0), Atom::primitive(0));
        assert_eq!(
            TargetMap::build(&[pair(&s1, &t), pair(&s2, &t)]).unwrap_err(),
            ScopeError::DuplicateTarget { target: t.id() }
        );
    }

    #[test]
    fn self_alias_is_a_cycle() {
        let a = Atom::primitive(0);
        assert_eq!(
            TargetMap::build(&[pair(&a, &a)]).unwrap_err(),
            ScopeError::AliasCycle { atom: a.id() }
        );
    }

    #[test]
    fn mutual_alias_is_a_cycle() {
        let (a, b) = (Atom::primitive(0), Atom::primitive(0));
        assert!(matches!(
            TargetMap::build(&[pair(&a, &b), pair(&b, &a)]),
            Err(ScopeError::AliasCycle { .. })
        ));
    }

    #[test]
    fn chains_resolve_to_their_terminus() {
        let (a, b, c) = (Atom::primitive(0), Atom::primitive(0), Atom::primitive(0));
        // c aliases b, b aliases a.
        let map = TargetMap::build(&[pair(&b, &c), pair(&a, &b)]).unwrap();
        assert_eq!(map.substitute(&c), a);
        assert_eq!(map.source_of(&c), Some(&b));
    }

    #[test]
    fn matches_ignores_order() {
        let (s1, t1, s2, t2) = (
            Atom::primitive(0),
            Atom::primitive(0),
            Atom::primitive(0),
            Atom::primitive(0),
        );
        let map = TargetMap::build(&[pair(&s1, &t1), pair(&s2, &t2)]).unwrap();

        assert!(map.matches(&[pair(&s2, &t2), pair(&s1, &t1)]));
        assert!(!map.matches(&[pair(&s1, &t1)]));
        assert!(!map.matches(&[pair(&s2, &t1), pair(&s1, &t2)]));
        assert!(!map.matches(&[pair(&s1, &t1), pair(&s1, &t1)]));
    }

    #[test]
    fn maps_compare_by_content() {
        let (s, t) = (Atom::primitive(0), Atom::primitive(0));
        let other = Atom::primitive(0);

        assert_eq!(TargetMap::default(), TargetMap::build(&[]).unwrap());
        assert_eq!(
            TargetMap::build(&[pair(&s, &t)]).unwrap(),
            TargetMap::build(&[pair(&s, &t)]).unwrap()
        );
        assert_ne!(
            TargetMap::build(&[pair(&s, &t)]).unwrap(),
            TargetMap::build(&[pair(&other, &t)]).unwrap()
        );
        assert_ne!(TargetMap::default(), TargetMap::build(&[pair(&s, &t)]).unwrap());
    }
}
