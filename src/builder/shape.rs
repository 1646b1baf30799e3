//! Structural digests of named records.
//!
//! Two translation units may give one tag different bodies (`struct S` is
//! private to each `.c` file, or differs between inline namespaces). Each
//! complete named record is digested over its whole reachable shape so the
//! builder can keep such bodies apart. Typedefs are transparent; cycles are
//! digested as a back-reference distance so the digest does not depend on
//! where the walk entered the cycle.

use crate::facts::{RawType, RawTypeId, RawUnit};
use crate::ir::RecordKind;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};

type RecordName = (RecordKind, String);

/// Digest of every complete named record, plus the distinct digests per tag.
#[derive(Debug, Default)]
pub(crate) struct RecordVariants {
    by_id: HashMap<RawTypeId, u64>,
    by_name: HashMap<RecordName, BTreeMap<u64, RawTypeId>>,
}

impl RecordVariants {
    pub(crate) fn collect(
        units: &[RawUnit],
        global: &HashMap<RawTypeId, &RawType>,
        parallel: bool,
    ) -> Self {
        let per_unit = |unit: &RawUnit| -> Vec<(RawTypeId, RecordName, u64)> {
            let mut digester = Digester::new(global);
            let mut found: Vec<_> = unit
                .types
                .iter()
                .filter_map(|(id, ty)| match ty {
                    RawType::Record {
                        kind,
                        name: Some(name),
                        declaration: false,
                        ..
                    } => Some((*id, (*kind, name.clone()))),
                    _ => None,
                })
                .collect();
            found.sort_by_key(|(id, _)| *id);
            found
                .into_iter()
                .map(|(id, name)| {
                    let (digest, _) = digester.digest(id);
                    (id, name, digest)
                })
                .collect()
        };
        let digests: Vec<Vec<_>> = if parallel {
            units.par_iter().map(per_unit).collect()
        } else {
            units.iter().map(per_unit).collect()
        };

        let mut variants = Self::default();
        for (id, name, digest) in digests.into_iter().flatten() {
            variants.by_id.insert(id, digest);
            let representative = variants
                .by_name
                .entry(name)
                .or_default()
                .entry(digest)
                .or_insert(id);
            *representative = (*representative).min(id);
        }
        variants
    }

    /// Digest of a complete named record.
    pub(crate) fn fingerprint(&self, id: RawTypeId) -> Option<u64> {
        self.by_id.get(&id).copied()
    }

    /// The one definition a declaration of this tag can stand for, if any.
    pub(crate) fn unique_definition(&self, kind: RecordKind, name: &str) -> Option<RawTypeId> {
        let bodies = self.by_name.get(&(kind, name.to_string()))?;
        match bodies.len() {
            1 => bodies.values().next().copied(),
            _ => None,
        }
    }

    pub(crate) fn variant_count(&self, kind: RecordKind, name: &str) -> usize {
        self.by_name
            .get(&(kind, name.to_string()))
            .map_or(0, BTreeMap::len)
    }
}

struct Digester<'a> {
    global: &'a HashMap<RawTypeId, &'a RawType>,
    /// Digests that do not refer back above their own node.
    memo: HashMap<RawTypeId, u64>,
    /// Node to its depth on the current walk.
    path: HashMap<RawTypeId, usize>,
}

impl<'a> Digester<'a> {
    fn new(global: &'a HashMap<RawTypeId, &'a RawType>) -> Self {
        Self {
            global,
            memo: HashMap::new(),
            path: HashMap::new(),
        }
    }

    /// Follow typedef chains to the first non-typedef node.
    fn strip(&self, mut id: RawTypeId) -> Option<RawTypeId> {
        let mut seen = HashSet::new();
        while let Some(RawType::Typedef { target, .. }) = self.global.get(&id).copied() {
            if !seen.insert(id) {
                return Some(id);
            }
            id = (*target)?;
        }
        Some(id)
    }

    fn digest_opt(&mut self, id: Option<RawTypeId>, hasher: &mut DefaultHasher, low: &mut usize) {
        match id.and_then(|id| self.strip(id)) {
            Some(id) => {
                let (digest, reach) = self.digest(id);
                digest.hash(hasher);
                *low = (*low).min(reach);
            }
            None => "void".hash(hasher),
        }
    }

    /// Returns the digest and the shallowest depth the subtree refers back to.
    fn digest(&mut self, id: RawTypeId) -> (u64, usize) {
        if let Some(digest) = self.memo.get(&id) {
            return (*digest, usize::MAX);
        }
        let depth = self.path.len();
        if let Some(&pos) = self.path.get(&id) {
            let mut hasher = DefaultHasher::new();
            ("back", depth - pos).hash(&mut hasher);
            return (hasher.finish(), pos);
        }
        let Some(raw) = self.global.get(&id).copied() else {
            let mut hasher = DefaultHasher::new();
            ("missing", id.0).hash(&mut hasher);
            return (hasher.finish(), usize::MAX);
        };

        self.path.insert(id, depth);
        let mut hasher = DefaultHasher::new();
        let mut low = usize::MAX;
        match raw {
            RawType::Base { name, size } => ("base", name, size).hash(&mut hasher),
            RawType::Unspecified { name } => ("unspecified", name).hash(&mut hasher),
            RawType::Pointer { target } => {
                "ptr".hash(&mut hasher);
                self.digest_opt(*target, &mut hasher, &mut low);
            }
            RawType::Reference { target } => {
                "ptr".hash(&mut hasher);
                self.digest_opt(Some(*target), &mut hasher, &mut low);
            }
            RawType::Const { target } => {
                "const".hash(&mut hasher);
                self.digest_opt(*target, &mut hasher, &mut low);
            }
            RawType::Volatile { target } => {
                "volatile".hash(&mut hasher);
                self.digest_opt(*target, &mut hasher, &mut low);
            }
            RawType::Restrict { target } => {
                "restrict".hash(&mut hasher);
                self.digest_opt(*target, &mut hasher, &mut low);
            }
            RawType::Typedef { target, .. } => {
                self.digest_opt(*target, &mut hasher, &mut low);
            }
            RawType::Array { element, count } => {
                ("array", count).hash(&mut hasher);
                self.digest_opt(Some(*element), &mut hasher, &mut low);
            }
            RawType::Record {
                kind,
                name,
                declaration: true,
                ..
            } => ("decl", kind, name).hash(&mut hasher),
            RawType::Record {
                kind,
                name,
                size,
                members,
                ..
            } => {
                ("record", kind, name, size, members.len()).hash(&mut hasher);
                for member in members {
                    (&member.name, member.offset_bits).hash(&mut hasher);
                    self.digest_opt(Some(member.ty), &mut hasher, &mut low);
                }
            }
            RawType::Enumeration {
                name,
                size,
                underlying,
                enumerators,
            } => {
                ("enum", name, size, enumerators).hash(&mut hasher);
                self.digest_opt(*underlying, &mut hasher, &mut low);
            }
            RawType::Subroutine {
                return_type,
                params,
                variadic,
            } => {
                ("fn", variadic, params.len()).hash(&mut hasher);
                self.digest_opt(*return_type, &mut hasher, &mut low);
                for param in params {
                    self.digest_opt(Some(*param), &mut hasher, &mut low);
                }
            }
        }
        self.path.remove(&id);

        let digest = hasher.finish();
        if low >= depth {
            self.memo.insert(id, digest);
        }
        (digest, low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::InMemoryFacts;

    fn variants(facts: &InMemoryFacts) -> RecordVariants {
        let units = crate::facts::FactSource::translation_units(facts).unwrap();
        let global: HashMap<RawTypeId, &RawType> = units
            .iter()
            .flat_map(|u| u.types.iter().map(|(id, ty)| (*id, ty)))
            .collect();
        RecordVariants::collect(&units, &global, false)
    }

    #[test]
    fn test_identical_bodies_share_a_variant() {
        let mut facts = InMemoryFacts::new("libsame.so");
        for file in ["a.c", "b.c"] {
            let mut unit = facts.unit(file);
            let int = unit.base("int", 4);
            let alias = unit.typedef("count_t", int);
            unit.structure(Some("S"), 4, &[("a", alias, 0)]);
        }
        let mut other = facts.unit("c.c");
        let int = other.base("int", 4);
        other.structure(Some("S"), 4, &[("a", int, 0)]);

        let found = variants(&facts);
        assert_eq!(found.variant_count(RecordKind::Struct, "S"), 1);
        assert!(found.unique_definition(RecordKind::Struct, "S").is_some());
    }

    #[test]
    fn test_different_bodies_are_separate_variants() {
        let mut facts = InMemoryFacts::new("libsplit.so");
        let mut a = facts.unit("a.c");
        let int = a.base("int", 4);
        a.structure(Some("S"), 4, &[("a", int, 0)]);
        let mut b = facts.unit("b.c");
        let long = b.base("long", 8);
        b.structure(Some("S"), 8, &[("b", long, 0)]);

        let found = variants(&facts);
        assert_eq!(found.variant_count(RecordKind::Struct, "S"), 2);
        assert_eq!(found.unique_definition(RecordKind::Struct, "S"), None);
    }

    #[test]
    fn test_cycle_digest_is_entry_independent() {
        let mut facts = InMemoryFacts::new("liblist.so");
        for file in ["a.c", "b.c"] {
            let mut unit = facts.unit(file);
            let node = unit.reserve();
            let next = unit.pointer(Some(node));
            let int = unit.base("int", 4);
            unit.define_record(
                node,
                RecordKind::Struct,
                Some("node"),
                16,
                &[("value", int, 0), ("next", next, 8)],
            );
        }
        assert_eq!(variants(&facts).variant_count(RecordKind::Struct, "node"), 1);
    }
}
