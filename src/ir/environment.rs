//! The per-analysis arena that owns every canonical type.
//!
//! Interning is hash-consed: structurally equal descriptors map to one
//! `TypeRef`. Named records go through a reservation step first so that
//! self-referential members (`struct node { struct node *next; }`) and
//! references from other translation units resolve to the same handle
//! before the record's body is known. A reservation is keyed by kind, name,
//! and an optional body variant: two units that give the same tag different
//! bodies reserve different variants and end up with different handles.
//!
//! The canonical table sits behind a `RwLock`. Lookups of already-interned
//! types only take the read side; insertion re-checks under the write side so
//! concurrent builders interning the same anonymous shape converge on one
//! handle.

use super::types::{Qualifiers, RecordKind, Type, TypeRef};
use crate::error::CorpusIntegrityError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

#[derive(Debug, Clone)]
enum Slot {
    /// A named record whose body has not been published yet.
    Reserved { kind: RecordKind, name: String },
    Ready(Arc<Type>),
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    canonical: HashMap<Type, TypeRef>,
    named_records: HashMap<RecordKey, TypeRef>,
}

/// Identity of a named record slot. `variant` separates distinct bodies
/// that share one tag; `None` is the plain by-name slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    kind: RecordKind,
    name: String,
    variant: Option<u64>,
}

impl Arena {
    fn push(&mut self, slot: Slot) -> TypeRef {
        let handle = TypeRef(self.slots.len() as u32);
        self.slots.push(slot);
        handle
    }

    fn ready(&self, handle: TypeRef) -> Option<&Arc<Type>> {
        match self.slots.get(handle.index()) {
            Some(Slot::Ready(ty)) => Some(ty),
            _ => None,
        }
    }

    /// Collapse `Qualified(Qualified(..))` and drop empty qualifier sets.
    fn normalize(&self, ty: Type) -> std::result::Result<Type, TypeRef> {
        match ty {
            Type::Qualified { base, qualifiers } if qualifiers.is_empty() => Err(base),
            Type::Qualified { base, qualifiers } => match self.ready(base).map(|t| t.as_ref()) {
                Some(Type::Qualified {
                    base: inner,
                    qualifiers: inner_q,
                }) => Ok(Type::Qualified {
                    base: *inner,
                    qualifiers: qualifiers | *inner_q,
                }),
                _ => Ok(Type::Qualified { base, qualifiers }),
            },
            other => Ok(other),
        }
    }
}

/// Outcome of reserving a named record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// This caller created the slot.
    Fresh(TypeRef),
    /// Another caller (or an earlier unit) already reserved this record.
    Existing(TypeRef),
}

impl Reservation {
    pub fn handle(self) -> TypeRef {
        match self {
            Reservation::Fresh(h) | Reservation::Existing(h) => h,
        }
    }
}

/// Owns all canonical types of one corpus.
#[derive(Debug, Default)]
pub struct Environment {
    arena: RwLock<Arena>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the canonical handle for `ty`, creating it if absent.
    ///
    /// Component handles inside `ty` must already belong to this environment.
    /// A named record is canonical by its by-name slot: interning a second
    /// body under an existing name returns the first handle.
    pub fn intern(&self, ty: Type) -> TypeRef {
        let ty = {
            let arena = self.read();
            let ty = match arena.normalize(ty) {
                Ok(ty) => ty,
                Err(base) => return base,
            };
            if let Some(existing) = arena.canonical.get(&ty) {
                return *existing;
            }
            ty
        };

        let mut arena = self.write();
        if let Some(existing) = arena.canonical.get(&ty) {
            return *existing;
        }
        let named_key = match &ty {
            Type::Record {
                kind,
                name: Some(name),
                ..
            } => Some(RecordKey {
                kind: *kind,
                name: name.clone(),
                variant: None,
            }),
            _ => None,
        };
        if let Some(key) = named_key {
            if let Some(existing) = arena.named_records.get(&key).copied() {
                // First body wins; a still-reserved slot takes this one.
                if matches!(arena.slots[existing.index()], Slot::Reserved { .. }) {
                    arena.slots[existing.index()] = Slot::Ready(Arc::new(ty.clone()));
                    arena.canonical.insert(ty, existing);
                }
                return existing;
            }
            let handle = arena.push(Slot::Ready(Arc::new(ty.clone())));
            arena.named_records.insert(key, handle);
            arena.canonical.insert(ty, handle);
            return handle;
        }
        let handle = arena.push(Slot::Ready(Arc::new(ty.clone())));
        trace!(handle = handle.raw(), kind = ty.kind_name(), "interned type");
        arena.canonical.insert(ty, handle);
        handle
    }

    /// Reserve (or look up) the handle for a named record before its body is built.
    pub fn reserve_record(&self, kind: RecordKind, name: &str) -> Reservation {
        self.reserve_record_variant(kind, name, None)
    }

    /// Like `reserve_record`, but one slot per body `variant` of the tag.
    pub fn reserve_record_variant(
        &self,
        kind: RecordKind,
        name: &str,
        variant: Option<u64>,
    ) -> Reservation {
        let key = RecordKey {
            kind,
            name: name.to_string(),
            variant,
        };
        if let Some(existing) = self.read().named_records.get(&key) {
            return Reservation::Existing(*existing);
        }
        let mut arena = self.write();
        if let Some(existing) = arena.named_records.get(&key) {
            return Reservation::Existing(*existing);
        }
        let handle = arena.push(Slot::Reserved {
            kind,
            name: name.to_string(),
        });
        arena.named_records.insert(key, handle);
        Reservation::Fresh(handle)
    }

    /// A reserved record slot that no other lookup will ever return.
    pub fn fresh_record(&self, kind: RecordKind, name: &str) -> TypeRef {
        self.write().push(Slot::Reserved {
            kind,
            name: name.to_string(),
        })
    }

    /// Whether the slot behind `handle` has a published body.
    pub fn is_defined(&self, handle: TypeRef) -> bool {
        self.read().ready(handle).is_some()
    }

    /// Publish the body of a reserved record.
    ///
    /// Returns `Ok(false)` when another caller already published a body for
    /// this slot; the first body wins.
    pub fn define(&self, handle: TypeRef, ty: Type) -> Result<bool, CorpusIntegrityError> {
        let mut arena = self.write();
        match arena.slots.get(handle.index()) {
            None => Err(CorpusIntegrityError::DanglingTypeReference {
                type_ref: handle.raw(),
                context: "define on a handle outside the environment".to_string(),
            }),
            Some(Slot::Ready(_)) => Ok(false),
            Some(Slot::Reserved { .. }) => {
                arena.slots[handle.index()] = Slot::Ready(Arc::new(ty.clone()));
                arena.canonical.entry(ty).or_insert(handle);
                Ok(true)
            }
        }
    }

    /// Turn every still-reserved record into a declaration-only record.
    ///
    /// Called once building is complete; afterwards every handle resolves.
    pub fn seal(&self) -> usize {
        let mut arena = self.write();
        let mut sealed = 0;
        for idx in 0..arena.slots.len() {
            let Slot::Reserved { kind, name } = arena.slots[idx].clone() else {
                continue;
            };
            let ty = Type::Record {
                kind,
                name: Some(name),
                size: None,
                fields: Vec::new(),
                declaration_only: true,
            };
            arena.slots[idx] = Slot::Ready(Arc::new(ty.clone()));
            arena.canonical.entry(ty).or_insert(TypeRef(idx as u32));
            sealed += 1;
        }
        sealed
    }

    /// The type behind `handle`, or `None` if it is unknown or still reserved.
    pub fn get(&self, handle: TypeRef) -> Option<Arc<Type>> {
        self.read().ready(handle).cloned()
    }

    /// Like `get`, but a missing type is an integrity error.
    pub fn resolve(&self, handle: TypeRef) -> Result<Arc<Type>, CorpusIntegrityError> {
        self.get(handle)
            .ok_or_else(|| CorpusIntegrityError::DanglingTypeReference {
                type_ref: handle.raw(),
                context: "type is not defined in this environment".to_string(),
            })
    }

    /// Split a handle into its unqualified base and the qualifiers applied to it.
    pub fn strip_qualifiers(&self, handle: TypeRef) -> (TypeRef, Qualifiers) {
        match self.get(handle).as_deref() {
            Some(Type::Qualified { base, qualifiers }) => (*base, *qualifiers),
            _ => (handle, Qualifiers::empty()),
        }
    }

    pub fn len(&self) -> usize {
        self.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every published type in handle order.
    pub fn types(&self) -> Vec<(TypeRef, Arc<Type>)> {
        let arena = self.read();
        arena
            .slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Slot::Ready(ty) => Some((TypeRef(idx as u32), ty.clone())),
                Slot::Reserved { .. } => None,
            })
            .collect()
    }

    pub fn fundamental(&self, name: &str, size: u64) -> TypeRef {
        self.intern(Type::Fundamental {
            name: name.to_string(),
            size,
        })
    }

    pub fn void(&self) -> TypeRef {
        self.intern(Type::void())
    }

    pub fn pointer_to(&self, pointee: TypeRef) -> TypeRef {
        self.intern(Type::Pointer { pointee })
    }

    pub fn array_of(&self, element: TypeRef, bound: Option<u64>) -> TypeRef {
        self.intern(Type::Array { element, bound })
    }

    pub fn qualified(&self, base: TypeRef, qualifiers: Qualifiers) -> TypeRef {
        self.intern(Type::Qualified { base, qualifiers })
    }
}
