//! A fact source assembled in memory.
//!
//! Used by tests and benches, and by tools that already hold extracted
//! facts from another reader.

use super::{FactSource, RawMember, RawSymbol, RawType, RawTypeId, RawUnit};
use crate::corpus::{CorpusMetadata, DeclarationKind, SymbolInfo};
use crate::error::ExtractionError;
use crate::ir::{Enumerator, RecordKind};
use std::path::{Path, PathBuf};

/// In-memory `FactSource`.
#[derive(Debug, Clone)]
pub struct InMemoryFacts {
    origin: PathBuf,
    debug_info: bool,
    metadata: CorpusMetadata,
    units: Vec<RawUnit>,
    next_id: u64,
}

impl InMemoryFacts {
    pub fn new(origin: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            debug_info: true,
            metadata: CorpusMetadata::default(),
            units: Vec::new(),
            next_id: 1,
        }
    }

    /// Model a stripped binary.
    pub fn without_debug_info(mut self) -> Self {
        self.debug_info = false;
        self
    }

    pub fn metadata_mut(&mut self) -> &mut CorpusMetadata {
        &mut self.metadata
    }

    /// Start a new translation unit and return a builder for it.
    pub fn unit(&mut self, name: &str) -> UnitBuilder<'_> {
        self.units.push(RawUnit {
            name: name.to_string(),
            ..RawUnit::default()
        });
        let index = self.units.len() - 1;
        UnitBuilder { facts: self, index }
    }

    /// Reopen an existing unit by position.
    pub fn unit_at(&mut self, index: usize) -> Option<UnitBuilder<'_>> {
        if index < self.units.len() {
            Some(UnitBuilder { facts: self, index })
        } else {
            None
        }
    }
}

impl FactSource for InMemoryFacts {
    fn origin(&self) -> &Path {
        &self.origin
    }

    fn has_debug_info(&self) -> bool {
        self.debug_info
    }

    fn metadata(&self) -> Result<CorpusMetadata, ExtractionError> {
        Ok(self.metadata.clone())
    }

    fn translation_units(&self) -> Result<Vec<RawUnit>, ExtractionError> {
        if !self.debug_info {
            return Err(ExtractionError::NoDebugInfo {
                path: self.origin.clone(),
            });
        }
        Ok(self.units.clone())
    }
}

/// Adds type records and symbols to one unit. Ids are unique across the
/// whole fact set, mirroring DWARF section offsets.
pub struct UnitBuilder<'a> {
    facts: &'a mut InMemoryFacts,
    index: usize,
}

impl UnitBuilder<'_> {
    fn raw(&mut self) -> &mut RawUnit {
        &mut self.facts.units[self.index]
    }

    /// Allocate an id without a record yet (for self-referential records).
    pub fn reserve(&mut self) -> RawTypeId {
        let id = RawTypeId(self.facts.next_id);
        self.facts.next_id += 1;
        id
    }

    /// Store `ty` under an explicit id.
    pub fn set(&mut self, id: RawTypeId, ty: RawType) -> RawTypeId {
        self.raw().types.insert(id, ty);
        id
    }

    pub fn add(&mut self, ty: RawType) -> RawTypeId {
        let id = self.reserve();
        self.set(id, ty)
    }

    pub fn language(&mut self, language: &str) -> &mut Self {
        self.raw().language = Some(language.to_string());
        self
    }

    pub fn base(&mut self, name: &str, size: u64) -> RawTypeId {
        self.add(RawType::Base {
            name: name.to_string(),
            size,
        })
    }

    pub fn pointer(&mut self, target: Option<RawTypeId>) -> RawTypeId {
        self.add(RawType::Pointer { target })
    }

    pub fn const_of(&mut self, target: RawTypeId) -> RawTypeId {
        self.add(RawType::Const {
            target: Some(target),
        })
    }

    pub fn volatile_of(&mut self, target: RawTypeId) -> RawTypeId {
        self.add(RawType::Volatile {
            target: Some(target),
        })
    }

    pub fn typedef(&mut self, name: &str, target: RawTypeId) -> RawTypeId {
        self.add(RawType::Typedef {
            name: name.to_string(),
            target: Some(target),
        })
    }

    pub fn array(&mut self, element: RawTypeId, count: Option<u64>) -> RawTypeId {
        self.add(RawType::Array { element, count })
    }

    /// A struct with `(name, type, offset in bytes)` members.
    pub fn structure(
        &mut self,
        name: Option<&str>,
        size: u64,
        members: &[(&str, RawTypeId, u64)],
    ) -> RawTypeId {
        let id = self.reserve();
        self.define_record(id, RecordKind::Struct, name, size, members)
    }

    /// Fill a reserved id with a record body; members as in `structure`.
    pub fn define_record(
        &mut self,
        id: RawTypeId,
        kind: RecordKind,
        name: Option<&str>,
        size: u64,
        members: &[(&str, RawTypeId, u64)],
    ) -> RawTypeId {
        let members = members
            .iter()
            .map(|(n, ty, offset)| RawMember {
                name: if n.is_empty() {
                    None
                } else {
                    Some(n.to_string())
                },
                ty: *ty,
                offset_bits: offset * 8,
            })
            .collect();
        self.set(
            id,
            RawType::Record {
                kind,
                name: name.map(str::to_string),
                size: Some(size),
                members,
                declaration: false,
            },
        )
    }

    /// `struct name;` with no body.
    pub fn forward_declaration(&mut self, kind: RecordKind, name: &str) -> RawTypeId {
        self.add(RawType::Record {
            kind,
            name: Some(name.to_string()),
            size: None,
            members: Vec::new(),
            declaration: true,
        })
    }

    pub fn enumeration(
        &mut self,
        name: Option<&str>,
        underlying: RawTypeId,
        enumerators: &[(&str, i64)],
    ) -> RawTypeId {
        self.add(RawType::Enumeration {
            name: name.map(str::to_string),
            size: 4,
            underlying: Some(underlying),
            enumerators: enumerators
                .iter()
                .map(|(n, v)| Enumerator {
                    name: n.to_string(),
                    value: *v,
                })
                .collect(),
        })
    }

    pub fn function_type(
        &mut self,
        return_type: Option<RawTypeId>,
        params: &[RawTypeId],
        variadic: bool,
    ) -> RawTypeId {
        self.add(RawType::Subroutine {
            return_type,
            params: params.to_vec(),
            variadic,
        })
    }

    /// Export a function whose type is the `Subroutine` record `ty`.
    pub fn function(&mut self, linkage_name: &str, ty: RawTypeId) -> &mut Self {
        self.symbol(RawSymbol {
            linkage_name: linkage_name.to_string(),
            name: None,
            kind: DeclarationKind::Function,
            type_id: ty,
            symbol: SymbolInfo::default(),
        })
    }

    pub fn variable(&mut self, linkage_name: &str, ty: RawTypeId) -> &mut Self {
        self.symbol(RawSymbol {
            linkage_name: linkage_name.to_string(),
            name: None,
            kind: DeclarationKind::Variable,
            type_id: ty,
            symbol: SymbolInfo::default(),
        })
    }

    pub fn symbol(&mut self, symbol: RawSymbol) -> &mut Self {
        self.raw().symbols.push(symbol);
        self
    }
}
