//! The fact-source capability the corpus builder consumes.
//!
//! A fact source turns a binary's debug information into primitive records:
//! per translation unit, a table of raw type descriptors keyed by a
//! source-local id, plus the exported symbols that reference them. The
//! builder never looks at ELF or DWARF itself.

pub mod dwarf;
pub mod elf;
pub mod memory;

use crate::corpus::{CorpusMetadata, DeclarationKind, SymbolInfo};
use crate::error::ExtractionError;
use crate::ir::{Enumerator, RecordKind};
use std::collections::HashMap;
use std::path::Path;

pub use dwarf::DwarfFactSource;
pub use memory::InMemoryFacts;

/// Source-local identifier of a raw type record (a DIE offset for DWARF).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawTypeId(pub u64);

/// A data member as reported by the fact source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMember {
    pub name: Option<String>,
    pub ty: RawTypeId,
    pub offset_bits: u64,
}

/// A raw type descriptor. `None` targets stand for `void`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawType {
    Base {
        name: String,
        size: u64,
    },
    /// Types the producer could not describe further (`decltype(nullptr)`).
    Unspecified {
        name: String,
    },
    Pointer {
        target: Option<RawTypeId>,
    },
    Reference {
        target: RawTypeId,
    },
    Const {
        target: Option<RawTypeId>,
    },
    Volatile {
        target: Option<RawTypeId>,
    },
    Restrict {
        target: Option<RawTypeId>,
    },
    Typedef {
        name: String,
        target: Option<RawTypeId>,
    },
    Array {
        element: RawTypeId,
        count: Option<u64>,
    },
    Record {
        kind: RecordKind,
        name: Option<String>,
        size: Option<u64>,
        members: Vec<RawMember>,
        /// Forward declaration only (`struct foo;`).
        declaration: bool,
    },
    Enumeration {
        name: Option<String>,
        size: u64,
        underlying: Option<RawTypeId>,
        enumerators: Vec<Enumerator>,
    },
    Subroutine {
        return_type: Option<RawTypeId>,
        params: Vec<RawTypeId>,
        variadic: bool,
    },
}

/// An exported function or variable as reported by the fact source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSymbol {
    pub linkage_name: String,
    pub name: Option<String>,
    pub kind: DeclarationKind,
    /// A `Subroutine` for functions; the variable's type otherwise.
    pub type_id: RawTypeId,
    pub symbol: SymbolInfo,
}

/// All facts from one translation unit.
#[derive(Debug, Clone, Default)]
pub struct RawUnit {
    pub name: String,
    pub language: Option<String>,
    pub types: HashMap<RawTypeId, RawType>,
    pub symbols: Vec<RawSymbol>,
}

/// Capability the corpus builder extracts from.
///
/// Implementations must be `Sync`: the builder may hand units to worker
/// threads, though it only calls these methods from the calling thread.
pub trait FactSource: Sync {
    /// Path of the binary (or a label for synthetic sources), used in errors.
    fn origin(&self) -> &Path;

    /// `false` when the binary carries no debug information at all.
    fn has_debug_info(&self) -> bool;

    fn metadata(&self) -> Result<CorpusMetadata, ExtractionError>;

    fn translation_units(&self) -> Result<Vec<RawUnit>, ExtractionError>;
}
