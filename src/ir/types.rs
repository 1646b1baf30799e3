//! The closed set of type shapes an ABI corpus is made of.
//!
//! Every composite variant refers to its components through `TypeRef`
//! handles owned by an `Environment`, so structural equality of two `Type`
//! values reduces to handle equality of components plus equality of the
//! shape metadata (bounds, offsets, qualifiers).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a canonical type inside one `Environment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeRef(pub(crate) u32);

impl TypeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags! {
    /// cv-qualifiers (plus C99 `restrict`) applied to a type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct Qualifiers: u8 {
        const CONST = 0b001;
        const VOLATILE = 0b010;
        const RESTRICT = 0b100;
    }
}

impl Qualifiers {
    /// Keyword spelling, in declaration order (`const volatile restrict`).
    pub fn keywords(self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.contains(Qualifiers::CONST) {
            out.push("const");
        }
        if self.contains(Qualifiers::VOLATILE) {
            out.push("volatile");
        }
        if self.contains(Qualifiers::RESTRICT) {
            out.push("restrict");
        }
        out
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "const" => Some(Qualifiers::CONST),
            "volatile" => Some(Qualifiers::VOLATILE),
            "restrict" => Some(Qualifiers::RESTRICT),
            _ => None,
        }
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = self.keywords();
        if words.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", words.join(" "))
        }
    }
}

/// Which C/C++ aggregate keyword introduced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Struct,
    Class,
    Union,
}

impl RecordKind {
    pub fn keyword(self) -> &'static str {
        match self {
            RecordKind::Struct => "struct",
            RecordKind::Class => "class",
            RecordKind::Union => "union",
        }
    }
}

/// A data member of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Member name; empty for anonymous members.
    pub name: String,
    pub ty: TypeRef,
    /// Offset from the start of the record, in bits.
    pub offset_bits: u64,
}

/// A named constant of an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enumerator {
    pub name: String,
    pub value: i64,
}

/// A canonical type. Matched exhaustively wherever types are compared,
/// rendered, or serialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Base types (`int`, `double`, `void`...). Size in bytes.
    Fundamental { name: String, size: u64 },
    /// A base type with cv-qualifiers. Never nested, never empty.
    Qualified { base: TypeRef, qualifiers: Qualifiers },
    /// Pointers and C++ references.
    Pointer { pointee: TypeRef },
    /// `bound` is part of identity: `int[5]` and `int[2]` are distinct types.
    Array { element: TypeRef, bound: Option<u64> },
    Record {
        kind: RecordKind,
        /// `None` for anonymous records, which are identified by shape only.
        name: Option<String>,
        /// Size in bytes when known.
        size: Option<u64>,
        fields: Vec<Field>,
        /// Only a forward declaration was ever seen.
        declaration_only: bool,
    },
    Enum {
        name: Option<String>,
        underlying: TypeRef,
        enumerators: Vec<Enumerator>,
    },
    FunctionType {
        return_type: TypeRef,
        params: Vec<TypeRef>,
        variadic: bool,
    },
}

impl Type {
    pub fn void() -> Self {
        Type::Fundamental {
            name: "void".to_string(),
            size: 0,
        }
    }

    /// Short tag used in reports and the archive.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Type::Fundamental { .. } => "fundamental",
            Type::Qualified { .. } => "qualified",
            Type::Pointer { .. } => "pointer",
            Type::Array { .. } => "array",
            Type::Record { .. } => "record",
            Type::Enum { .. } => "enum",
            Type::FunctionType { .. } => "function",
        }
    }

    /// Source-level name for named records and enums.
    pub fn name(&self) -> Option<&str> {
        match self {
            Type::Fundamental { name, .. } => Some(name),
            Type::Record { name, .. } | Type::Enum { name, .. } => name.as_deref(),
            _ => None,
        }
    }

    /// Handles this type refers to, in declaration order.
    pub fn components(&self) -> Vec<TypeRef> {
        match self {
            Type::Fundamental { .. } => Vec::new(),
            Type::Qualified { base, .. } => vec![*base],
            Type::Pointer { pointee } => vec![*pointee],
            Type::Array { element, .. } => vec![*element],
            Type::Record { fields, .. } => fields.iter().map(|f| f.ty).collect(),
            Type::Enum { underlying, .. } => vec![*underlying],
            Type::FunctionType {
                return_type,
                params,
                ..
            } => {
                let mut out = Vec::with_capacity(params.len() + 1);
                out.push(*return_type);
                out.extend(params.iter().copied());
                out
            }
        }
    }
}
