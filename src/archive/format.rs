//! On-disk records of the corpus archive.
//!
//! ```json
//! { "format": "abispack-corpus", "version": 1, "checksum": "<sha256>",
//!   "body": { "corpus": {..}, "translation_units": [..],
//!             "types": [ { "id": 0, "kind": "fundamental", "name": "int", "size": 4 }, .. ],
//!             "declarations": [ { "linkage_name": "f", "kind": "function", "type": 3, "unit": 0, .. } ] } }
//! ```
//!
//! Type ids are local to one archive and carry no meaning outside it.

use crate::corpus::{CorpusMetadata, DeclarationKind, SymbolInfo, TranslationUnit};
use crate::ir::{Enumerator, RecordKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Value of the `format` field.
pub const FORMAT_TAG: &str = "abispack-corpus";
/// The only archive version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

/// Fields read before the body, so an unknown version is rejected up front.
#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub format: Option<String>,
    pub version: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Envelope<'a> {
    pub format: &'static str,
    pub version: u32,
    pub checksum: String,
    pub body: &'a Body,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Body {
    pub corpus: CorpusMetadata,
    pub translation_units: Vec<TranslationUnit>,
    pub types: Vec<TypeRecord>,
    pub declarations: Vec<DeclarationRecord>,
}

impl Body {
    /// Hex SHA-256 of the compact serialization of the body.
    pub fn checksum(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TypeRecord {
    pub id: u32,
    #[serde(flatten)]
    pub shape: TypeShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum TypeShape {
    Fundamental {
        name: String,
        size: u64,
    },
    Qualified {
        base: u32,
        qualifiers: Vec<String>,
    },
    Pointer {
        pointee: u32,
    },
    Array {
        element: u32,
        bound: Option<u64>,
    },
    Record {
        record_kind: RecordKind,
        name: Option<String>,
        size: Option<u64>,
        fields: Vec<FieldRecord>,
        declaration_only: bool,
    },
    Enum {
        name: Option<String>,
        underlying: u32,
        enumerators: Vec<Enumerator>,
    },
    Function {
        return_type: u32,
        params: Vec<u32>,
        variadic: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct FieldRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: u32,
    pub offset_bits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DeclarationRecord {
    pub linkage_name: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: DeclarationKind,
    #[serde(rename = "type")]
    pub ty: u32,
    pub unit: usize,
    #[serde(default)]
    pub symbol: SymbolInfo,
}
