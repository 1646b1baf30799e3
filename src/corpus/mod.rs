//! The extracted ABI of one binary.
//!
//! A `Corpus` pairs an `Environment` (all canonical types) with the
//! declarations the binary exports, grouped by translation unit. It is
//! immutable once built; the diff engine only reads it.

use crate::ir::{Environment, TypeRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Whether an exported name is code or data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Function,
    Variable,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Function => write!(f, "function"),
            DeclarationKind::Variable => write!(f, "variable"),
        }
    }
}

/// ELF symbol binding of an exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolBinding {
    #[default]
    Global,
    Weak,
}

/// ELF symbol visibility of an exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolVisibility {
    #[default]
    Default,
    Protected,
    Hidden,
    Internal,
}

/// Link-level facts about a declaration's symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub binding: SymbolBinding,
    pub visibility: SymbolVisibility,
    /// Symbol version such as `GLIBC_2.2.5`, when versioned.
    pub version: Option<String>,
}

/// Index of a translation unit inside its corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub usize);

/// A named group of declarations sharing one source origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub name: String,
    /// Source language as reported by the producer, when known.
    pub language: Option<String>,
}

/// A function or global variable exposed at link time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub linkage_name: String,
    /// Source-level name, when different from the linkage name.
    pub name: Option<String>,
    pub kind: DeclarationKind,
    /// For functions, a `FunctionType`; for variables, the variable's type.
    pub ty: TypeRef,
    pub defined_in: UnitId,
    pub symbol: SymbolInfo,
}

/// Binary-level facts that accompany the declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorpusMetadata {
    /// Path of the binary the corpus was extracted from.
    pub path: Option<PathBuf>,
    pub architecture: Option<String>,
    pub soname: Option<String>,
    /// `DT_NEEDED` entries, in dynamic-section order.
    pub needed: Vec<String>,
}

/// The extracted, structured ABI of one binary.
#[derive(Debug)]
pub struct Corpus {
    pub metadata: CorpusMetadata,
    environment: Arc<Environment>,
    translation_units: Vec<TranslationUnit>,
    declarations: BTreeMap<String, Declaration>,
}

impl Corpus {
    /// Assemble a corpus. Callers guarantee every declaration's type and unit
    /// index belong to `environment` and `translation_units`.
    pub(crate) fn from_parts(
        metadata: CorpusMetadata,
        environment: Arc<Environment>,
        translation_units: Vec<TranslationUnit>,
        declarations: BTreeMap<String, Declaration>,
    ) -> Self {
        Self {
            metadata,
            environment,
            translation_units,
            declarations,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn translation_units(&self) -> &[TranslationUnit] {
        &self.translation_units
    }

    pub fn translation_unit(&self, id: UnitId) -> Option<&TranslationUnit> {
        self.translation_units.get(id.0)
    }

    /// Exported declarations keyed (and ordered) by linkage name.
    pub fn declarations(&self) -> &BTreeMap<String, Declaration> {
        &self.declarations
    }

    pub fn declaration(&self, linkage_name: &str) -> Option<&Declaration> {
        self.declarations.get(linkage_name)
    }

    /// Declarations defined in one translation unit.
    pub fn declarations_in(&self, unit: UnitId) -> impl Iterator<Item = &Declaration> {
        self.declarations
            .values()
            .filter(move |d| d.defined_in == unit)
    }

    /// Label used in reports: the binary path, or `<memory>`.
    pub fn origin(&self) -> String {
        self.metadata
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string())
    }
}

impl fmt::Display for Corpus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Corpus:{} units={} declarations={} types={}]",
            self.origin(),
            self.translation_units.len(),
            self.declarations.len(),
            self.environment.len()
        )
    }
}
