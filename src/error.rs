//! Error types for the abispack ABI analysis engine.
//!
//! Each stage of the pipeline has its own `thiserror` enum so callers can
//! tell an extraction failure from a corrupt archive or a bad suppression
//! file. `AbiError` wraps them all for the top-level entry points.

use crate::io::error::IoError;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a compatible comparison.
pub const EXIT_COMPATIBLE: i32 = 0;
/// Exit code for any extraction, serialization, or configuration failure.
pub const EXIT_ERROR: i32 = 1;
/// Exit code for a comparison that found at least one unsuppressed breaking change.
pub const EXIT_INCOMPATIBLE: i32 = 4;

/// Failures while turning a binary's debug information into a corpus.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The binary carries no usable debug information at all.
    #[error("{path}: no usable debug information")]
    NoDebugInfo { path: PathBuf },

    /// The fact source reported internally inconsistent records.
    #[error("{path}: malformed debug information{}: {reason}", symbol_suffix(.symbol))]
    MalformedDebugInfo {
        path: PathBuf,
        symbol: Option<String>,
        reason: String,
    },

    /// The input could not be parsed as an object file.
    #[error("{path}: not a supported object file: {reason}")]
    NotAnObject { path: PathBuf, reason: String },

    /// Reading the binary failed.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: IoError,
    },
}

impl ExtractionError {
    /// Shorthand for a malformed-record error without symbol context.
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ExtractionError::MalformedDebugInfo {
            path: path.into(),
            symbol: None,
            reason: reason.into(),
        }
    }

    /// Attach the offending symbol name when the error does not carry one yet.
    pub fn with_symbol(self, name: &str) -> Self {
        match self {
            ExtractionError::MalformedDebugInfo {
                path,
                symbol: None,
                reason,
            } => ExtractionError::MalformedDebugInfo {
                path,
                symbol: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }
}

fn symbol_suffix(symbol: &Option<String>) -> String {
    match symbol {
        Some(s) => format!(" (symbol `{}`)", s),
        None => String::new(),
    }
}

/// Failures while reading or writing a corpus archive.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// The archive is structurally invalid (bad JSON, id collisions, dangling ids...).
    #[error("{path}: corrupt archive: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    /// The archive declares a format version this build does not read.
    #[error("{path}: unsupported archive version {found} (supported: {supported})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// The archive sink or source failed.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SerializationError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SerializationError::CorruptArchive {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Failures in user-supplied configuration (suppression rules, config files).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A suppression rule has a predicate that cannot be parsed.
    #[error("{origin}: invalid suppression rule #{index}: {reason}")]
    InvalidSuppressionRule {
        origin: PathBuf,
        index: usize,
        reason: String,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("{origin}: malformed configuration: {reason}")]
    Malformed { origin: PathBuf, reason: String },

    /// The file could not be read.
    #[error("{origin}: {source}")]
    Unreadable {
        origin: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Internal invariant violations. Never expected from well-formed input.
#[derive(Debug, Error)]
pub enum CorpusIntegrityError {
    #[error("dangling type reference #{type_ref} ({context})")]
    DanglingTypeReference { type_ref: u32, context: String },
}

/// Main error type for abispack operations.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Integrity(#[from] CorpusIntegrityError),

    /// The comparison did not finish before its deadline.
    #[error("Comparison timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// File I/O errors outside of a more specific stage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AbiError {
    /// Process exit code for this failure; distinct from both verdict codes.
    pub fn exit_code(&self) -> i32 {
        EXIT_ERROR
    }
}

/// Result type alias for abispack operations
pub type Result<T> = std::result::Result<T, AbiError>;

/// Convert abispack errors to PyO3 exceptions
#[cfg(feature = "python-ext")]
impl From<AbiError> for pyo3::PyErr {
    fn from(err: AbiError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyRuntimeError, PyTimeoutError, PyValueError};

        match err {
            AbiError::Io(e) => PyIOError::new_err(e.to_string()),
            AbiError::Timeout { seconds } => {
                PyTimeoutError::new_err(format!("Comparison timed out after {}s", seconds))
            }
            AbiError::Config(e) => PyValueError::new_err(e.to_string()),
            other => PyRuntimeError::new_err(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display_with_symbol() {
        let err = ExtractionError::malformed("/lib/libm.so", "type #12 does not exist")
            .with_symbol("_Z3Addii");
        assert_eq!(
            err.to_string(),
            "/lib/libm.so: malformed debug information (symbol `_Z3Addii`): type #12 does not exist"
        );
    }

    #[test]
    fn test_with_symbol_keeps_existing() {
        let err = ExtractionError::MalformedDebugInfo {
            path: "a.so".into(),
            symbol: Some("first".into()),
            reason: "bad".into(),
        }
        .with_symbol("second");
        assert!(err.to_string().contains("`first`"));
    }

    #[test]
    fn test_unsupported_version_display() {
        let err = SerializationError::UnsupportedVersion {
            path: "old.abi".into(),
            found: 7,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "old.abi: unsupported archive version 7 (supported: 1)"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let err: AbiError = ConfigError::Malformed {
            origin: "rules.json".into(),
            reason: "eof".into(),
        }
        .into();
        assert_eq!(err.exit_code(), EXIT_ERROR);
        assert_ne!(EXIT_ERROR, EXIT_INCOMPATIBLE);
        assert_ne!(EXIT_ERROR, EXIT_COMPATIBLE);
    }
}
