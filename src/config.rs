//! Configuration for a comparison run.
//!
//! Everything an operation needs (limits, parallelism, deadlines) travels in
//! an explicit `AnalysisConfig`; nothing is read from process-wide state.

use crate::error::ConfigError;
use crate::io::IOLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Master configuration for extraction and comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Limits for reading binaries and archives.
    pub io: IOConfig,
    /// Corpus builder settings.
    pub extraction: ExtractionConfig,
    /// Diff engine settings.
    pub diff: DiffConfig,
    /// Deadline for a whole comparison; `None` runs unbounded.
    pub deadline_seconds: Option<u64>,
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(origin: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed {
            origin: origin.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            origin: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &text)
    }
}

/// I/O limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IOConfig {
    /// Largest binary that will be mapped (default: 1 GiB).
    pub max_file_size: u64,
    /// Largest archive that will be read (default: 256 MiB).
    pub max_archive_size: u64,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self {
            max_file_size: IOLimits::default().max_file_size,
            max_archive_size: 256 * 1024 * 1024,
        }
    }
}

impl IOConfig {
    pub fn limits(&self) -> IOLimits {
        IOLimits {
            max_file_size: self.max_file_size,
        }
    }
}

/// Corpus builder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Lower translation units on the rayon pool (default: true).
    pub parallel: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Diff engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Compare matched declarations on the rayon pool (default: true).
    pub parallel: bool,
    /// Nesting depth past which a type comparison is reported as unresolvable.
    pub max_depth: usize,
    /// Demangle linkage names for display (default: true).
    pub demangle: bool,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_depth: 256,
            demangle: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert!(config.extraction.parallel);
        assert!(config.diff.parallel);
        assert_eq!(config.deadline_seconds, None);
        assert_eq!(config.io.limits(), IOLimits::default());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AnalysisConfig::from_json_str(
            Path::new("inline.json"),
            r#"{ "deadline_seconds": 30, "diff": { "parallel": false } }"#,
        )
        .unwrap();
        assert_eq!(config.deadline_seconds, Some(30));
        assert!(!config.diff.parallel);
        assert_eq!(config.diff.max_depth, 256);
        assert!(config.extraction.parallel);
    }

    #[test]
    fn test_malformed_json_names_origin() {
        let err = AnalysisConfig::from_json_str(Path::new("bad.json"), "{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert!(err.to_string().starts_with("bad.json:"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "io": {{ "max_file_size": 4096 }} }}"#).unwrap();
        let config = AnalysisConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.io.max_file_size, 4096);

        let missing = AnalysisConfig::from_json_file("/nonexistent/abispack.json").unwrap_err();
        assert!(matches!(missing, ConfigError::Unreadable { .. }));
    }
}
