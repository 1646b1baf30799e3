//! Bounded access to binaries on disk.
//!
//! `BinaryImage` memory-maps an object file once and hands out the whole
//! mapping as a byte slice for `object`/`gimli` to parse. The size limit is
//! checked before mapping so oversized inputs are rejected up front.

pub mod error;

use crate::io::error::{IoError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Defines the resource limits for reading binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOLimits {
    /// The absolute maximum file size that can be opened.
    pub max_file_size: u64,
}

impl Default for IOLimits {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024 * 1024, // 1GB; debug builds are large
        }
    }
}

/// A read-only, memory-mapped binary.
pub struct BinaryImage {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
}

impl BinaryImage {
    /// Opens and maps a file, failing if it exceeds `limits.max_file_size`.
    pub fn open<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limits.max_file_size = limits.max_file_size,
            "Opening binary"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "Binary is too large"
            );
            return Err(IoError::FileTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: read-only map of a regular file; we never hand out mutable views.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The full contents of the file.
    pub fn data(&self) -> &[u8] {
        match &self.mmap {
            Some(m) => &m[..],
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_file(content: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content).unwrap();
        temp_file
    }

    #[test]
    fn open_file_successfully() {
        let file = create_temp_file(b"\x7fELF hello");
        let image = BinaryImage::open(file.path(), &IOLimits::default()).unwrap();
        assert_eq!(image.len(), 10);
        assert_eq!(&image.data()[..4], b"\x7fELF");
    }

    #[test]
    fn open_file_too_large() {
        let file = create_temp_file(&[0; 100]);
        let limits = IOLimits { max_file_size: 50 };
        let result = BinaryImage::open(file.path(), &limits);
        assert!(matches!(result, Err(IoError::FileTooLarge { .. })));
    }

    #[test]
    fn open_empty_file() {
        let file = create_temp_file(b"");
        let image = BinaryImage::open(file.path(), &IOLimits::default()).unwrap();
        assert!(image.is_empty());
    }

    #[test]
    fn open_missing_file() {
        let result = BinaryImage::open("/definitely/not/here.so", &IOLimits::default());
        assert!(matches!(result, Err(IoError::StdIo(_))));
    }
}
