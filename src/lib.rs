//! abispack: ABI corpus extraction, archiving, comparison, and suppression.
//!
//! A binary's debug information is lowered into a [`corpus::Corpus`] of
//! canonical types and exported declarations. Two corpora are compared by
//! [`diff::compare`], the resulting tree is filtered through
//! [`suppression::apply`], and [`compat::check`] ties the steps together.

pub mod archive;
pub mod builder;
pub mod compat;
pub mod config;
pub mod corpus;
pub mod demangle;
pub mod diff;
pub mod error;
pub mod facts;
pub mod io;
pub mod ir;
pub mod logging;
pub mod suppression;
pub mod timeout;

#[cfg(feature = "python-ext")]
pub mod python_bindings;

pub use compat::{check, CompatReport, CorpusSource};
pub use corpus::Corpus;
pub use diff::{compare, DiffTree, Verdict};
pub use error::{AbiError, Result};

#[cfg(feature = "python-ext")]
use pyo3::prelude::*;

/// A Python module implemented in Rust.
#[cfg(feature = "python-ext")]
#[pymodule]
fn abispack(m: &Bound<'_, PyModule>) -> PyResult<()> {
    python_bindings::register_python_bindings(m.py(), m)
}
