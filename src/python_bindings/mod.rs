//! Python bindings for abispack.
//!
//! The surface mirrors the command-line contract: `compare` returns the
//! process exit code together with the rendered report, `dump` writes an
//! archive and returns the number of exported declarations.

use crate::compat::{self, CorpusSource};
use crate::config::AnalysisConfig;
use pyo3::prelude::*;
use std::path::PathBuf;

/// Register all Python bindings with the module.
pub fn register_python_bindings(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(compare_py, m)?)?;
    m.add_function(wrap_pyfunction!(dump_py, m)?)?;
    m.add_function(wrap_pyfunction!(crate::logging::init_logging, m)?)?;
    m.add("EXIT_COMPATIBLE", crate::error::EXIT_COMPATIBLE)?;
    m.add("EXIT_INCOMPATIBLE", crate::error::EXIT_INCOMPATIBLE)?;
    m.add("EXIT_ERROR", crate::error::EXIT_ERROR)?;
    Ok(())
}

fn load_config(config: Option<PathBuf>) -> PyResult<AnalysisConfig> {
    Ok(match config {
        Some(path) => AnalysisConfig::from_json_file(path).map_err(crate::error::AbiError::from)?,
        None => AnalysisConfig::default(),
    })
}

/// Compare two binaries or archives; returns `(exit_code, report_text)`.
#[pyfunction]
#[pyo3(name = "compare")]
#[pyo3(signature = (old, new, suppressions=None, config=None))]
fn compare_py(
    old: PathBuf,
    new: PathBuf,
    suppressions: Option<PathBuf>,
    config: Option<PathBuf>,
) -> PyResult<(i32, String)> {
    let config = load_config(config)?;
    let old = CorpusSource::detect(&old)?;
    let new = CorpusSource::detect(&new)?;
    let report = compat::check_with_deadline(&old, &new, suppressions.as_deref(), &config)?;
    Ok((report.exit_code(), report.render_text()))
}

/// Extract `binary` and write its archive to `output`.
#[pyfunction]
#[pyo3(name = "dump")]
#[pyo3(signature = (binary, output, config=None))]
fn dump_py(binary: PathBuf, output: PathBuf, config: Option<PathBuf>) -> PyResult<usize> {
    let config = load_config(config)?;
    Ok(compat::dump(&binary, &output, &config)?)
}
