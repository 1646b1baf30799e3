//! Comparison invocation: load two corpora, diff, suppress, decide.
//!
//! A corpus source is either a binary (extracted through DWARF) or a
//! previously written archive. Exit codes: 0 compatible, 4 incompatible,
//! 1 for any failure.

use crate::archive;
use crate::builder::CorpusBuilder;
use crate::config::AnalysisConfig;
use crate::corpus::Corpus;
use crate::diff::{self, DiffTree, Verdict};
use crate::error::{AbiError, Result};
use crate::facts::DwarfFactSource;
use crate::log_error;
use crate::suppression::{self, SuppressionSet};
use crate::timeout::{run_blocking, TimeoutConfig};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a corpus comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusSource {
    Binary(PathBuf),
    Archive(PathBuf),
}

impl CorpusSource {
    /// Archives are JSON documents; anything starting with `{` is one.
    pub fn detect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut head = [0u8; 64];
        let n = File::open(path)
            .and_then(|mut f| f.read(&mut head))
            .map_err(|source| {
                AbiError::Serialization(crate::error::SerializationError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            })?;
        let first = head[..n].iter().find(|b| !b.is_ascii_whitespace());
        Ok(if first == Some(&b'{') {
            CorpusSource::Archive(path.to_path_buf())
        } else {
            CorpusSource::Binary(path.to_path_buf())
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            CorpusSource::Binary(p) | CorpusSource::Archive(p) => p,
        }
    }

    /// Extract or read the corpus.
    pub fn load(&self, config: &AnalysisConfig) -> Result<Corpus> {
        let corpus = match self {
            CorpusSource::Binary(path) => {
                let source = DwarfFactSource::open(path, &config.io.limits())?;
                CorpusBuilder::with_config(config.extraction.clone()).build(&source)?
            }
            CorpusSource::Archive(path) => {
                archive::read_from_path_with_limit(path, config.io.max_archive_size)?
            }
        };
        debug!(source = ?self, declarations = corpus.declarations().len(), "Loaded corpus");
        Ok(corpus)
    }
}

/// Outcome of a comparison.
#[derive(Debug, Clone)]
pub struct CompatReport {
    /// The diff tree after suppression.
    pub tree: DiffTree,
    pub verdict: Verdict,
}

impl CompatReport {
    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    pub fn render_text(&self) -> String {
        diff::report::render_text(&self.tree)
    }
}

/// Compare two already-loaded corpora.
pub fn compare_corpora(
    old: &Corpus,
    new: &Corpus,
    rules: &SuppressionSet,
    config: &AnalysisConfig,
) -> CompatReport {
    let tree = diff::compare_with(old, new, &config.diff);
    let (tree, verdict) = suppression::apply(tree, rules);
    CompatReport { tree, verdict }
}

fn load_rules(rules: Option<&Path>) -> Result<SuppressionSet> {
    Ok(match rules {
        Some(path) => SuppressionSet::from_json_file(path)?,
        None => SuppressionSet::empty(),
    })
}

/// Compare `old` against `new`, each a binary or an archive.
///
/// Rules are loaded first so an invalid rule file fails before any
/// extraction work.
pub fn check(
    old: &CorpusSource,
    new: &CorpusSource,
    rules: Option<&Path>,
    config: &AnalysisConfig,
) -> Result<CompatReport> {
    let rules = load_rules(rules).map_err(|e| log_error!(e, "loading suppression rules"))?;
    let (old_corpus, new_corpus) = rayon::join(|| old.load(config), || new.load(config));
    let old_corpus = old_corpus.map_err(|e| log_error!(e, "loading old corpus"))?;
    let new_corpus = new_corpus.map_err(|e| log_error!(e, "loading new corpus"))?;

    let report = compare_corpora(&old_corpus, &new_corpus, &rules, config);
    info!(
        old = %old.path().display(),
        new = %new.path().display(),
        verdict = %report.verdict,
        breaking = report.tree.breaking_count(),
        suppressed = report.tree.suppressed_count(),
        "ABI check finished"
    );
    Ok(report)
}

/// `check` under `config.deadline_seconds`; partial work is discarded on expiry.
pub fn check_with_deadline(
    old: &CorpusSource,
    new: &CorpusSource,
    rules: Option<&Path>,
    config: &AnalysisConfig,
) -> Result<CompatReport> {
    let Some(seconds) = config.deadline_seconds else {
        return check(old, new, rules, config);
    };
    let (old, new) = (old.clone(), new.clone());
    let rules = rules.map(Path::to_path_buf);
    let config = config.clone();
    run_blocking(TimeoutConfig::new(seconds, "abi check"), move || {
        check(&old, &new, rules.as_deref(), &config)
    })
}

/// Extract `binary` and write its archive to `archive_path`.
///
/// Returns the number of exported declarations written.
pub fn dump(binary: &Path, archive_path: &Path, config: &AnalysisConfig) -> Result<usize> {
    let corpus = CorpusSource::Binary(binary.to_path_buf())
        .load(config)
        .map_err(|e| log_error!(e, "extracting corpus"))?;
    archive::write_to_path(&corpus, archive_path)?;
    Ok(corpus.declarations().len())
}
