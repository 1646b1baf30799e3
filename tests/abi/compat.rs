use crate::common::*;
use abispack::archive;
use abispack::compat::{check, check_with_deadline, CorpusSource};
use abispack::config::AnalysisConfig;
use abispack::error::{AbiError, ExtractionError, EXIT_COMPATIBLE, EXIT_ERROR, EXIT_INCOMPATIBLE};
use abispack::Verdict;

fn archives(dir: &std::path::Path) -> (CorpusSource, CorpusSource) {
    let old = dir.join("old.abi.json");
    let new = dir.join("new.abi.json");
    archive::write_to_path(&corpus("libf.so.1", |u| f_array(u, 5)), &old).unwrap();
    archive::write_to_path(&corpus("libf.so.2", |u| f_array(u, 2)), &new).unwrap();
    (
        CorpusSource::detect(&old).unwrap(),
        CorpusSource::detect(&new).unwrap(),
    )
}

#[test]
fn archives_compare_with_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let (old, new) = archives(dir.path());
    assert!(matches!(old, CorpusSource::Archive(_)));

    let config = AnalysisConfig::default();
    let report = check(&old, &new, None, &config).unwrap();
    assert_eq!(report.verdict, Verdict::Incompatible);
    assert_eq!(report.exit_code(), EXIT_INCOMPATIBLE);

    let same = check(&old, &old, None, &config).unwrap();
    assert_eq!(same.exit_code(), EXIT_COMPATIBLE);
    assert!(same.tree.is_empty());
}

#[test]
fn suppression_file_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let (old, new) = archives(dir.path());
    let rules = dir.path().join("suppressions.json");
    std::fs::write(
        &rules,
        r#"{ "rules": [ { "label": "f-table", "linkage_name": "^f$", "change_kinds": ["array-size-changed"] } ] }"#,
    )
    .unwrap();
    let report = check(&old, &new, Some(&rules), &AnalysisConfig::default()).unwrap();
    assert_eq!(report.exit_code(), EXIT_COMPATIBLE);
    assert!(report.render_text().contains("by f-table"));
}

#[test]
fn deadline_run_matches_plain_run() {
    let dir = tempfile::tempdir().unwrap();
    let (old, new) = archives(dir.path());
    let config = AnalysisConfig {
        deadline_seconds: Some(60),
        ..AnalysisConfig::default()
    };
    let bounded = check_with_deadline(&old, &new, None, &config).unwrap();
    let plain = check(&old, &new, None, &AnalysisConfig::default()).unwrap();
    assert_eq!(bounded.tree, plain.tree);
}

#[test]
fn errors_use_the_error_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let (old, _) = archives(dir.path());
    let stripped = dir.path().join("libstripped.so");
    std::fs::write(&stripped, b"\x7fELF garbage").unwrap();
    let binary = CorpusSource::detect(&stripped).unwrap();
    assert!(matches!(binary, CorpusSource::Binary(_)));

    let err = check(&old, &binary, None, &AnalysisConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        AbiError::Extraction(ExtractionError::NotAnObject { .. })
    ));
    assert_eq!(err.exit_code(), EXIT_ERROR);
    assert!(err.to_string().contains("libstripped.so"));
}

#[test]
fn archive_size_limit_is_enforced() {
    let dir = tempfile::tempdir().unwrap();
    let (old, new) = archives(dir.path());
    let mut config = AnalysisConfig::default();
    config.io.max_archive_size = 16;
    let err = check(&old, &new, None, &config).unwrap_err();
    assert!(matches!(err, AbiError::Serialization(_)));
}

#[cfg(target_os = "linux")]
#[test]
fn test_binary_metadata_is_readable() {
    use abispack::facts::{DwarfFactSource, FactSource};
    use abispack::io::IOLimits;

    let exe = std::env::current_exe().unwrap();
    let source = DwarfFactSource::open(&exe, &IOLimits::default()).unwrap();
    let metadata = source.metadata().unwrap();
    assert!(metadata.architecture.is_some());
    assert_eq!(source.origin(), exe.as_path());
}
