use crate::common::*;
use abispack::archive;
use abispack::diff::compare;
use abispack::error::SerializationError;

#[test]
fn archive_round_trip_is_diff_empty() {
    let lib = corpus("libmath.so", math_library);
    let mut buf = Vec::new();
    archive::write(&lib, &mut buf).unwrap();
    let restored = archive::read(buf.as_slice()).unwrap();

    assert_eq!(restored.declarations().len(), lib.declarations().len());
    assert_eq!(restored.metadata, lib.metadata);
    let tree = compare(&lib, &restored);
    assert!(tree.is_empty(), "{}", abispack::diff::report::render_text(&tree));
}

#[test]
fn archive_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("libmath.abi.json");
    let lib = corpus("libmath.so", math_library);
    archive::write_to_path(&lib, &path).unwrap();

    let restored = archive::read_from_path(&path).unwrap();
    assert!(compare(&lib, &restored).is_empty());
    // A second generation is still equivalent to the original.
    let again = dir.path().join("again.abi.json");
    archive::write_to_path(&restored, &again).unwrap();
    let twice = archive::read_from_path(&again).unwrap();
    assert!(compare(&lib, &twice).is_empty());
}

#[test]
fn future_version_is_rejected() {
    let lib = corpus("libmath.so", add_int_int);
    let mut buf = Vec::new();
    archive::write(&lib, &mut buf).unwrap();
    let mut doc: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    doc["version"] = serde_json::json!(2);
    // The body is garbage too; the version must be checked first.
    doc["body"] = serde_json::json!("not a body");
    let bytes = serde_json::to_vec(&doc).unwrap();

    let err = archive::read(bytes.as_slice()).err().unwrap();
    assert!(matches!(
        err,
        SerializationError::UnsupportedVersion { found: 2, supported: 1, .. }
    ));
}

#[test]
fn tampered_body_is_corrupt() {
    let lib = corpus("libmath.so", |u| f_array(u, 5));
    let mut buf = Vec::new();
    archive::write(&lib, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let tampered = text.replacen("\"bound\": 5", "\"bound\": 2", 1);
    assert_ne!(text, tampered);

    let err = archive::read(tampered.as_bytes()).err().unwrap();
    assert!(matches!(err, SerializationError::CorruptArchive { .. }));
}

#[test]
fn truncated_file_names_its_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.abi.json");
    std::fs::write(&path, "{ \"format\": \"abispack-corpus\", ").unwrap();
    let err = archive::read_from_path(&path).err().unwrap();
    assert!(matches!(err, SerializationError::CorruptArchive { .. }));
    assert!(err.to_string().contains("broken.abi.json"));
}
