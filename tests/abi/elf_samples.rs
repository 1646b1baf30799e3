//! Extraction from real `gcc -g` objects in `samples/dwarf/binaries`.
//!
//! Rebuild the objects with `samples/dwarf/build.sh` after editing the
//! sources next to them.

use abispack::builder::build;
use abispack::corpus::Corpus;
use abispack::diff::{compare, ChangeCategory, Severity, Verdict};
use abispack::error::ExtractionError;
use abispack::facts::dwarf;
use std::path::PathBuf;

fn sample(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("samples/dwarf/binaries")
        .join(name)
}

fn extract(name: &str) -> Corpus {
    let source = dwarf::open(sample(name)).unwrap();
    build(&source).unwrap()
}

fn rendered(corpus: &Corpus, symbol: &str) -> String {
    let decl = corpus
        .declaration(symbol)
        .unwrap_or_else(|| panic!("`{}` not extracted", symbol));
    corpus.environment().render(decl.ty)
}

#[test]
fn c_library_declarations_render() {
    let corpus = extract("libabi-v1.so");
    assert_eq!(
        rendered(&corpus, "list_push"),
        "struct node* (struct node*, struct node*)"
    );
    assert_eq!(rendered(&corpus, "table"), "int[5]");
    assert_eq!(rendered(&corpus, "Add"), "int (int, int)");
    assert_eq!(rendered(&corpus, "flags_count"), "unsigned int (struct flags)");
    assert_eq!(rendered(&corpus, "range"), "struct {anonymous}");
    assert_eq!(corpus.translation_units().len(), 1);
}

#[test]
fn bit_field_offsets_are_in_bits() {
    let corpus = extract("libabi-v1.so");
    let env = corpus.environment();
    let decl = corpus.declaration("flags_count").unwrap();
    let param = match env.get(decl.ty).as_deref() {
        Some(abispack::ir::Type::FunctionType { params, .. }) => params[0],
        other => panic!("unexpected {:?}", other),
    };
    match env.get(param).as_deref() {
        Some(abispack::ir::Type::Record { fields, size, .. }) => {
            let offsets: Vec<(&str, u64)> = fields
                .iter()
                .map(|f| (f.name.as_str(), f.offset_bits))
                .collect();
            assert_eq!(offsets, vec![("ready", 0), ("mode", 1), ("count", 4)]);
            assert_eq!(*size, Some(4));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn same_sources_compare_equal() {
    let tree = compare(&extract("libabi-v1.so"), &extract("libabi-v1.so"));
    assert!(tree.is_empty(), "{:#?}", tree);
    assert_eq!(tree.verdict(), Verdict::Compatible);
}

#[test]
fn version_two_breaks_table_add_and_flags() {
    let old = extract("libabi-v1.so");
    let new = extract("libabi-v2.so");
    let tree = compare(&old, &new);

    let changed: Vec<&str> = tree
        .declarations
        .iter()
        .map(|d| d.linkage_name.as_str())
        .collect();
    assert_eq!(changed, vec!["Add", "flags_count", "table"]);
    assert!(tree
        .declarations
        .iter()
        .all(|d| d.node.severity == Severity::Breaking));

    let arrays = tree.find(ChangeCategory::ArraySizeChanged);
    assert_eq!(arrays.len(), 1);
    assert_eq!(arrays[0].subject.old.as_deref(), Some("int[5]"));
    assert_eq!(arrays[0].subject.new.as_deref(), Some("int[2]"));

    // `int param[]` decays to `int*` in the debug info.
    assert_eq!(rendered(&new, "Add"), "int (int*)");
    assert_eq!(tree.find(ChangeCategory::ParameterCountChanged).len(), 1);

    let offsets = tree.find(ChangeCategory::FieldOffsetChanged);
    assert_eq!(offsets.len(), 1);
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}

#[test]
fn cplusplus_records_are_qualified() {
    let corpus = extract("libshapes.so");
    assert_eq!(
        rendered(&corpus, "_ZN5first3useENS_1SE"),
        "int (struct first::S)"
    );
    assert_eq!(
        rendered(&corpus, "_ZN6second3useENS_1SE"),
        "long int (struct second::S)"
    );
    assert_eq!(
        rendered(&corpus, "_Z9outer_tag5Outer"),
        "int (struct Outer)"
    );
    let decl = corpus.declaration("_Z9outer_tag5Outer").unwrap();
    let env = corpus.environment();
    let outer = match env.get(decl.ty).as_deref() {
        Some(abispack::ir::Type::FunctionType { params, .. }) => params[0],
        other => panic!("unexpected {:?}", other),
    };
    match env.get(outer).as_deref() {
        Some(abispack::ir::Type::Record { fields, .. }) => {
            assert_eq!(env.render(fields[0].ty), "struct Outer::Inner");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn stripped_library_has_no_debug_info() {
    let source = dwarf::open(sample("libabi-stripped.so")).unwrap();
    assert!(matches!(
        build(&source),
        Err(ExtractionError::NoDebugInfo { .. })
    ));
}
