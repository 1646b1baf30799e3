use crate::common::*;
use abispack::diff::{compare, ChangeCategory, DiffTree, Verdict};
use abispack::error::ConfigError;
use abispack::suppression::{apply, SuppressionSet};
use std::path::Path;

fn breaking_tree() -> DiffTree {
    let old = corpus("old/libmath.so", |u| {
        add_int_int(u);
        f_array(u, 5);
        point_norm(u);
    });
    let new = corpus("new/libmath.so", |u| {
        add_int_array(u);
        f_array(u, 2);
    });
    compare(&old, &new)
}

fn rules(text: &str) -> SuppressionSet {
    SuppressionSet::from_json_str(Path::new("rules.json"), text).unwrap()
}

#[test]
fn suppression_never_adds_breakage() {
    let tree = breaking_tree();
    let before = tree.breaking_count();
    assert!(before >= 3);

    for text in [
        r#"{ "rules": [] }"#,
        r#"{ "rules": [ { "change_kinds": ["array-size-changed"] } ] }"#,
        r#"{ "rules": [ { "linkage_name": "Add" } ] }"#,
        r#"{ "rules": [ { "type_name": "point" }, { "change_kinds": ["removed"] } ] }"#,
        r#"{ "rules": [ { "linkage_name": "does-not-exist" } ] }"#,
    ] {
        let (filtered, _) = apply(tree.clone(), &rules(text));
        assert!(filtered.breaking_count() <= before, "{}", text);
        // Evidence stays in the tree.
        assert_eq!(filtered.declarations.len(), tree.declarations.len());
    }
}

#[test]
fn demangled_names_match_linkage_patterns() {
    let (filtered, _) = apply(
        breaking_tree(),
        &rules(r#"{ "rules": [ { "label": "add-rewrite", "linkage_name": "^Add\\(int, int\\)$" } ] }"#),
    );
    let add = filtered
        .declarations
        .iter()
        .find(|d| d.linkage_name == "_Z3Addii")
        .unwrap();
    assert_eq!(add.node.suppressed_by.as_deref(), Some("add-rewrite"));
}

#[test]
fn suppressing_every_breaking_change_flips_the_verdict() {
    let tree = breaking_tree();
    assert_eq!(tree.verdict(), Verdict::Incompatible);
    let (filtered, verdict) = apply(
        tree,
        &rules(r#"{ "rules": [ { "linkage_name": "." } ] }"#),
    );
    assert_eq!(verdict, Verdict::Compatible);
    assert_eq!(filtered.breaking_count(), 0);
    assert!(filtered.suppressed_count() > 0);
    assert_eq!(filtered.find(ChangeCategory::ArraySizeChanged).len(), 1);
}

#[test]
fn invalid_rule_fails_the_run() {
    let err = SuppressionSet::from_json_str(
        Path::new("team/rules.json"),
        r#"{ "rules": [ { "linkage_name": "ok" }, { "type_name": "[unclosed" } ] }"#,
    )
    .unwrap_err();
    match &err {
        ConfigError::InvalidSuppressionRule { origin, index, .. } => {
            assert_eq!(origin, Path::new("team/rules.json"));
            assert_eq!(*index, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err.to_string().starts_with("team/rules.json: invalid suppression rule #1"));
}
