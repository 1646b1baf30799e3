use crate::common::*;
use abispack::diff::{compare, ChangeCategory, Severity, Verdict};
use abispack::facts::InMemoryFacts;
use abispack::builder::build;

#[test]
fn compare_is_reflexive() {
    let lib = corpus("libmath.so", math_library);
    let tree = compare(&lib, &lib);
    assert_eq!(tree.breaking_count(), 0);
    assert!(tree.is_empty());

    // Independently built copies of the same facts compare equal too.
    let again = corpus("libmath.so", math_library);
    let tree = compare(&lib, &again);
    assert!(tree.is_empty(), "{:#?}", tree);
}

#[test]
fn array_size_change_is_one_breaking_node() {
    let old = corpus("old/libf.so", |u| f_array(u, 5));
    let new = corpus("new/libf.so", |u| f_array(u, 2));
    let tree = compare(&old, &new);

    let nodes = tree.find(ChangeCategory::ArraySizeChanged);
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].severity, Severity::Breaking);
    assert_eq!(nodes[0].subject.old.as_deref(), Some("int[5]"));
    assert_eq!(nodes[0].subject.new.as_deref(), Some("int[2]"));
    assert_eq!(tree.breaking_count(), 1);
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}

#[test]
fn parameter_type_change_is_breaking() {
    let old = corpus("old/libmath.so", add_int_int);
    let new = corpus("new/libmath.so", add_int_array);
    let tree = compare(&old, &new);

    assert_eq!(tree.declarations.len(), 1);
    assert_eq!(tree.declarations[0].display_name, "Add(int, int)");
    let params = tree.find(ChangeCategory::ParameterTypeChanged);
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].severity, Severity::Breaking);
    assert_eq!(params[0].children[0].category(), ChangeCategory::ShapeChanged);
    assert_eq!(tree.find(ChangeCategory::ParameterCountChanged).len(), 1);
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}

#[test]
fn additions_are_compatible() {
    let old = corpus("old/libmath.so", add_int_int);
    let new = corpus("new/libmath.so", |u| {
        add_int_int(u);
        point_norm(u);
    });
    let tree = compare(&old, &new);
    assert_eq!(tree.declarations.len(), 1);
    assert_eq!(tree.declarations[0].node.category(), ChangeCategory::Added);
    assert_eq!(tree.verdict(), Verdict::Compatible);
}

#[test]
fn anonymous_records_compare_by_shape() {
    // Same shape, but the second build interns extra types first so the
    // anonymous record lands on a different handle.
    let old = corpus("old/librange.so", anonymous_range);
    let new = corpus("new/librange.so", |u| {
        let _ = u.base("char", 1);
        let _ = u.base("long", 8);
        anonymous_range(u);
    });
    assert!(compare(&old, &new).is_empty());
}

#[test]
fn removing_an_enumerator_breaks_but_adding_one_does_not() {
    let lib = |items: &[(&str, i64)]| {
        let items = items.to_vec();
        corpus("libcolor.so", move |u| {
            let uint = u.base("unsigned int", 4);
            let color = u.enumeration(Some("color"), uint, &items);
            let sig = u.function_type(None, &[color], false);
            u.function("paint", sig);
        })
    };
    let base = lib(&[("RED", 0), ("GREEN", 1)]);
    let grown = lib(&[("RED", 0), ("GREEN", 1), ("BLUE", 2)]);
    let shrunk = lib(&[("RED", 0)]);

    assert_eq!(compare(&base, &grown).verdict(), Verdict::Compatible);
    let tree = compare(&base, &shrunk);
    assert_eq!(tree.find(ChangeCategory::EnumeratorRemoved).len(), 1);
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}

#[test]
fn struct_growth_behind_pointer_is_compatible() {
    let old = corpus("old/libmath.so", |u| { point_norm(u); });
    let new = corpus("new/libmath.so", |u| {
        let double = u.base("double", 8);
        let point = u.structure(
            Some("point"),
            24,
            &[("x", double, 0), ("y", double, 8), ("z", double, 16)],
        );
        let cpoint = u.const_of(point);
        let ptr = u.pointer(Some(cpoint));
        let sig = u.function_type(Some(double), &[ptr], false);
        u.function("norm", sig);
    });
    let tree = compare(&old, &new);
    assert_eq!(tree.find(ChangeCategory::FieldAdded).len(), 1);
    assert_eq!(tree.find(ChangeCategory::RecordSizeChanged).len(), 1);
    assert_eq!(tree.verdict(), Verdict::Compatible);
}

#[test]
fn field_type_change_inside_self_referential_record() {
    let old = corpus("old/liblist.so", list_api);
    let new = corpus("new/liblist.so", |u| {
        let long = u.base("long", 8);
        let node = u.reserve();
        let head = u.pointer(Some(node));
        u.define_record(
            node,
            abispack::ir::RecordKind::Struct,
            Some("node"),
            16,
            &[("value", long, 0), ("next", head, 8)],
        );
        let handle = u.forward_declaration(abispack::ir::RecordKind::Struct, "list_impl");
        let handle_ptr = u.pointer(Some(handle));
        let sig = u.function_type(Some(head), &[handle_ptr], false);
        u.function("list_head", sig);
    });
    let tree = compare(&old, &new);
    let fields = tree.find(ChangeCategory::FieldTypeChanged);
    assert_eq!(fields.len(), 1);
    assert_eq!(
        fields[0].children[0].category(),
        ChangeCategory::FundamentalChanged
    );
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}

#[test]
fn same_tag_in_two_units_is_compared_per_unit() {
    let old = build(&private_structs("old/libsplit.so", ("long", 8))).unwrap();
    let new = build(&private_structs("new/libsplit.so", ("double", 8))).unwrap();
    let tree = compare(&old, &new);

    let changed: Vec<&str> = tree
        .declarations
        .iter()
        .map(|d| d.linkage_name.as_str())
        .collect();
    assert_eq!(changed, vec!["g"]);
    assert_eq!(tree.find(ChangeCategory::FundamentalChanged).len(), 1);
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}

#[test]
fn kind_change_is_reported_without_type_nodes() {
    let old = corpus("old/libmath.so", add_int_int);
    let mut facts = InMemoryFacts::new("new/libmath.so");
    {
        let mut unit = facts.unit("math.c");
        let int = unit.base("int", 4);
        unit.variable("_Z3Addii", int);
    }
    let new = build(&facts).unwrap();
    let tree = compare(&old, &new);
    assert_eq!(tree.declarations[0].node.category(), ChangeCategory::KindChanged);
    assert!(tree.declarations[0].node.children.is_empty());
    assert_eq!(tree.verdict(), Verdict::Incompatible);
}
