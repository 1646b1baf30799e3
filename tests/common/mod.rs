//! Shared fixtures for the integration tests.
//!
//! Fixtures are built through `InMemoryFacts`, so every test runs without
//! sample binaries. Each helper models one version of a small math library.

#![allow(dead_code)]

use abispack::builder::build;
use abispack::corpus::Corpus;
use abispack::facts::memory::UnitBuilder;
use abispack::facts::{InMemoryFacts, RawTypeId};
use abispack::ir::RecordKind;

/// Build a corpus from a single translation unit.
pub fn corpus(origin: &str, f: impl FnOnce(&mut UnitBuilder<'_>)) -> Corpus {
    let mut facts = InMemoryFacts::new(origin);
    {
        let mut unit = facts.unit("math.c");
        f(&mut unit);
    }
    build(&facts).expect("fixture corpus builds")
}

/// `int Add(int a, int b);`
pub fn add_int_int(unit: &mut UnitBuilder<'_>) {
    let int = unit.base("int", 4);
    let sig = unit.function_type(Some(int), &[int, int], false);
    unit.function("_Z3Addii", sig);
}

/// `int Add(int param[]);` under the same linkage name.
pub fn add_int_array(unit: &mut UnitBuilder<'_>) {
    let int = unit.base("int", 4);
    let arr = unit.array(int, None);
    let sig = unit.function_type(Some(int), &[arr], false);
    unit.function("_Z3Addii", sig);
}

/// `void f(int[N]);`
pub fn f_array(unit: &mut UnitBuilder<'_>, bound: u64) {
    let int = unit.base("int", 4);
    let arr = unit.array(int, Some(bound));
    let sig = unit.function_type(None, &[arr], false);
    unit.function("f", sig);
}

/// `struct point { double x, y; }; double norm(const struct point*);`
pub fn point_norm(unit: &mut UnitBuilder<'_>) -> RawTypeId {
    let double = unit.base("double", 8);
    let point = unit.structure(Some("point"), 16, &[("x", double, 0), ("y", double, 8)]);
    let cpoint = unit.const_of(point);
    let ptr = unit.pointer(Some(cpoint));
    let sig = unit.function_type(Some(double), &[ptr], false);
    unit.function("norm", sig);
    point
}

/// A linked list with a self-referential node and an opaque handle.
pub fn list_api(unit: &mut UnitBuilder<'_>) {
    let int = unit.base("int", 4);
    let node = unit.reserve();
    // The member and the return type share one pointer id, as compilers emit it.
    let head = unit.pointer(Some(node));
    unit.define_record(
        node,
        RecordKind::Struct,
        Some("node"),
        16,
        &[("value", int, 0), ("next", head, 8)],
    );
    let handle = unit.forward_declaration(RecordKind::Struct, "list_impl");
    let handle_ptr = unit.pointer(Some(handle));
    let sig = unit.function_type(Some(head), &[handle_ptr], false);
    unit.function("list_head", sig);
}

/// Two units that each define their own `struct S`: `a.c` has `{ int a; }`
/// with `f(struct S)`, `b.c` has `{ <b_type> b; }` with `g(struct S)`.
pub fn private_structs(origin: &str, b_type: (&str, u64)) -> InMemoryFacts {
    let mut facts = InMemoryFacts::new(origin);
    {
        let mut a = facts.unit("a.c");
        let int = a.base("int", 4);
        let s = a.structure(Some("S"), 4, &[("a", int, 0)]);
        let f = a.function_type(None, &[s], false);
        a.function("f", f);
    }
    {
        let mut b = facts.unit("b.c");
        let ty = b.base(b_type.0, b_type.1);
        let s = b.structure(Some("S"), b_type.1, &[("b", ty, 0)]);
        let g = b.function_type(None, &[s], false);
        b.function("g", g);
    }
    facts
}

/// `struct { int lo; int hi; } range;` as an exported variable.
pub fn anonymous_range(unit: &mut UnitBuilder<'_>) {
    let int = unit.base("int", 4);
    let anon = unit.structure(None, 8, &[("lo", int, 0), ("hi", int, 4)]);
    unit.variable("range", anon);
}

/// Every fixture above in one library.
pub fn math_library(unit: &mut UnitBuilder<'_>) {
    add_int_int(unit);
    f_array(unit, 5);
    point_norm(unit);
    list_api(unit);
    anonymous_range(unit);
}
