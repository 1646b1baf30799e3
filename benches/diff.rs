use abispack::archive;
use abispack::builder::build;
use abispack::corpus::Corpus;
use abispack::diff::compare;
use abispack::facts::InMemoryFacts;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

/// A library with `n` functions taking a pointer to a widening record.
fn library(origin: &str, n: usize, fields: usize) -> Corpus {
    let mut facts = InMemoryFacts::new(origin);
    {
        let mut unit = facts.unit("bench.c");
        let int = unit.base("int", 4);
        let names: Vec<String> = (0..fields).map(|i| format!("f{}", i)).collect();
        let members: Vec<(&str, _, u64)> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), int, i as u64 * 4))
            .collect();
        let record = unit.structure(Some("state"), fields as u64 * 4, &members);
        let ptr = unit.pointer(Some(record));
        for i in 0..n {
            let arr = unit.array(int, Some(i as u64 % 16 + 1));
            let sig = unit.function_type(Some(int), &[ptr, arr], false);
            unit.function(&format!("api_{}", i), sig);
        }
    }
    build(&facts).expect("bench corpus builds")
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for n in [64usize, 1024] {
        let old = library("old/libbench.so", n, 8);
        let new = library("new/libbench.so", n, 9);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(format!("compare/{}", n), |b| b.iter(|| compare(&old, &new)));
        group.bench_function(format!("reflexive/{}", n), |b| b.iter(|| compare(&old, &old)));
    }
    group.finish();
}

fn bench_archive(c: &mut Criterion) {
    let mut group = c.benchmark_group("archive");
    let lib = library("libbench.so", 1024, 8);
    let mut bytes = Vec::new();
    archive::write(&lib, &mut bytes).expect("archive writes");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("write", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(bytes.len());
            archive::write(&lib, &mut out).expect("archive writes");
            out
        })
    });
    group.bench_function("read", |b| b.iter(|| archive::read(bytes.as_slice())));
    group.finish();
}

criterion_group!(benches, bench_diff, bench_archive);
criterion_main!(benches);
