use criterion::{black_box, criterion_group, criterion_main, Criterion};
use memforensics::parser::parse_tabular;

fn sample_output(rows: usize) -> String {
    let mut out = String::from("PID\tPPID\tImageFileName\tCreateTime\n");
    for i in 0..rows {
        out.push_str(&format!("{}\t{}\tprocess{}.exe\t2026-01-01 00:00:00\n", i, i / 2, i));
    }
    out
}

fn bench_tabular_parse(c: &mut Criterion) {
    let small = sample_output(100);
    let large = sample_output(10_000);

    c.bench_function("parse_tabular_100_rows", |b| {
        b.iter(|| parse_tabular(black_box(&small)))
    });
    c.bench_function("parse_tabular_10000_rows", |b| {
        b.iter(|| parse_tabular(black_box(&large)))
    });
}

criterion_group!(benches, bench_tabular_parse);
criterion_main!(benches);
