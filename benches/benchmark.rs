use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use ddicdi::config::GeneratorConfig;
use ddicdi::convert::Converter;
use ddicdi::descriptor::{Cell, Descriptor, InMemoryRows, MeasurementLevel, SourceFormat, Variable};
use ddicdi::scheduler::plan;

const MB: u64 = 1024 * 1024;

fn survey(rows: usize) -> (Descriptor, InMemoryRows) {
    let descriptor = Descriptor::new(
        "survey.csv",
        SourceFormat::delimited(","),
        vec![
            Variable::new("respondent_id", "int64").with_roles(&["identifier"]),
            Variable::new("age", "int32").with_roles(&["measure"]).with_measure(MeasurementLevel::Scale),
            Variable::new("region", "string")
                .with_roles(&["attribute"])
                .with_value_label("N", "North")
                .with_value_label("S", "South"),
            Variable::new("income", "float64").with_roles(&["measure"]),
        ],
        rows as u64,
    )
    .expect("descriptor");
    let data = (0..rows)
        .map(|i| {
            vec![
                Cell::Integer(i as i64),
                Cell::Integer(18 + (i % 60) as i64),
                Cell::from(if i % 2 == 0 { "N" } else { "S" }),
                Cell::Float(1_000.0 + i as f64 * 0.5),
            ]
        })
        .collect();
    let rows = InMemoryRows::new(4, data).expect("rows");
    (descriptor, rows)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("plan 1M rows", |b| {
        b.iter(|| plan(black_box(1_000_000), black_box(12), 500 * MB, 500))
    });
    c.bench_function("plan 1M rows 1MB ceiling", |b| {
        b.iter(|| plan(black_box(1_000_000), black_box(12), MB, 500))
    });

    let (descriptor, rows) = survey(1_000);
    let metadata_only = Converter::new(GeneratorConfig::default()).expect("converter");
    c.bench_function("convert metadata only", |b| {
        b.iter(|| metadata_only.convert(black_box(&descriptor), &rows).expect("conversion"))
    });
    let all_rows = Converter::new(GeneratorConfig::default().with_values(true).with_all_rows(true))
        .expect("converter");
    c.bench_function("convert 1k rows with values", |b| {
        b.iter(|| all_rows.convert(black_box(&descriptor), &rows).expect("conversion"))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
