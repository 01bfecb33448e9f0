use criterion::{criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rust_decimal::Decimal;
use serde_json::json;

use chartfold_core::api::types::{
  AggregationSpec, ComparisonOperator, FieldType, FilterClause, GroupBySumAggregation,
  HistogramBinAggregation, Record,
};
use chartfold_core::api::EngineOptions;
use chartfold_core::aggregate;

fn build_records(count: usize, cardinality: usize) -> Vec<Record> {
  let mut rng = StdRng::seed_from_u64(42);
  (0..count)
    .map(|i| {
      let genre = rng.gen_range(0..cardinality);
      let cents = rng.gen_range(0..1_000_000i64);
      // Every tenth row carries two genres to exercise comma fan-out.
      let label = if i % 10 == 0 {
        format!("genre_{genre}, genre_{}", (genre + 1) % cardinality)
      } else {
        format!("genre_{genre}")
      };
      [
        ("title", json!(format!("title {i}"))),
        ("genre", json!(label)),
        ("gross", json!(Decimal::new(cents, 2).to_string())),
        ("score", json!(rng.gen_range(0..10_000i64))),
      ]
      .into_iter()
      .collect()
    })
    .collect()
}

fn bench_group_by_sum(c: &mut Criterion) {
  let records = build_records(5_000, 200);
  let spec = AggregationSpec::GroupBySum(GroupBySumAggregation {
    group_by_field: "genre".into(),
    group_by_sum_field: "gross".into(),
    filters: vec![FilterClause::new(
      "score",
      FieldType::Decimal,
      ComparisonOperator::GreaterThanOrEqual,
      json!(1_000),
    )],
  });
  let options = EngineOptions::default();

  c.bench_function("aggs_group_by_sum", |b| {
    b.iter(|| {
      let out = aggregate(&records, &spec, &options).unwrap();
      criterion::black_box(out);
    });
  });
}

fn bench_histogram(c: &mut Criterion) {
  let records = build_records(5_000, 50);
  let spec = AggregationSpec::HistogramBin(HistogramBinAggregation {
    bin_field: "score".into(),
    bin_size: Some(Decimal::from(250)),
    bin_start: Some(Decimal::ZERO),
    filters: Vec::new(),
  });
  let options = EngineOptions::default();

  c.bench_function("aggs_histogram_numeric", |b| {
    b.iter(|| {
      let out = aggregate(&records, &spec, &options).unwrap();
      criterion::black_box(out);
    });
  });
}

criterion_group!(benches, bench_group_by_sum, bench_histogram);
criterion_main!(benches);
