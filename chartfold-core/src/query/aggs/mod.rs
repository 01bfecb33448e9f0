mod groups;
mod histogram;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;

use crate::api::errors::{EngineError, Result};
use crate::api::options::EngineOptions;
use crate::api::types::{AggregationKind, AggregationResult, AggregationSpec, Record};
use crate::query::filters::FilterSet;
use crate::query::fold::{materialize, Fold, RecordSource};
use crate::query::group::group_keys;
use crate::value::{coerce_decimal, lenient_decimal};

pub use groups::{rank_window, GroupSums};

/// Checks a typed spec before any record is read.
pub fn validate_spec(spec: &AggregationSpec, options: &EngineOptions) -> Result<()> {
  let kind = spec.kind();
  for (binding, name) in bindings(spec) {
    if name.trim().is_empty() {
      return Err(EngineError::MissingFieldBinding { kind, binding });
    }
  }
  if let AggregationSpec::HistogramBin(h) = spec {
    let size = h.bin_size.unwrap_or(options.default_bin_size);
    if size <= Decimal::ZERO {
      return Err(EngineError::invalid(format!(
        "histogram over `{}` needs a positive binSize, got {size}",
        h.bin_field
      )));
    }
  }
  Ok(())
}

fn bindings(spec: &AggregationSpec) -> SmallVec<[(&'static str, &str); 2]> {
  let mut out = SmallVec::new();
  match spec {
    AggregationSpec::NoAggregation(_) | AggregationSpec::Count(_) => {}
    AggregationSpec::Sum(a) => out.push(("sumField", a.sum_field.as_str())),
    AggregationSpec::Average(a) => out.push(("avgField", a.avg_field.as_str())),
    AggregationSpec::Min(a) => out.push(("minField", a.min_field.as_str())),
    AggregationSpec::Max(a) => out.push(("maxField", a.max_field.as_str())),
    AggregationSpec::GroupBy(a) | AggregationSpec::GroupByCount(a) => {
      out.push(("groupByField", a.group_by_field.as_str()))
    }
    AggregationSpec::GroupBySum(a) => {
      out.push(("groupByField", a.group_by_field.as_str()));
      out.push(("groupBySumField", a.group_by_sum_field.as_str()));
    }
    AggregationSpec::GroupByMax(a) => {
      out.push(("groupByField", a.group_by_field.as_str()));
      out.push(("groupByMaxField", a.group_by_max_field.as_str()));
    }
    AggregationSpec::GroupBySelect(a) => {
      out.push(("groupByField", a.group_by_field.as_str()));
      out.push(("groupBySumField", a.group_by_sum_field.as_str()));
    }
    AggregationSpec::HistogramBin(a) => out.push(("binField", a.bin_field.as_str())),
  }
  out
}

/// Filters `records` with the spec's clauses and computes its aggregate.
pub fn aggregate(
  records: &[Record],
  spec: &AggregationSpec,
  options: &EngineOptions,
) -> Result<AggregationResult> {
  validate_spec(spec, options)?;
  let filter = FilterSet::compile(spec.filters(), options.missing_field)?;
  let rows = filter.filter(records)?;
  debug!(
    kind = %spec.kind(),
    input = records.len(),
    matched = rows.len(),
    "running aggregation"
  );
  aggregate_rows(&rows, spec, options)
}

fn aggregate_rows(
  rows: &[&Record],
  spec: &AggregationSpec,
  options: &EngineOptions,
) -> Result<AggregationResult> {
  let kind = spec.kind();
  Ok(match spec {
    AggregationSpec::NoAggregation(_) => {
      AggregationResult::Records(rows.iter().map(|r| (*r).clone()).collect())
    }
    AggregationSpec::Count(_) => AggregationResult::Count(rows.len() as u64),
    AggregationSpec::Sum(a) => AggregationResult::Decimal(sum(rows, &a.sum_field, kind)?),
    AggregationSpec::Average(a) => AggregationResult::Decimal(average(rows, &a.avg_field)?),
    AggregationSpec::Min(a) => AggregationResult::Decimal(extremum(rows, &a.min_field, kind)?),
    AggregationSpec::Max(a) => AggregationResult::Decimal(extremum(rows, &a.max_field, kind)?),
    AggregationSpec::GroupBy(a) => {
      AggregationResult::Groups(groups::group_records(rows, &a.group_by_field))
    }
    AggregationSpec::GroupByCount(a) => {
      AggregationResult::GroupCounts(groups::group_counts(rows, &a.group_by_field))
    }
    AggregationSpec::GroupBySum(a) => AggregationResult::GroupValues(groups::group_sums(
      rows,
      &a.group_by_field,
      &a.group_by_sum_field,
      kind,
    )?),
    AggregationSpec::GroupByMax(a) => AggregationResult::GroupValues(groups::group_max(
      rows,
      &a.group_by_field,
      &a.group_by_max_field,
    )),
    AggregationSpec::GroupBySelect(a) => {
      let sums = groups::group_sums(rows, &a.group_by_field, &a.group_by_sum_field, kind)?;
      AggregationResult::GroupValues(rank_window(sums, a.select))
    }
    AggregationSpec::HistogramBin(a) => {
      AggregationResult::Bins(histogram::histogram(rows, a, options)?)
    }
  })
}

pub(crate) fn checked_add(acc: Decimal, value: Decimal, kind: AggregationKind) -> Result<Decimal> {
  acc
    .checked_add(value)
    .ok_or(EngineError::Overflow { kind })
}

fn field_decimal(record: &Record, field: &str) -> Result<Decimal> {
  Ok(coerce_decimal(record.get(field).unwrap_or(&Value::Null))?)
}

fn sum(rows: &[&Record], field: &str, kind: AggregationKind) -> Result<Decimal> {
  rows.iter().try_fold(Decimal::ZERO, |acc, record| {
    checked_add(acc, field_decimal(record, field)?, kind)
  })
}

fn average(rows: &[&Record], field: &str) -> Result<Decimal> {
  if rows.is_empty() {
    return Ok(Decimal::ZERO);
  }
  let total = sum(rows, field, AggregationKind::Average)?;
  total
    .checked_div(Decimal::from(rows.len()))
    .ok_or(EngineError::Overflow {
      kind: AggregationKind::Average,
    })
}

/// Absent and null values are skipped rather than read as zero, so a blank
/// cell never becomes the minimum.
fn extremum(rows: &[&Record], field: &str, kind: AggregationKind) -> Result<Decimal> {
  let mut best: Option<Decimal> = None;
  for record in rows {
    let value = match record.get(field) {
      None | Some(Value::Null) => continue,
      Some(raw) => coerce_decimal(raw)?,
    };
    best = Some(match (best, kind) {
      (None, _) => value,
      (Some(cur), AggregationKind::Min) => cur.min(value),
      (Some(cur), _) => cur.max(value),
    });
  }
  best.ok_or_else(|| EngineError::EmptyAggregation {
    kind,
    field: field.to_string(),
  })
}

/// Aggregates a restartable record source.
///
/// Sum, GroupBySum and GroupBySelect fold the stream directly with decimal
/// accumulators; every other kind materializes the source first.
pub async fn aggregate_stream<S>(
  source: &S,
  spec: &AggregationSpec,
  options: &EngineOptions,
) -> Result<AggregationResult>
where
  S: RecordSource + ?Sized,
{
  validate_spec(spec, options)?;
  let kind = spec.kind();
  debug!(kind = %kind, "running streamed aggregation");
  match spec {
    AggregationSpec::Sum(a) => {
      let fold = Fold::new(
        Decimal::ZERO,
        |record: &Record| field_decimal(record, &a.sum_field),
        |acc: Decimal, value: Decimal| checked_add(acc, value, kind),
      )
      .with_filter(a.filters.clone());
      let total = fold.run(source, options.missing_field).await?;
      Ok(AggregationResult::Decimal(
        total.into_iter().next().unwrap_or_default(),
      ))
    }
    AggregationSpec::GroupBySum(a) => {
      let fold = group_sum_fold(&a.group_by_field, &a.group_by_sum_field, kind)
        .with_filter(a.filters.clone());
      let sums = fold.run(source, options.missing_field).await?;
      Ok(AggregationResult::GroupValues(
        sums.into_iter().next().unwrap_or_default(),
      ))
    }
    AggregationSpec::GroupBySelect(a) => {
      let window = a.select;
      let fold = group_sum_fold(&a.group_by_field, &a.group_by_sum_field, kind)
        .with_filter(a.filters.clone());
      let ranked = fold
        .run_select(source, options.missing_field, |sums| {
          Ok(rank_window(sums, window))
        })
        .await?;
      Ok(AggregationResult::GroupValues(
        ranked.into_iter().next().unwrap_or_default(),
      ))
    }
    _ => {
      let materialized = materialize(source.open()).await?;
      aggregate(materialized.records(), spec, options)
    }
  }
}

type GroupKeys = SmallVec<[String; 2]>;

fn group_sum_fold<'a>(
  group_by_field: &'a str,
  sum_field: &'a str,
  kind: AggregationKind,
) -> Fold<
  GroupSums,
  impl Fn(&Record) -> Result<(GroupKeys, Decimal)> + 'a,
  impl Fn(GroupSums, (GroupKeys, Decimal)) -> Result<GroupSums> + 'a,
> {
  Fold::new(
    IndexMap::new(),
    move |record: &Record| -> Result<(GroupKeys, Decimal)> {
      let keys = record
        .get(group_by_field)
        .map(group_keys)
        .unwrap_or_default();
      Ok((keys, lenient_decimal(record.get(sum_field))))
    },
    move |mut sums: GroupSums, (keys, value): (GroupKeys, Decimal)| -> Result<GroupSums> {
      for key in keys {
        groups::add_to_group(&mut sums, key, value, kind)?;
      }
      Ok(sums)
    },
  )
}
