use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::api::errors::Result;
use crate::api::types::{AggregationKind, RankWindow, Record};
use crate::query::group::{group_by, group_keys};
use crate::value::lenient_decimal;

use super::checked_add;

/// Per-group decimal totals in first-seen key order.
pub type GroupSums = IndexMap<String, Decimal>;

pub(crate) fn group_records(rows: &[&Record], field: &str) -> IndexMap<String, Vec<Record>> {
  group_by(rows.iter().copied(), field)
    .into_iter()
    .map(|(key, members)| (key, members.into_iter().cloned().collect()))
    .collect()
}

pub(crate) fn group_counts(rows: &[&Record], field: &str) -> IndexMap<String, u64> {
  group_by(rows.iter().copied(), field)
    .into_iter()
    .map(|(key, members)| (key, members.len() as u64))
    .collect()
}

pub(crate) fn add_to_group(
  sums: &mut GroupSums,
  key: String,
  value: Decimal,
  kind: AggregationKind,
) -> Result<()> {
  let slot = sums.entry(key).or_insert(Decimal::ZERO);
  *slot = checked_add(*slot, value, kind)?;
  Ok(())
}

pub(crate) fn group_sums(
  rows: &[&Record],
  group_by_field: &str,
  sum_field: &str,
  kind: AggregationKind,
) -> Result<GroupSums> {
  let mut sums = GroupSums::new();
  for record in rows {
    let Some(raw) = record.get(group_by_field) else {
      continue;
    };
    let value = lenient_decimal(record.get(sum_field));
    for key in group_keys(raw) {
      add_to_group(&mut sums, key, value, kind)?;
    }
  }
  Ok(sums)
}

pub(crate) fn group_max(rows: &[&Record], group_by_field: &str, max_field: &str) -> GroupSums {
  let mut best = GroupSums::new();
  for record in rows {
    let Some(raw) = record.get(group_by_field) else {
      continue;
    };
    let value = lenient_decimal(record.get(max_field));
    for key in group_keys(raw) {
      best
        .entry(key)
        .and_modify(|cur| *cur = (*cur).max(value))
        .or_insert(value);
    }
  }
  best
}

/// Ranks groups by descending total and keeps the zero-based `[from, to)`
/// slice. Equal totals keep their first-seen order.
pub fn rank_window(sums: GroupSums, window: RankWindow) -> GroupSums {
  let mut ranked: Vec<(String, Decimal)> = sums.into_iter().collect();
  ranked.sort_by(|a, b| b.1.cmp(&a.1));
  let end = window.to.min(ranked.len());
  if window.from >= end {
    return GroupSums::new();
  }
  ranked.truncate(end);
  ranked.drain(..window.from);
  ranked.into_iter().collect()
}
