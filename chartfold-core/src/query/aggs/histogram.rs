use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::warn;

use crate::api::errors::{EngineError, Result};
use crate::api::options::EngineOptions;
use crate::api::types::{AggregationKind, HistogramBin, HistogramBinAggregation, Record};
use crate::value::numeric_value;

struct Binning {
  start: Decimal,
  size: Decimal,
}

impl Binning {
  /// Lower edge of the half-open bin holding `val`.
  fn floor(&self, val: Decimal) -> Option<Decimal> {
    let offset = val.checked_sub(self.start)?;
    let bucket = offset.checked_div(self.size)?.floor();
    bucket.checked_mul(self.size)?.checked_add(self.start)
  }

  fn label(&self, floor: Decimal) -> Option<String> {
    let upper = floor.checked_add(self.size)?;
    Some(format!("{} - {}", floor.normalize(), upper.normalize()))
  }
}

fn overflow() -> EngineError {
  EngineError::Overflow {
    kind: AggregationKind::HistogramBin,
  }
}

pub(crate) fn histogram(
  rows: &[&Record],
  agg: &HistogramBinAggregation,
  options: &EngineOptions,
) -> Result<Vec<HistogramBin>> {
  let values: Vec<Decimal> = rows
    .iter()
    .filter_map(|record| record.get(&agg.bin_field).and_then(numeric_value))
    .collect();
  let Some(observed_min) = values.iter().min().copied() else {
    warn!(field = %agg.bin_field, rows = rows.len(), "no numeric values to bin");
    return Ok(Vec::new());
  };
  let binning = Binning {
    start: agg.bin_start.unwrap_or(observed_min),
    size: agg.bin_size.unwrap_or(options.default_bin_size),
  };

  let mut counts: BTreeMap<Decimal, u64> = BTreeMap::new();
  for val in values {
    let floor = binning.floor(val).ok_or_else(overflow)?;
    *counts.entry(floor).or_insert(0) += 1;
  }
  counts
    .into_iter()
    .map(|(floor, count)| {
      let range = binning.label(floor).ok_or_else(overflow)?;
      Ok(HistogramBin { range, count })
    })
    .collect()
}
