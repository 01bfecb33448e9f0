use std::fmt;

use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::errors::{EngineError, Result};

/// One row of input data. Field order follows the source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
  pub fields: IndexMap<String, Value>,
}

impl Record {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builds a record from a JSON object; any other JSON value is rejected.
  pub fn from_value(value: Value) -> Result<Self> {
    match value {
      Value::Object(map) => Ok(map.into_iter().collect()),
      other => Err(EngineError::invalid(format!(
        "record must be a JSON object, got `{other}`"
      ))),
    }
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }

  pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
    self.fields.insert(field.into(), value)
  }

  pub fn len(&self) -> usize {
    self.fields.len()
  }

  pub fn is_empty(&self) -> bool {
    self.fields.is_empty()
  }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
  fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
    Record {
      fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
  #[serde(rename = "STRING", alias = "string")]
  String,
  #[serde(rename = "DECIMAL", alias = "decimal")]
  Decimal,
  #[serde(rename = "DATETIME", alias = "datetime")]
  DateTime,
}

impl fmt::Display for FieldType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      FieldType::String => "STRING",
      FieldType::Decimal => "DECIMAL",
      FieldType::DateTime => "DATETIME",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComparisonOperator {
  Equals,
  NotEquals,
  GreaterThan,
  LessThan,
  GreaterThanOrEqual,
  LessThanOrEqual,
  Contains,
  In,
  NotIn,
  Between,
  IsBefore,
  IsAfter,
}

impl ComparisonOperator {
  pub fn as_str(&self) -> &'static str {
    match self {
      ComparisonOperator::Equals => "EQUALS",
      ComparisonOperator::NotEquals => "NOT_EQUALS",
      ComparisonOperator::GreaterThan => "GREATER_THAN",
      ComparisonOperator::LessThan => "LESS_THAN",
      ComparisonOperator::GreaterThanOrEqual => "GREATER_THAN_OR_EQUAL",
      ComparisonOperator::LessThanOrEqual => "LESS_THAN_OR_EQUAL",
      ComparisonOperator::Contains => "CONTAINS",
      ComparisonOperator::In => "IN",
      ComparisonOperator::NotIn => "NOT_IN",
      ComparisonOperator::Between => "BETWEEN",
      ComparisonOperator::IsBefore => "IS_BEFORE",
      ComparisonOperator::IsAfter => "IS_AFTER",
    }
  }
}

impl fmt::Display for ComparisonOperator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single comparison between a record field and a literal.
///
/// `value` is a scalar for most operators, an array for `IN` / `NOT_IN` and a
/// `[start, end]` pair for `BETWEEN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterClause {
  pub field_type: FieldType,
  pub comparison: ComparisonOperator,
  pub value: Value,
  pub input_field: String,
}

impl FilterClause {
  pub fn new(
    input_field: impl Into<String>,
    field_type: FieldType,
    comparison: ComparisonOperator,
    value: Value,
  ) -> Self {
    Self {
      field_type,
      comparison,
      value,
      input_field: input_field.into(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
  NoAggregation,
  Count,
  Sum,
  Average,
  Min,
  Max,
  GroupBy,
  GroupByCount,
  GroupBySum,
  GroupByMax,
  GroupBySelect,
  HistogramBin,
}

impl AggregationKind {
  pub const ALL: [AggregationKind; 12] = [
    AggregationKind::NoAggregation,
    AggregationKind::Count,
    AggregationKind::Sum,
    AggregationKind::Average,
    AggregationKind::Min,
    AggregationKind::Max,
    AggregationKind::GroupBy,
    AggregationKind::GroupByCount,
    AggregationKind::GroupBySum,
    AggregationKind::GroupByMax,
    AggregationKind::GroupBySelect,
    AggregationKind::HistogramBin,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      AggregationKind::NoAggregation => "NoAggregation",
      AggregationKind::Count => "Count",
      AggregationKind::Sum => "Sum",
      AggregationKind::Average => "Average",
      AggregationKind::Min => "Min",
      AggregationKind::Max => "Max",
      AggregationKind::GroupBy => "GroupBy",
      AggregationKind::GroupByCount => "GroupByCount",
      AggregationKind::GroupBySum => "GroupBySum",
      AggregationKind::GroupByMax => "GroupByMax",
      AggregationKind::GroupBySelect => "GroupBySelect",
      AggregationKind::HistogramBin => "HistogramBin",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|kind| kind.as_str() == name)
  }

  /// JSON keys that must be present (and non-empty) for this kind.
  pub fn required_bindings(&self) -> &'static [&'static str] {
    match self {
      AggregationKind::NoAggregation | AggregationKind::Count => &[],
      AggregationKind::Sum => &["sumField"],
      AggregationKind::Average => &["avgField"],
      AggregationKind::Min => &["minField"],
      AggregationKind::Max => &["maxField"],
      AggregationKind::GroupBy | AggregationKind::GroupByCount => &["groupByField"],
      AggregationKind::GroupBySum => &["groupByField", "groupBySumField"],
      AggregationKind::GroupByMax => &["groupByField", "groupByMaxField"],
      AggregationKind::GroupBySelect => &["groupByField", "groupBySumField", "select"],
      AggregationKind::HistogramBin => &["binField"],
    }
  }
}

impl fmt::Display for AggregationKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredAggregation {
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SumAggregation {
  pub sum_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageAggregation {
  pub avg_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinAggregation {
  pub min_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxAggregation {
  pub max_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByAggregation {
  pub group_by_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBySumAggregation {
  pub group_by_field: String,
  pub group_by_sum_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupByMaxAggregation {
  pub group_by_field: String,
  pub group_by_max_field: String,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

/// Zero-based `[from, to)` window over groups ranked by descending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankWindow {
  pub from: usize,
  pub to: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBySelectAggregation {
  pub group_by_field: String,
  pub group_by_sum_field: String,
  pub select: RankWindow,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramBinAggregation {
  pub bin_field: String,
  /// Falls back to `EngineOptions::default_bin_size` when omitted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bin_size: Option<Decimal>,
  /// Lower edge of the first bin; the observed minimum when omitted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bin_start: Option<Decimal>,
  #[serde(default)]
  pub filters: Vec<FilterClause>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AggregationSpec {
  NoAggregation(FilteredAggregation),
  Count(FilteredAggregation),
  Sum(SumAggregation),
  Average(AverageAggregation),
  Min(MinAggregation),
  Max(MaxAggregation),
  GroupBy(GroupByAggregation),
  GroupByCount(GroupByAggregation),
  GroupBySum(GroupBySumAggregation),
  GroupByMax(GroupByMaxAggregation),
  GroupBySelect(GroupBySelectAggregation),
  HistogramBin(HistogramBinAggregation),
}

impl AggregationSpec {
  pub fn kind(&self) -> AggregationKind {
    match self {
      AggregationSpec::NoAggregation(_) => AggregationKind::NoAggregation,
      AggregationSpec::Count(_) => AggregationKind::Count,
      AggregationSpec::Sum(_) => AggregationKind::Sum,
      AggregationSpec::Average(_) => AggregationKind::Average,
      AggregationSpec::Min(_) => AggregationKind::Min,
      AggregationSpec::Max(_) => AggregationKind::Max,
      AggregationSpec::GroupBy(_) => AggregationKind::GroupBy,
      AggregationSpec::GroupByCount(_) => AggregationKind::GroupByCount,
      AggregationSpec::GroupBySum(_) => AggregationKind::GroupBySum,
      AggregationSpec::GroupByMax(_) => AggregationKind::GroupByMax,
      AggregationSpec::GroupBySelect(_) => AggregationKind::GroupBySelect,
      AggregationSpec::HistogramBin(_) => AggregationKind::HistogramBin,
    }
  }

  pub fn filters(&self) -> &[FilterClause] {
    match self {
      AggregationSpec::NoAggregation(a) | AggregationSpec::Count(a) => &a.filters,
      AggregationSpec::Sum(a) => &a.filters,
      AggregationSpec::Average(a) => &a.filters,
      AggregationSpec::Min(a) => &a.filters,
      AggregationSpec::Max(a) => &a.filters,
      AggregationSpec::GroupBy(a) | AggregationSpec::GroupByCount(a) => &a.filters,
      AggregationSpec::GroupBySum(a) => &a.filters,
      AggregationSpec::GroupByMax(a) => &a.filters,
      AggregationSpec::GroupBySelect(a) => &a.filters,
      AggregationSpec::HistogramBin(a) => &a.filters,
    }
  }

  /// Parses an untrusted JSON payload, reporting an unknown `kind` and a
  /// missing binding as distinct errors before the typed decode runs.
  pub fn from_value(value: &Value) -> Result<Self> {
    let obj = value
      .as_object()
      .ok_or_else(|| EngineError::invalid("aggregation spec must be a JSON object"))?;
    let kind = match obj.get("kind") {
      Some(Value::String(name)) => {
        AggregationKind::from_name(name).ok_or_else(|| EngineError::UnsupportedAggregation {
          kind: name.clone(),
        })?
      }
      Some(other) => {
        return Err(EngineError::UnsupportedAggregation {
          kind: other.to_string(),
        })
      }
      None => return Err(EngineError::invalid("aggregation spec is missing `kind`")),
    };
    for binding in kind.required_bindings() {
      let present = match obj.get(*binding) {
        Some(Value::String(name)) => !name.trim().is_empty(),
        Some(Value::Object(_)) => *binding == "select",
        _ => false,
      };
      if !present {
        return Err(EngineError::MissingFieldBinding { kind, binding });
      }
    }
    serde_json::from_value(value.clone())
      .map_err(|err| EngineError::invalid(format!("aggregation `{kind}`: {err}")))
  }

  pub fn from_json(body: &str) -> Result<Self> {
    let value: Value = serde_json::from_str(body)
      .map_err(|err| EngineError::invalid(format!("aggregation spec is not valid JSON: {err}")))?;
    Self::from_value(&value)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramBin {
  pub range: String,
  pub count: u64,
}

/// Output of an aggregation; the variant follows the spec's kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AggregationResult {
  Records(Vec<Record>),
  Count(u64),
  Decimal(Decimal),
  Groups(IndexMap<String, Vec<Record>>),
  GroupCounts(IndexMap<String, u64>),
  GroupValues(IndexMap<String, Decimal>),
  Bins(Vec<HistogramBin>),
}

impl AggregationResult {
  pub fn as_records(&self) -> Option<&[Record]> {
    match self {
      AggregationResult::Records(records) => Some(records),
      _ => None,
    }
  }

  pub fn as_count(&self) -> Option<u64> {
    match self {
      AggregationResult::Count(count) => Some(*count),
      _ => None,
    }
  }

  pub fn as_decimal(&self) -> Option<Decimal> {
    match self {
      AggregationResult::Decimal(value) => Some(*value),
      _ => None,
    }
  }

  pub fn as_groups(&self) -> Option<&IndexMap<String, Vec<Record>>> {
    match self {
      AggregationResult::Groups(groups) => Some(groups),
      _ => None,
    }
  }

  pub fn as_group_counts(&self) -> Option<&IndexMap<String, u64>> {
    match self {
      AggregationResult::GroupCounts(groups) => Some(groups),
      _ => None,
    }
  }

  pub fn as_group_values(&self) -> Option<&IndexMap<String, Decimal>> {
    match self {
      AggregationResult::GroupValues(groups) => Some(groups),
      _ => None,
    }
  }

  pub fn as_bins(&self) -> Option<&[HistogramBin]> {
    match self {
      AggregationResult::Bins(bins) => Some(bins),
      _ => None,
    }
  }
}
