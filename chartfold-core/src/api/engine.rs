use serde_json::Value;

use crate::api::errors::Result;
use crate::api::options::EngineOptions;
use crate::api::types::{AggregationResult, AggregationSpec, FilterClause, Record};
use crate::query::aggs::{aggregate, aggregate_stream, validate_spec};
use crate::query::filters::FilterSet;
use crate::query::fold::RecordSource;

/// Entry point bundling [`EngineOptions`] with the filter and aggregation
/// operations. Holds no per-call state.
#[derive(Debug, Clone, Default)]
pub struct Engine {
  options: EngineOptions,
}

impl Engine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_options(options: EngineOptions) -> Self {
    Self { options }
  }

  pub fn options(&self) -> &EngineOptions {
    &self.options
  }

  pub fn filter<'a>(
    &self,
    records: &'a [Record],
    clauses: &[FilterClause],
  ) -> Result<Vec<&'a Record>> {
    FilterSet::compile(clauses, self.options.missing_field)?.filter(records)
  }

  pub fn validate(&self, spec: &AggregationSpec) -> Result<()> {
    validate_spec(spec, &self.options)
  }

  pub fn aggregate(&self, records: &[Record], spec: &AggregationSpec) -> Result<AggregationResult> {
    aggregate(records, spec, &self.options)
  }

  /// Parses `spec` from untrusted JSON and aggregates with it.
  pub fn aggregate_json(&self, records: &[Record], spec: &Value) -> Result<AggregationResult> {
    let spec = AggregationSpec::from_value(spec)?;
    self.aggregate(records, &spec)
  }

  pub async fn aggregate_stream<S>(
    &self,
    source: &S,
    spec: &AggregationSpec,
  ) -> Result<AggregationResult>
  where
    S: RecordSource + ?Sized,
  {
    aggregate_stream(source, spec, &self.options).await
  }
}
