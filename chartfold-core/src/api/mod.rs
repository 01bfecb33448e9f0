pub mod engine;
pub mod errors;
pub mod options;
pub mod types;

pub use engine::Engine;
pub use errors::{CoercionError, EngineError, Result};
pub use options::{EngineOptions, MissingFieldPolicy};
pub use types::{
  AggregationKind, AggregationResult, AggregationSpec, ComparisonOperator, FieldType,
  FilterClause, HistogramBin, RankWindow, Record,
};
