//! chartfold-core: typed filter and aggregation engine.
//! Records are loosely-typed JSON objects; every numeric path runs on
//! `rust_decimal::Decimal`.

pub mod api;
pub mod query;
pub mod value;

pub use api::{Engine, EngineError, EngineOptions};
pub use query::aggs::{aggregate, aggregate_stream, validate_spec};
pub use query::filters::{filter_records, passes_filters};
pub use query::fold::{materialize, Fold, MaterializedSource, RecordSource};
