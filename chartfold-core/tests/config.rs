use std::fs;

use chartfold_core::api::types::{
  AggregationSpec, ComparisonOperator, FieldType, FilterClause, Record,
};
use chartfold_core::api::{Engine, EngineOptions, MissingFieldPolicy};
use rust_decimal::Decimal;
use serde_json::json;

#[test]
fn options_load_from_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("options.json");
  fs::write(&path, r#"{"missingField": "drop", "defaultBinSize": "2.5"}"#).unwrap();
  let opts = EngineOptions::from_file(&path).unwrap();
  assert_eq!(opts.missing_field, MissingFieldPolicy::Drop);
  assert_eq!(opts.default_bin_size, Decimal::new(25, 1));
}

#[test]
fn broken_options_file_names_the_path() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("options.json");
  fs::write(&path, "{ nope").unwrap();
  let err = EngineOptions::from_file(&path).unwrap_err();
  assert!(format!("{err:#}").contains("options.json"));

  let missing = dir.path().join("absent.json");
  assert!(EngineOptions::from_file(&missing).is_err());
}

#[test]
fn drop_policy_changes_counts() {
  let records: Vec<Record> = [json!({"genre": "Drama"}), json!({"title": "untitled"})]
    .into_iter()
    .map(|v| Record::from_value(v).unwrap())
    .collect();
  let spec = AggregationSpec::Count(chartfold_core::api::types::FilteredAggregation {
    filters: vec![FilterClause::new(
      "genre",
      FieldType::String,
      ComparisonOperator::NotEquals,
      json!("Comedy"),
    )],
  });
  let keep = Engine::new().aggregate(&records, &spec).unwrap();
  assert_eq!(keep.as_count(), Some(2));

  let drop = Engine::with_options(EngineOptions {
    missing_field: MissingFieldPolicy::Drop,
    ..EngineOptions::default()
  });
  assert_eq!(drop.aggregate(&records, &spec).unwrap().as_count(), Some(1));
}
