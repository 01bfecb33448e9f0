use std::cmp::Ordering;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::api::errors::{EngineError, Result};
use crate::api::options::MissingFieldPolicy;
use crate::api::types::{ComparisonOperator, FieldType, FilterClause, Record};
use crate::value::{as_text, coerce_datetime, coerce_decimal};

/// A filter clause compiled against its field type. Literals are coerced once
/// here; record values are coerced on every [`Predicate::matches`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
  field: String,
  on_missing: MissingFieldPolicy,
  test: Test,
}

#[derive(Debug, Clone, PartialEq)]
enum Test {
  Text(TextTest),
  Decimal(DecimalTest),
  DateTime(DateTest),
}

#[derive(Debug, Clone, PartialEq)]
enum TextTest {
  Equals(String),
  NotEquals(String),
  Contains(String),
  In(Vec<String>),
  NotIn(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecimalOp {
  Eq,
  Ne,
  Gt,
  Lt,
  Gte,
  Lte,
}

#[derive(Debug, Clone, PartialEq)]
enum DecimalTest {
  Compare(DecimalOp, Decimal),
  In(Vec<Decimal>),
  NotIn(Vec<Decimal>),
  Between(Decimal, Decimal),
}

#[derive(Debug, Clone, PartialEq)]
enum DateTest {
  Equals(NaiveDateTime),
  NotEquals(NaiveDateTime),
  Before(NaiveDateTime),
  After(NaiveDateTime),
  AfterOrSameDay(NaiveDateTime),
  BeforeOrSameDay(NaiveDateTime),
  Between(NaiveDateTime, NaiveDateTime),
}

/// Compiles a clause with the default missing-field policy (keep).
pub fn resolve(clause: &FilterClause) -> Result<Predicate> {
  resolve_with(clause, MissingFieldPolicy::default())
}

pub fn resolve_with(clause: &FilterClause, on_missing: MissingFieldPolicy) -> Result<Predicate> {
  let test = match clause.field_type {
    FieldType::String => Test::Text(text_test(clause)?),
    FieldType::Decimal => Test::Decimal(decimal_test(clause)?),
    FieldType::DateTime => Test::DateTime(date_test(clause)?),
  };
  Ok(Predicate {
    field: clause.input_field.clone(),
    on_missing,
    test,
  })
}

fn unsupported(clause: &FilterClause) -> EngineError {
  EngineError::UnsupportedComparison {
    field_type: clause.field_type,
    comparison: clause.comparison,
  }
}

fn text_test(clause: &FilterClause) -> Result<TextTest> {
  Ok(match clause.comparison {
    ComparisonOperator::Equals => TextTest::Equals(literal_text(scalar_literal(clause)?)),
    ComparisonOperator::NotEquals => TextTest::NotEquals(literal_text(scalar_literal(clause)?)),
    ComparisonOperator::Contains => TextTest::Contains(literal_text(scalar_literal(clause)?)),
    ComparisonOperator::In => TextTest::In(list_literal(clause).map(literal_text).collect()),
    ComparisonOperator::NotIn => TextTest::NotIn(list_literal(clause).map(literal_text).collect()),
    _ => return Err(unsupported(clause)),
  })
}

fn decimal_test(clause: &FilterClause) -> Result<DecimalTest> {
  let op = match clause.comparison {
    ComparisonOperator::Equals => DecimalOp::Eq,
    ComparisonOperator::NotEquals => DecimalOp::Ne,
    ComparisonOperator::GreaterThan => DecimalOp::Gt,
    ComparisonOperator::LessThan => DecimalOp::Lt,
    ComparisonOperator::GreaterThanOrEqual => DecimalOp::Gte,
    ComparisonOperator::LessThanOrEqual => DecimalOp::Lte,
    ComparisonOperator::In | ComparisonOperator::NotIn => {
      let values = list_literal(clause)
        .map(|v| coerce_decimal(v).map_err(EngineError::from))
        .collect::<Result<Vec<_>>>()?;
      return Ok(if clause.comparison == ComparisonOperator::In {
        DecimalTest::In(values)
      } else {
        DecimalTest::NotIn(values)
      });
    }
    ComparisonOperator::Between => {
      let (low, high) = pair_literal(clause)?;
      return Ok(DecimalTest::Between(
        coerce_decimal(low)?,
        coerce_decimal(high)?,
      ));
    }
    _ => return Err(unsupported(clause)),
  };
  Ok(DecimalTest::Compare(op, coerce_decimal(scalar_literal(clause)?)?))
}

fn date_test(clause: &FilterClause) -> Result<DateTest> {
  if clause.comparison == ComparisonOperator::Between {
    let (start, end) = pair_literal(clause)?;
    return Ok(DateTest::Between(
      coerce_datetime(start)?,
      coerce_datetime(end)?,
    ));
  }
  let make: fn(NaiveDateTime) -> DateTest = match clause.comparison {
    ComparisonOperator::Equals => DateTest::Equals,
    ComparisonOperator::NotEquals => DateTest::NotEquals,
    ComparisonOperator::IsBefore | ComparisonOperator::LessThan => DateTest::Before,
    ComparisonOperator::IsAfter | ComparisonOperator::GreaterThan => DateTest::After,
    ComparisonOperator::GreaterThanOrEqual => DateTest::AfterOrSameDay,
    ComparisonOperator::LessThanOrEqual => DateTest::BeforeOrSameDay,
    _ => return Err(unsupported(clause)),
  };
  Ok(make(coerce_datetime(scalar_literal(clause)?)?))
}

fn scalar_literal(clause: &FilterClause) -> Result<&Value> {
  match &clause.value {
    Value::Array(_) | Value::Object(_) => Err(EngineError::invalid(format!(
      "`{}` on `{}` expects a single value",
      clause.comparison, clause.input_field
    ))),
    v => Ok(v),
  }
}

/// Array literals iterate their entries; a scalar is a one-element list.
fn list_literal(clause: &FilterClause) -> impl Iterator<Item = &Value> {
  match &clause.value {
    Value::Array(items) => items.iter().collect::<Vec<_>>().into_iter(),
    v => vec![v].into_iter(),
  }
}

fn pair_literal(clause: &FilterClause) -> Result<(&Value, &Value)> {
  match &clause.value {
    Value::Array(items) if items.len() == 2 => Ok((&items[0], &items[1])),
    _ => Err(EngineError::invalid(format!(
      "`BETWEEN` on `{}` expects a [start, end] pair",
      clause.input_field
    ))),
  }
}

fn literal_text(value: &Value) -> String {
  as_text(value).map(|t| t.into_owned()).unwrap_or_default()
}

impl Predicate {
  pub fn field(&self) -> &str {
    &self.field
  }

  /// Tests one record. An absent or null field short-circuits to the
  /// configured missing-field policy; an uncoercible value is an error.
  pub fn matches(&self, record: &Record) -> Result<bool> {
    let value = match record.get(&self.field) {
      None | Some(Value::Null) => return Ok(self.on_missing.passes()),
      Some(v) => v,
    };
    match &self.test {
      Test::Text(test) => Ok(test.matches(&as_text(value).unwrap_or_default())),
      Test::Decimal(test) => Ok(test.matches(coerce_decimal(value)?)),
      Test::DateTime(test) => Ok(test.matches(coerce_datetime(value)?)),
    }
  }
}

impl TextTest {
  fn matches(&self, field: &str) -> bool {
    match self {
      TextTest::Equals(lit) => field == lit,
      TextTest::NotEquals(lit) => field != lit,
      TextTest::Contains(lit) => field.contains(lit.as_str()),
      TextTest::In(list) => list.iter().any(|lit| lit == field),
      TextTest::NotIn(list) => !list.iter().any(|lit| lit == field),
    }
  }
}

impl DecimalTest {
  fn matches(&self, field: Decimal) -> bool {
    match self {
      DecimalTest::Compare(op, lit) => {
        let ord = field.cmp(lit);
        match op {
          DecimalOp::Eq => ord == Ordering::Equal,
          DecimalOp::Ne => ord != Ordering::Equal,
          DecimalOp::Gt => ord == Ordering::Greater,
          DecimalOp::Lt => ord == Ordering::Less,
          DecimalOp::Gte => ord != Ordering::Less,
          DecimalOp::Lte => ord != Ordering::Greater,
        }
      }
      DecimalTest::In(list) => list.contains(&field),
      DecimalTest::NotIn(list) => !list.contains(&field),
      DecimalTest::Between(low, high) => field >= *low && field <= *high,
    }
  }
}

impl DateTest {
  fn matches(&self, field: NaiveDateTime) -> bool {
    match self {
      DateTest::Equals(lit) => field == *lit,
      DateTest::NotEquals(lit) => field != *lit,
      DateTest::Before(lit) => field < *lit,
      DateTest::After(lit) => field > *lit,
      DateTest::AfterOrSameDay(lit) => field > *lit || field.date() == lit.date(),
      DateTest::BeforeOrSameDay(lit) => field < *lit || field.date() == lit.date(),
      DateTest::Between(start, end) => field > *start && field < *end,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::errors::{CoercionError, CoercionTarget};
  use serde_json::json;

  fn clause(field_type: FieldType, comparison: ComparisonOperator, value: Value) -> FilterClause {
    FilterClause::new("f", field_type, comparison, value)
  }

  fn rec(value: Value) -> Record {
    [("f", value)].into_iter().collect()
  }

  fn check(c: &FilterClause, value: Value) -> bool {
    resolve(c).unwrap().matches(&rec(value)).unwrap()
  }

  #[test]
  fn string_comparisons() {
    use ComparisonOperator::*;
    let eq = clause(FieldType::String, Equals, json!("Drama"));
    assert!(check(&eq, json!("Drama")));
    assert!(!check(&eq, json!("drama")));
    let ne = clause(FieldType::String, NotEquals, json!("Drama"));
    assert!(check(&ne, json!("Comedy")));
    let contains = clause(FieldType::String, Contains, json!("ram"));
    assert!(check(&contains, json!("Drama, Comedy")));
    assert!(!check(&contains, json!("Comedy")));
    let within = clause(FieldType::String, In, json!(["a", "b"]));
    assert!(check(&within, json!("b")));
    assert!(!check(&within, json!("c")));
    let outside = clause(FieldType::String, NotIn, json!(["a", "b"]));
    assert!(check(&outside, json!("c")));
    let numeric_text = clause(FieldType::String, Equals, json!("2024"));
    assert!(check(&numeric_text, json!(2024)));
  }

  #[test]
  fn decimal_comparisons_coerce_both_sides() {
    use ComparisonOperator::*;
    assert!(check(&clause(FieldType::Decimal, Equals, json!("0.3")), json!(0.3)));
    assert!(check(&clause(FieldType::Decimal, NotEquals, json!(1)), json!("2")));
    assert!(check(&clause(FieldType::Decimal, GreaterThan, json!("10")), json!("10.01")));
    assert!(!check(&clause(FieldType::Decimal, GreaterThan, json!(10)), json!(10)));
    assert!(check(&clause(FieldType::Decimal, GreaterThanOrEqual, json!(10)), json!(10)));
    assert!(check(&clause(FieldType::Decimal, LessThan, json!(10)), json!(9.99)));
    assert!(check(&clause(FieldType::Decimal, LessThanOrEqual, json!(10)), json!("10.00")));
    assert!(check(&clause(FieldType::Decimal, In, json!(["1.50", 2])), json!(1.5)));
    assert!(check(&clause(FieldType::Decimal, NotIn, json!([1, 2])), json!(3)));
    let between = clause(FieldType::Decimal, Between, json!([1, 5]));
    assert!(check(&between, json!(1)));
    assert!(check(&between, json!(5)));
    assert!(!check(&between, json!(5.01)));
  }

  #[test]
  fn datetime_comparisons() {
    use ComparisonOperator::*;
    let day = json!("2024-03-05");
    assert!(check(&clause(FieldType::DateTime, Equals, day.clone()), json!("03/05/2024")));
    assert!(check(&clause(FieldType::DateTime, NotEquals, day.clone()), json!("2024-03-06")));
    assert!(check(&clause(FieldType::DateTime, IsBefore, day.clone()), json!("2024-03-04")));
    assert!(check(&clause(FieldType::DateTime, LessThan, day.clone()), json!("2024-03-04")));
    assert!(check(
      &clause(FieldType::DateTime, IsAfter, day.clone()),
      json!("2024-03-05T00:00:01")
    ));
    assert!(check(&clause(FieldType::DateTime, GreaterThan, day.clone()), json!("2024-04-01")));
    let gte = clause(FieldType::DateTime, GreaterThanOrEqual, json!("2024-03-05T12:00:00"));
    assert!(check(&gte, json!("2024-03-05T08:00:00")));
    assert!(!check(&gte, json!("2024-03-04T23:00:00")));
    let lte = clause(FieldType::DateTime, LessThanOrEqual, json!("2024-03-05T08:00:00"));
    assert!(check(&lte, json!("2024-03-05T20:00:00")));
    assert!(!check(&lte, json!("2024-03-06")));
  }

  #[test]
  fn datetime_between_is_exclusive() {
    let between = clause(
      FieldType::DateTime,
      ComparisonOperator::Between,
      json!(["2024-01-01", "2024-12-31"]),
    );
    assert!(check(&between, json!("2024-06-15")));
    assert!(!check(&between, json!("2024-01-01")));
    assert!(!check(&between, json!("2024-12-31")));
  }

  #[test]
  fn unsupported_pairs_are_rejected() {
    use ComparisonOperator::*;
    let cases = [
      (FieldType::String, GreaterThan),
      (FieldType::String, Between),
      (FieldType::String, IsBefore),
      (FieldType::Decimal, Contains),
      (FieldType::Decimal, IsAfter),
      (FieldType::DateTime, Contains),
      (FieldType::DateTime, In),
      (FieldType::DateTime, NotIn),
    ];
    for (field_type, comparison) in cases {
      let err = resolve(&clause(field_type, comparison, json!("1"))).unwrap_err();
      assert!(
        matches!(err, EngineError::UnsupportedComparison { .. }),
        "{field_type} {comparison}"
      );
    }
  }

  #[test]
  fn malformed_literals_fail_at_resolve() {
    use ComparisonOperator::*;
    let err = resolve(&clause(FieldType::Decimal, Between, json!([1]))).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
    let err = resolve(&clause(FieldType::String, Equals, json!(["a"]))).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
    let err = resolve(&clause(FieldType::Decimal, GreaterThan, json!("ten"))).unwrap_err();
    assert!(matches!(err, EngineError::Coercion(_)));
    let err = resolve(&clause(FieldType::DateTime, IsAfter, json!("someday"))).unwrap_err();
    assert!(matches!(err, EngineError::Coercion(_)));
  }

  #[test]
  fn scalar_in_literal_acts_as_single_entry_list() {
    let c = clause(FieldType::String, ComparisonOperator::In, json!("a"));
    assert!(check(&c, json!("a")));
    assert!(!check(&c, json!("b")));
  }

  #[test]
  fn missing_fields_follow_policy() {
    let c = clause(FieldType::Decimal, ComparisonOperator::GreaterThan, json!(100));
    let empty = Record::new();
    assert!(resolve(&c).unwrap().matches(&empty).unwrap());
    assert!(resolve(&c).unwrap().matches(&rec(json!(null))).unwrap());
    let strict = resolve_with(&c, MissingFieldPolicy::Drop).unwrap();
    assert!(!strict.matches(&empty).unwrap());
  }

  #[test]
  fn uncoercible_field_values_surface_errors() {
    let c = clause(FieldType::Decimal, ComparisonOperator::GreaterThan, json!(1));
    let err = resolve(&c).unwrap().matches(&rec(json!("lots"))).unwrap_err();
    assert!(matches!(err, EngineError::Coercion(_)));

    let c = clause(FieldType::DateTime, ComparisonOperator::IsAfter, json!("2024-03-05"));
    let err = resolve(&c).unwrap().matches(&rec(json!("someday"))).unwrap_err();
    assert!(matches!(
      err,
      EngineError::Coercion(CoercionError { target: CoercionTarget::DateTime, .. })
    ));
  }
}
