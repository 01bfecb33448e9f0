//! Coercion of loosely-typed record values into canonical decimals, instants
//! and textual group keys.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::{Number, Value};

use crate::api::errors::{CoercionError, CoercionTarget};

/// Patterns with a time-of-day component, tried in order after RFC 3339.
const DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%Y/%m/%d %H:%M:%S%.f",
  "%Y/%m/%d %H:%M",
  "%m/%d/%Y %H:%M:%S%.f",
  "%m/%d/%Y %H:%M",
  "%m-%d-%Y %H:%M:%S%.f",
  "%m-%d-%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y"];

/// Free-form dates accepted by the generic fallback.
const LOOSE_DATE_FORMATS: &[&str] = &[
  "%B %d, %Y",
  "%b %d, %Y",
  "%B %d %Y",
  "%b %d %Y",
  "%d %B %Y",
  "%d %b %Y",
  "%a %b %d %Y",
  "%Y%m%d",
];

pub trait ToDecimal {
  fn to_decimal(&self) -> Result<Decimal, CoercionError>;
}

impl ToDecimal for Decimal {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    Ok(*self)
  }
}

impl ToDecimal for bool {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    Ok(if *self { Decimal::ONE } else { Decimal::ZERO })
  }
}

impl ToDecimal for i64 {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    Ok(Decimal::from(*self))
  }
}

impl ToDecimal for f64 {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    if !self.is_finite() {
      return Err(CoercionError::new(self.to_string(), CoercionTarget::Decimal));
    }
    // Display yields the shortest round-trip form, so 0.1 stays 0.1.
    parse_decimal(&self.to_string())
  }
}

impl ToDecimal for str {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    let trimmed = self.trim();
    if trimmed.is_empty() {
      return Ok(Decimal::ZERO);
    }
    parse_decimal(trimmed)
  }
}

impl ToDecimal for Value {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    match self {
      Value::Null => Ok(Decimal::ZERO),
      Value::Bool(b) => b.to_decimal(),
      Value::Number(n) => number_to_decimal(n),
      Value::String(s) => s.as_str().to_decimal(),
      other => Err(CoercionError::new(other.to_string(), CoercionTarget::Decimal)),
    }
  }
}

impl<T: ToDecimal + ?Sized> ToDecimal for &T {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    (**self).to_decimal()
  }
}

impl<T: ToDecimal> ToDecimal for Option<T> {
  fn to_decimal(&self) -> Result<Decimal, CoercionError> {
    match self {
      Some(v) => v.to_decimal(),
      None => Ok(Decimal::ZERO),
    }
  }
}

/// Converts a raw value into a decimal; null and blank text become zero.
pub fn coerce_decimal<T: ToDecimal + ?Sized>(raw: &T) -> Result<Decimal, CoercionError> {
  raw.to_decimal()
}

/// Like [`coerce_decimal`] but anything unrepresentable counts as zero.
pub fn lenient_decimal(raw: Option<&Value>) -> Decimal {
  raw
    .map(|v| coerce_decimal(v).unwrap_or(Decimal::ZERO))
    .unwrap_or(Decimal::ZERO)
}

/// Like [`coerce_decimal`] but only numbers and numeric text qualify.
pub fn numeric_value(raw: &Value) -> Option<Decimal> {
  match raw {
    Value::Number(n) => number_to_decimal(n).ok(),
    Value::String(s) if !s.trim().is_empty() => parse_decimal(s.trim()).ok(),
    _ => None,
  }
}

fn number_to_decimal(n: &Number) -> Result<Decimal, CoercionError> {
  if let Some(i) = n.as_i64() {
    return Ok(Decimal::from(i));
  }
  if let Some(u) = n.as_u64() {
    return Ok(Decimal::from(u));
  }
  match n.as_f64() {
    Some(f) => f.to_decimal(),
    None => parse_decimal(&n.to_string()),
  }
}

fn parse_decimal(text: &str) -> Result<Decimal, CoercionError> {
  let unsigned = text.strip_prefix('+').unwrap_or(text);
  Decimal::from_str(unsigned)
    .or_else(|_| Decimal::from_scientific(unsigned))
    .map_err(|_| CoercionError::new(text, CoercionTarget::Decimal))
}

/// Converts a raw value into a calendar date/time.
///
/// Text is matched against RFC 3339, the ISO / slash / dash layouts (with and
/// without a time of day), then a generic set of long-form layouts. Numbers
/// are read as epoch milliseconds.
pub fn coerce_datetime(raw: &Value) -> Result<NaiveDateTime, CoercionError> {
  match raw {
    Value::String(s) => parse_datetime(s),
    Value::Number(n) => n
      .as_i64()
      .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
      .and_then(DateTime::from_timestamp_millis)
      .map(|dt| dt.naive_utc())
      .ok_or_else(|| CoercionError::new(n.to_string(), CoercionTarget::DateTime)),
    other => Err(CoercionError::new(other.to_string(), CoercionTarget::DateTime)),
  }
}

pub fn parse_datetime(text: &str) -> Result<NaiveDateTime, CoercionError> {
  let s = text.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.naive_utc());
  }
  for fmt in DATETIME_FORMATS {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
      return Ok(dt);
    }
  }
  for fmt in DATE_FORMATS {
    if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
      return Ok(midnight(date));
    }
  }
  generic_datetime(s).ok_or_else(|| CoercionError::new(text, CoercionTarget::DateTime))
}

fn generic_datetime(s: &str) -> Option<NaiveDateTime> {
  if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
    return Some(dt.naive_utc());
  }
  if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %z") {
    return Some(dt.naive_utc());
  }
  LOOSE_DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    .map(midnight)
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
  date.and_time(NaiveTime::default())
}

/// JavaScript-style truthiness: null, false, 0, NaN and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  }
}

/// Textual form of a value for string comparisons. `None` for null.
pub fn as_text(value: &Value) -> Option<Cow<'_, str>> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(Cow::Borrowed(s.as_str())),
    Value::Number(n) => Some(Cow::Owned(number_text(n))),
    other => Some(Cow::Owned(other.to_string())),
  }
}

/// Group label for a value, or `None` when the value is falsy.
pub fn group_key(value: &Value) -> Option<Cow<'_, str>> {
  if is_truthy(value) {
    as_text(value)
  } else {
    None
  }
}

/// Integral floats print without a trailing `.0` so `3.0` and `3` share a key.
fn number_text(n: &Number) -> String {
  match n.as_f64() {
    Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
      format!("{}", f as i64)
    }
    _ => n.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{NaiveDate, Timelike};
  use serde_json::json;

  fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
  }

  #[test]
  fn decimal_coercion_covers_scalar_shapes() {
    assert_eq!(coerce_decimal(&json!(null)).unwrap(), Decimal::ZERO);
    assert_eq!(coerce_decimal(&json!("")).unwrap(), Decimal::ZERO);
    assert_eq!(coerce_decimal(&json!("   ")).unwrap(), Decimal::ZERO);
    assert_eq!(coerce_decimal(&json!(true)).unwrap(), Decimal::ONE);
    assert_eq!(coerce_decimal(&json!(false)).unwrap(), Decimal::ZERO);
    assert_eq!(coerce_decimal(&json!(0.1)).unwrap(), dec("0.1"));
    assert_eq!(coerce_decimal(&json!(42)).unwrap(), dec("42"));
    assert_eq!(coerce_decimal(&json!(" 12.50 ")).unwrap(), dec("12.50"));
    assert_eq!(coerce_decimal(&json!("+7")).unwrap(), dec("7"));
    assert_eq!(coerce_decimal(&json!("1.5e3")).unwrap(), dec("1500"));
    assert_eq!(coerce_decimal(&dec("3.14")).unwrap(), dec("3.14"));
    assert_eq!(coerce_decimal(&None::<Value>).unwrap(), Decimal::ZERO);
  }

  #[test]
  fn decimal_coercion_rejects_non_numeric() {
    let err = coerce_decimal(&json!("abc")).unwrap_err();
    assert_eq!(err.target, CoercionTarget::Decimal);
    assert_eq!(err.raw, "abc");
    assert!(coerce_decimal(&json!([1, 2])).is_err());
    assert!(coerce_decimal(&json!({"a": 1})).is_err());
    assert!(coerce_decimal(&f64::NAN).is_err());
  }

  #[test]
  fn lenient_and_numeric_helpers() {
    assert_eq!(lenient_decimal(Some(&json!("n/a"))), Decimal::ZERO);
    assert_eq!(lenient_decimal(None), Decimal::ZERO);
    assert_eq!(lenient_decimal(Some(&json!("4.5"))), dec("4.5"));
    assert_eq!(numeric_value(&json!("8")), Some(dec("8")));
    assert_eq!(numeric_value(&json!(null)), None);
    assert_eq!(numeric_value(&json!(true)), None);
    assert_eq!(numeric_value(&json!("")), None);
  }

  #[test]
  fn datetime_patterns_in_order() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    for raw in ["2024-03-05", "2024/03/05", "03/05/2024", "03-05-2024", "March 5, 2024"] {
      let parsed = coerce_datetime(&json!(raw)).unwrap();
      assert_eq!(parsed.date(), day, "{raw}");
      assert_eq!(parsed.hour(), 0, "{raw}");
    }
    let parsed = coerce_datetime(&json!("2024-03-05T14:30:15.250")).unwrap();
    assert_eq!(parsed.hour(), 14);
    assert_eq!(parsed.nanosecond(), 250_000_000);
    let parsed = coerce_datetime(&json!("2024-03-05 09:15")).unwrap();
    assert_eq!(parsed.minute(), 15);
    let parsed = coerce_datetime(&json!("03/05/2024 18:00:00")).unwrap();
    assert_eq!(parsed.hour(), 18);
  }

  #[test]
  fn generic_fallback_layouts() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
    let parsed = coerce_datetime(&json!("Tue, 5 Mar 2024 10:00:00 +0000")).unwrap();
    assert_eq!((parsed.date(), parsed.hour()), (day, 10));
    let parsed = coerce_datetime(&json!("2024-03-05 10:00:00 +0200")).unwrap();
    assert_eq!((parsed.date(), parsed.hour()), (day, 8));
    for raw in ["5 Mar 2024", "20240305"] {
      let parsed = coerce_datetime(&json!(raw)).unwrap();
      assert_eq!((parsed.date(), parsed.hour()), (day, 0), "{raw}");
    }
    let parsed = coerce_datetime(&json!(86_400_000.5)).unwrap();
    assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
  }

  #[test]
  fn rfc3339_offsets_normalize_to_utc() {
    let parsed = coerce_datetime(&json!("2024-03-05T23:00:00-02:00")).unwrap();
    assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 3, 6).unwrap());
    assert_eq!(parsed.hour(), 1);
  }

  #[test]
  fn numbers_are_epoch_millis() {
    let parsed = coerce_datetime(&json!(86_400_000i64)).unwrap();
    assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(1970, 1, 2).unwrap());
  }

  #[test]
  fn unparseable_dates_fail() {
    let err = coerce_datetime(&json!("not a date")).unwrap_err();
    assert_eq!(err.target, CoercionTarget::DateTime);
    assert!(coerce_datetime(&json!("2024-13-45")).is_err());
    assert!(coerce_datetime(&json!(null)).is_err());
  }

  #[test]
  fn truthiness_and_keys() {
    assert!(!is_truthy(&json!(null)));
    assert!(!is_truthy(&json!(0)));
    assert!(!is_truthy(&json!("")));
    assert!(!is_truthy(&json!(false)));
    assert!(is_truthy(&json!("0")));
    assert_eq!(group_key(&json!(3.0)).as_deref(), Some("3"));
    assert_eq!(group_key(&json!(2.5)).as_deref(), Some("2.5"));
    assert_eq!(group_key(&json!("Drama")).as_deref(), Some("Drama"));
    assert_eq!(group_key(&json!("")), None);
    assert_eq!(as_text(&json!(true)).as_deref(), Some("true"));
    assert_eq!(as_text(&json!(null)), None);
  }
}
