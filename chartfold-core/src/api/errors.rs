use thiserror::Error;

use crate::api::types::{AggregationKind, ComparisonOperator, FieldType};

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionTarget {
  Decimal,
  DateTime,
}

impl std::fmt::Display for CoercionTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CoercionTarget::Decimal => f.write_str("decimal"),
      CoercionTarget::DateTime => f.write_str("datetime"),
    }
  }
}

/// A raw value that has no canonical representation for the requested type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce `{raw}` to {target}")]
pub struct CoercionError {
  pub raw: String,
  pub target: CoercionTarget,
}

impl CoercionError {
  pub fn new(raw: impl Into<String>, target: CoercionTarget) -> Self {
    Self {
      raw: raw.into(),
      target,
    }
  }
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Coercion(#[from] CoercionError),

  #[error("comparison `{comparison}` is not supported for {field_type} fields")]
  UnsupportedComparison {
    field_type: FieldType,
    comparison: ComparisonOperator,
  },

  #[error("unknown aggregation kind `{kind}`")]
  UnsupportedAggregation { kind: String },

  #[error("aggregation `{kind}` requires `{binding}`")]
  MissingFieldBinding {
    kind: AggregationKind,
    binding: &'static str,
  },

  #[error("aggregation `{kind}` over `{field}` matched no records")]
  EmptyAggregation { kind: AggregationKind, field: String },

  #[error("invalid configuration: {reason}")]
  InvalidConfig { reason: String },

  #[error("decimal overflow while computing `{kind}`")]
  Overflow { kind: AggregationKind },

  #[error(transparent)]
  Source(#[from] anyhow::Error),
}

impl EngineError {
  pub(crate) fn invalid(reason: impl Into<String>) -> Self {
    EngineError::InvalidConfig {
      reason: reason.into(),
    }
  }

  /// True for failures raised while validating configuration, before any
  /// record is read.
  pub fn is_config_error(&self) -> bool {
    matches!(
      self,
      EngineError::UnsupportedComparison { .. }
        | EngineError::UnsupportedAggregation { .. }
        | EngineError::MissingFieldBinding { .. }
        | EngineError::InvalidConfig { .. }
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_name_the_offending_parts() {
    let err = EngineError::UnsupportedComparison {
      field_type: FieldType::String,
      comparison: ComparisonOperator::Between,
    };
    assert_eq!(
      err.to_string(),
      "comparison `BETWEEN` is not supported for STRING fields"
    );

    let err = EngineError::MissingFieldBinding {
      kind: AggregationKind::GroupBySum,
      binding: "groupBySumField",
    };
    assert_eq!(
      err.to_string(),
      "aggregation `GroupBySum` requires `groupBySumField`"
    );
    assert!(err.is_config_error());

    let err: EngineError = CoercionError::new("abc", CoercionTarget::Decimal).into();
    assert_eq!(err.to_string(), "cannot coerce `abc` to decimal");
    assert!(!err.is_config_error());
  }

  #[test]
  fn source_errors_keep_their_message() {
    let err: EngineError = anyhow::anyhow!("connection reset").into();
    assert_eq!(err.to_string(), "connection reset");
  }
}
