use std::fs;
use std::path::Path;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a clause does with a record that lacks its `inputField`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingFieldPolicy {
  /// The clause passes and the record is retained.
  #[default]
  Keep,
  /// The clause fails and the record is filtered out.
  Drop,
}

impl MissingFieldPolicy {
  pub fn passes(&self) -> bool {
    matches!(self, MissingFieldPolicy::Keep)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
  pub missing_field: MissingFieldPolicy,
  pub default_bin_size: Decimal,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      missing_field: MissingFieldPolicy::Keep,
      default_bin_size: Decimal::TEN,
    }
  }
}

impl EngineOptions {
  pub fn from_file(path: &Path) -> anyhow::Result<Self> {
    let data = fs::read_to_string(path)
      .with_context(|| format!("reading engine options from {:?}", path))?;
    serde_json::from_str(&data).with_context(|| format!("parsing engine options from {:?}", path))
  }
}
