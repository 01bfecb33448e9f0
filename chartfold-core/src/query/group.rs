use indexmap::IndexMap;
use serde_json::Value;
use smallvec::SmallVec;

use crate::api::types::Record;
use crate::value::group_key;

/// Bucket labels a single field value contributes to.
///
/// Comma-delimited values fan out to one key per trimmed piece; empty pieces
/// are skipped and a repeated piece counts once. Falsy values yield no keys.
pub fn group_keys(value: &Value) -> SmallVec<[String; 2]> {
  let mut keys = SmallVec::new();
  let Some(text) = group_key(value) else {
    return keys;
  };
  if !text.contains(',') {
    keys.push(text.into_owned());
    return keys;
  }
  for piece in text.split(',').map(str::trim) {
    if !piece.is_empty() && !keys.iter().any(|k: &String| k == piece) {
      keys.push(piece.to_string());
    }
  }
  keys
}

/// Partitions records by `field`. Keys keep first-seen order and members keep
/// input order.
pub fn group_by<'a, I>(records: I, field: &str) -> IndexMap<String, Vec<&'a Record>>
where
  I: IntoIterator<Item = &'a Record>,
{
  let mut groups: IndexMap<String, Vec<&'a Record>> = IndexMap::new();
  for record in records {
    let Some(value) = record.get(field) else {
      continue;
    };
    for key in group_keys(value) {
      groups.entry(key).or_default().push(record);
    }
  }
  groups
}
