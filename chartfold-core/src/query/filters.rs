use crate::api::errors::Result;
use crate::api::options::MissingFieldPolicy;
use crate::api::types::{FilterClause, Record};
use crate::query::compare::{resolve_with, Predicate};

/// Clauses resolved once and combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
  predicates: Vec<Predicate>,
}

impl FilterSet {
  pub fn compile(clauses: &[FilterClause], on_missing: MissingFieldPolicy) -> Result<Self> {
    let predicates = clauses
      .iter()
      .map(|clause| resolve_with(clause, on_missing))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self { predicates })
  }

  pub fn is_empty(&self) -> bool {
    self.predicates.is_empty()
  }

  pub fn len(&self) -> usize {
    self.predicates.len()
  }

  pub fn matches(&self, record: &Record) -> Result<bool> {
    for predicate in &self.predicates {
      if !predicate.matches(record)? {
        return Ok(false);
      }
    }
    Ok(true)
  }

  /// Keeps matching records in input order.
  pub fn filter<'a, I>(&self, records: I) -> Result<Vec<&'a Record>>
  where
    I: IntoIterator<Item = &'a Record>,
  {
    let mut out = Vec::new();
    for record in records {
      if self.matches(record)? {
        out.push(record);
      }
    }
    Ok(out)
  }
}

pub fn passes_filters(record: &Record, clauses: &[FilterClause]) -> Result<bool> {
  FilterSet::compile(clauses, MissingFieldPolicy::default())?.matches(record)
}

pub fn filter_records<'a>(
  records: &'a [Record],
  clauses: &[FilterClause],
) -> Result<Vec<&'a Record>> {
  FilterSet::compile(clauses, MissingFieldPolicy::default())?.filter(records)
}
