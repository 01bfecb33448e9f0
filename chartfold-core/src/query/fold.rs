use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use tracing::trace;

use crate::api::errors::Result;
use crate::api::options::MissingFieldPolicy;
use crate::api::types::{FilterClause, Record};
use crate::query::filters::FilterSet;

/// Producer of an async record stream.
///
/// Each call to `open` starts the sequence over from the first record, which
/// is what lets a [`Fold`] make one pass per filter entry.
pub trait RecordSource {
  fn open(&self) -> BoxStream<'_, anyhow::Result<Record>>;
}

impl RecordSource for [Record] {
  fn open(&self) -> BoxStream<'_, anyhow::Result<Record>> {
    stream::iter(self.iter().cloned().map(Ok)).boxed()
  }
}

impl RecordSource for Vec<Record> {
  fn open(&self) -> BoxStream<'_, anyhow::Result<Record>> {
    self.as_slice().open()
  }
}

/// Records drained from a one-shot stream and held in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializedSource {
  records: Vec<Record>,
}

impl MaterializedSource {
  pub fn new(records: Vec<Record>) -> Self {
    Self { records }
  }

  pub fn records(&self) -> &[Record] {
    &self.records
  }

  pub fn into_records(self) -> Vec<Record> {
    self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl From<Vec<Record>> for MaterializedSource {
  fn from(records: Vec<Record>) -> Self {
    Self::new(records)
  }
}

impl RecordSource for MaterializedSource {
  fn open(&self) -> BoxStream<'_, anyhow::Result<Record>> {
    self.records.open()
  }
}

/// Drains `stream` once. The first item error aborts the drain.
pub async fn materialize<S>(stream: S) -> Result<MaterializedSource>
where
  S: Stream<Item = anyhow::Result<Record>>,
{
  let records: Vec<Record> = stream.try_collect().await?;
  Ok(MaterializedSource::new(records))
}

/// Map/reduce over a record source, one accumulator per filter entry.
pub struct Fold<A, M, R> {
  pub filters: Vec<Vec<FilterClause>>,
  pub map: M,
  pub reduce: R,
  pub initial: A,
}

impl<A, M, R> Fold<A, M, R> {
  pub fn new(initial: A, map: M, reduce: R) -> Self {
    Self {
      filters: Vec::new(),
      map,
      reduce,
      initial,
    }
  }

  pub fn with_filters(mut self, filters: Vec<Vec<FilterClause>>) -> Self {
    self.filters = filters;
    self
  }

  pub fn with_filter(mut self, clauses: Vec<FilterClause>) -> Self {
    self.filters.push(clauses);
    self
  }
}

impl<A: Clone, M, R> Fold<A, M, R> {
  /// Opens `source` once per filter entry and folds the records that pass.
  /// With no entries a single unfiltered pass is made.
  pub async fn run<S, T>(&self, source: &S, on_missing: MissingFieldPolicy) -> Result<Vec<A>>
  where
    S: RecordSource + ?Sized,
    M: Fn(&Record) -> Result<T>,
    R: Fn(A, T) -> Result<A>,
  {
    // Compile every entry before touching the source.
    let sets = if self.filters.is_empty() {
      vec![FilterSet::default()]
    } else {
      self
        .filters
        .iter()
        .map(|clauses| FilterSet::compile(clauses, on_missing))
        .collect::<Result<Vec<_>>>()?
    };

    let mut out = Vec::with_capacity(sets.len());
    for (pass, set) in sets.iter().enumerate() {
      let mut records = source.open();
      let mut acc = self.initial.clone();
      let (mut seen, mut kept) = (0usize, 0usize);
      while let Some(item) = records.next().await {
        let record = item?;
        seen += 1;
        if !set.matches(&record)? {
          continue;
        }
        kept += 1;
        acc = (self.reduce)(acc, (self.map)(&record)?)?;
      }
      trace!(pass, seen, kept, clauses = set.len(), "fold pass finished");
      out.push(acc);
    }
    Ok(out)
  }

  /// [`Fold::run`] followed by `select` on every accumulator.
  pub async fn run_select<S, T, O, F>(
    &self,
    source: &S,
    on_missing: MissingFieldPolicy,
    select: F,
  ) -> Result<Vec<O>>
  where
    S: RecordSource + ?Sized,
    M: Fn(&Record) -> Result<T>,
    R: Fn(A, T) -> Result<A>,
    F: Fn(A) -> Result<O>,
  {
    self
      .run(source, on_missing)
      .await?
      .into_iter()
      .map(select)
      .collect()
  }
}
