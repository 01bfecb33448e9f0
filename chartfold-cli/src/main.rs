use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chartfold_core::api::types::{AggregationResult, AggregationSpec, FilterClause, Record};
use chartfold_core::api::{Engine, EngineOptions};
use chartfold_core::RecordSource;
use clap::{Parser, Subcommand};
use futures::executor::block_on;
use futures::stream::{self, BoxStream, StreamExt};

#[derive(Parser)]
#[command(name = "chartfold", version, about = "Typed filters and aggregations over JSON records")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run one aggregation over a data file
  Aggregate {
    /// JSON array or JSONL file of records
    #[arg(long)]
    data: PathBuf,
    /// Aggregation spec file (`-` reads stdin)
    #[arg(long)]
    spec: Option<PathBuf>,
    /// Inline aggregation spec JSON
    #[arg(long, conflicts_with = "spec")]
    spec_json: Option<String>,
    /// Engine options JSON file
    #[arg(long)]
    options: Option<PathBuf>,
    /// Read JSONL incrementally instead of loading it up front
    #[arg(long)]
    stream: bool,
  },
  /// Print the records that pass a list of filter clauses
  Filter {
    #[arg(long)]
    data: PathBuf,
    #[arg(long)]
    filters: Option<PathBuf>,
    #[arg(long, conflicts_with = "filters")]
    filters_json: Option<String>,
    #[arg(long)]
    options: Option<PathBuf>,
  },
  /// Check an aggregation spec without reading data
  Validate {
    #[arg(long)]
    spec: Option<PathBuf>,
    #[arg(long, conflicts_with = "spec")]
    spec_json: Option<String>,
  },
}

fn main() -> Result<()> {
  env_logger::init();
  let cli = Cli::parse();
  match cli.command {
    Commands::Aggregate {
      data,
      spec,
      spec_json,
      options,
      stream,
    } => {
      let spec = load_spec(spec, spec_json)?;
      let engine = engine(options.as_deref())?;
      cmd_aggregate(&engine, &data, &spec, stream)
    }
    Commands::Filter {
      data,
      filters,
      filters_json,
      options,
    } => {
      let clauses = load_filters(filters, filters_json)?;
      let engine = engine(options.as_deref())?;
      cmd_filter(&engine, &data, &clauses)
    }
    Commands::Validate { spec, spec_json } => {
      let spec = load_spec(spec, spec_json)?;
      cmd_validate(&spec)
    }
  }
}

fn engine(options: Option<&Path>) -> Result<Engine> {
  let options = match options {
    Some(path) => EngineOptions::from_file(path)?,
    None => EngineOptions::default(),
  };
  Ok(Engine::with_options(options))
}

fn cmd_aggregate(engine: &Engine, data: &Path, spec: &AggregationSpec, stream: bool) -> Result<()> {
  let result = run_aggregate(engine, data, spec, stream)?;
  println!("{}", serde_json::to_string_pretty(&result)?);
  Ok(())
}

fn run_aggregate(
  engine: &Engine,
  data: &Path,
  spec: &AggregationSpec,
  stream: bool,
) -> Result<AggregationResult> {
  let kind = spec.kind();
  if stream {
    let source = JsonlFileSource::new(data);
    return block_on(engine.aggregate_stream(&source, spec))
      .with_context(|| format!("streaming `{kind}` over {:?}", data));
  }
  let records = load_records(data)?;
  engine
    .aggregate(&records, spec)
    .with_context(|| format!("running `{kind}` over {:?}", data))
}

fn cmd_filter(engine: &Engine, data: &Path, clauses: &[FilterClause]) -> Result<()> {
  let records = load_records(data)?;
  let kept = engine
    .filter(&records, clauses)
    .with_context(|| format!("filtering {:?}", data))?;
  println!("{}", serde_json::to_string_pretty(&kept)?);
  Ok(())
}

fn cmd_validate(spec: &AggregationSpec) -> Result<()> {
  Engine::new().validate(spec)?;
  let kind = spec.kind();
  println!(
    "ok: {kind} ({} filter clauses, bindings: {})",
    spec.filters().len(),
    kind.required_bindings().join(", ")
  );
  Ok(())
}

fn read_source(path: Option<PathBuf>, inline: Option<String>, what: &str) -> Result<String> {
  match (path, inline) {
    (Some(p), _) if p.as_os_str() == "-" => {
      let mut buf = String::new();
      io::stdin()
        .read_to_string(&mut buf)
        .with_context(|| format!("reading {what} from stdin"))?;
      Ok(buf)
    }
    (Some(p), _) => fs::read_to_string(&p).with_context(|| format!("reading {what} from {:?}", p)),
    (None, Some(body)) => Ok(body),
    (None, None) => bail!("no {what} given"),
  }
}

fn load_spec(path: Option<PathBuf>, inline: Option<String>) -> Result<AggregationSpec> {
  let body = read_source(path, inline, "aggregation spec")?;
  AggregationSpec::from_json(&body).context("invalid aggregation spec")
}

fn load_filters(path: Option<PathBuf>, inline: Option<String>) -> Result<Vec<FilterClause>> {
  let body = read_source(path, inline, "filter clauses")?;
  if body.trim().is_empty() {
    return Ok(Vec::new());
  }
  serde_json::from_str(&body).context("invalid filter clauses JSON")
}

/// Reads a JSON array of objects, or JSONL with one object per line.
fn load_records(path: &Path) -> Result<Vec<Record>> {
  let content =
    fs::read_to_string(path).with_context(|| format!("reading records from {:?}", path))?;
  if content.trim_start().starts_with('[') {
    return serde_json::from_str(&content)
      .with_context(|| format!("parsing JSON array from {:?}", path));
  }
  let mut records = Vec::new();
  for (line_no, line) in content.lines().enumerate() {
    if line.trim().is_empty() {
      continue;
    }
    let record: Record =
      serde_json::from_str(line).with_context(|| format!("invalid JSON on line {}", line_no + 1))?;
    records.push(record);
  }
  Ok(records)
}

/// JSONL file that is re-read from the start on every `open`.
struct JsonlFileSource {
  path: PathBuf,
}

impl JsonlFileSource {
  fn new(path: &Path) -> Self {
    Self {
      path: path.to_path_buf(),
    }
  }
}

impl RecordSource for JsonlFileSource {
  fn open(&self) -> BoxStream<'_, anyhow::Result<Record>> {
    let file = match File::open(&self.path) {
      Ok(file) => file,
      Err(err) => {
        let err = anyhow::Error::new(err).context(format!("opening {:?}", self.path));
        return stream::iter(std::iter::once(Err(err))).boxed();
      }
    };
    let rows = BufReader::new(file)
      .lines()
      .enumerate()
      .filter_map(|(line_no, line)| match line {
        Err(err) => Some(Err(
          anyhow::Error::new(err).context(format!("reading line {}", line_no + 1)),
        )),
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(
          serde_json::from_str::<Record>(&line)
            .with_context(|| format!("invalid JSON on line {}", line_no + 1)),
        ),
      });
    stream::iter(rows).boxed()
  }
}
