//! Pure transformations from raw Dotmatics JSON into the shapes handed to callers.
//!
//! Data responses look like `{"<experiment id>": {"dataSources": {"<ds id>": {"<row id>": {...}}}}}`.
//! Nothing here performs I/O.

use crate::config::DataSourceIds;
use crate::errors::{ClientError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Lane column of every sample sheet row.
pub const ANY_LANE: &str = "*";

const LIBRARY_ID: &str = "LIBRARY_ID";
const I7_NAME: &str = "I7_NAME";

fn malformed(msg: String) -> ClientError {
    ClientError::MalformedResponse(msg)
}

/// Takes the `dataSources` object out of the record for `experiment_id`.
pub fn experiment_data_sources(mut doc: Value, experiment_id: &str) -> Result<Map<String, Value>> {
    let sources = doc
        .get_mut(experiment_id)
        .ok_or_else(|| malformed(format!("no record for experiment {experiment_id}")))?
        .get_mut("dataSources")
        .map(Value::take)
        .ok_or_else(|| {
            malformed(format!(
                "record for experiment {experiment_id} has no dataSources"
            ))
        })?;

    match sources {
        Value::Object(map) => Ok(map),
        _ => Err(malformed(format!(
            "dataSources for experiment {experiment_id} is not an object"
        ))),
    }
}

pub fn data_source(sources: &Map<String, Value>, data_source_id: &str) -> Result<Value> {
    sources
        .get(data_source_id)
        .cloned()
        .ok_or_else(|| malformed(format!("data source {data_source_id} missing from response")))
}

/// Row values of one data source. Rows normally come keyed by row id, a plain array is
/// accepted as well.
pub fn data_source_rows(source: Value, data_source_id: &str) -> Result<Vec<Value>> {
    match source {
        Value::Object(rows) => Ok(rows.into_iter().map(|(_, row)| row).collect()),
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        _ => Err(malformed(format!(
            "data source {data_source_id} does not contain rows"
        ))),
    }
}

/// Rows of a single data source from a data response for `experiment_id`.
pub fn experiment_rows(doc: Value, experiment_id: &str, data_source_id: &str) -> Result<Vec<Value>> {
    let source = experiment_data_sources(doc, experiment_id)?
        .remove(data_source_id)
        .ok_or_else(|| malformed(format!("data source {data_source_id} missing from response")))?;
    data_source_rows(source, data_source_id)
}

/// Finds the `dsID` of the single directory entry whose `name` equals `name`.
pub fn find_data_source_id(directory: &Value, name: &str) -> Result<String> {
    let entries = directory
        .get("dataSources")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("project has no dataSources directory".to_string()))?;

    let matches: Vec<&Value> = entries
        .values()
        .filter(|entry| entry.get("name").and_then(Value::as_str) == Some(name))
        .collect();

    let entry = match matches.as_slice() {
        [] => return Err(ClientError::DataSourceNotFound(name.to_string())),
        [entry] => *entry,
        _ => {
            return Err(ClientError::AmbiguousDataSource {
                name: name.to_string(),
                count: matches.len(),
            });
        }
    };

    match entry.get("dsID") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(malformed(format!("data source {name} has no dsID"))),
    }
}

/// The five data sources of a HashSeq experiment under their readable names.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExperimentSummary {
    pub summary: Value,
    pub test_sample: Value,
    pub tech_data: Value,
    pub pool: Value,
    pub hashseq: Value,
}

impl ExperimentSummary {
    pub fn from_data_sources(sources: &Map<String, Value>, ids: &DataSourceIds) -> Result<Self> {
        Ok(ExperimentSummary {
            summary: data_source(sources, &ids.studies_summary_hashseq)?,
            test_sample: data_source(sources, &ids.test_sample)?,
            tech_data: data_source(sources, &ids.clt_hash_bio_tech)?,
            pool: data_source(sources, &ids.clt_pool)?,
            hashseq: data_source(sources, &ids.clt_assay_hashseq)?,
        })
    }
}

/// One line of the demultiplexing sample sheet: lane, library id and i7 index name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SampleCsvRow {
    pub lane: String,
    pub library_id: Option<String>,
    pub i7_name: Option<String>,
}

impl SampleCsvRow {
    pub fn new(library_id: Option<String>, i7_name: Option<String>) -> Self {
        SampleCsvRow {
            lane: ANY_LANE.to_string(),
            library_id,
            i7_name,
        }
    }

    pub fn from_row(row: &Value) -> Self {
        SampleCsvRow::new(scalar_text(row.get(LIBRARY_ID)), scalar_text(row.get(I7_NAME)))
    }
}

impl fmt::Display for SampleCsvRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.lane,
            self.library_id.as_deref().unwrap_or_default(),
            self.i7_name.as_deref().unwrap_or_default()
        )
    }
}

pub fn sample_csv_rows(rows: Vec<Value>) -> HashSet<SampleCsvRow> {
    rows.iter().map(SampleCsvRow::from_row).collect()
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Builds a row transform that keeps only `field` of every row (null where absent).
pub fn pluck_field(field: impl Into<String>) -> impl Fn(Vec<Value>) -> Vec<Value> {
    let field = field.into();
    move |rows: Vec<Value>| {
        rows.into_iter()
            .map(|mut row| row.get_mut(&field).map(Value::take).unwrap_or(Value::Null))
            .collect()
    }
}
