//! Typed shapes of a notebook execution result.
//!
//! The execution service reports results as loosely typed JSON. Everything
//! past [`validate_result`] works with the closed types defined here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DataSourceError, Result};

/// One named output of a notebook run.
#[derive(Debug, Clone, PartialEq)]
pub struct NotebookResult {
    pub id: String,
    pub payload: ResultPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultPayload {
    Scalar {
        value: Value,
    },
    DataFrame {
        data: DataFrameData,
        #[serde(default)]
        config: Option<DisplayConfig>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataFrameData {
    Series(Vec<SeriesPayload>),
    Table(ColumnarTable),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format")]
pub enum SeriesPayload {
    #[serde(rename = "XY")]
    Xy { x: Vec<Value>, y: Vec<Value> },
    #[serde(rename = "INDEX")]
    Index { y: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnarTable {
    pub columns: Vec<ColumnSpec>,
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: Option<String>,
    pub graph: Option<GraphConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub axis_labels: Vec<String>,
    pub plot_labels: Vec<String>,
    pub plot_style: Vec<String>,
    pub orientation: Option<String>,
    pub tick_labels: Vec<Value>,
}

impl DisplayConfig {
    pub fn plot_label(&self, index: usize) -> Option<&str> {
        self.graph
            .as_ref()
            .and_then(|g| g.plot_labels.get(index))
            .map(String::as_str)
    }
}

impl NotebookResult {
    /// Parse a single output entry: an object carrying `id` plus a payload.
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| "result entry is missing a string 'id'".to_string())?
            .to_string();
        let payload = ResultPayload::deserialize(value)
            .map_err(|e| format!("result '{}': {}", id, e))?;
        Ok(Self { id, payload })
    }
}

/// Validate the `result` of a succeeded execution.
///
/// The expected envelope is `{ "result": [ { "id": ..., "type": ..., ... } ] }`.
pub fn validate_result(value: &Value) -> Result<Vec<NotebookResult>> {
    let entries = value
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            DataSourceError::SchemaMismatch("expected an object with a 'result' array".to_string())
        })?;

    entries
        .iter()
        .map(|entry| NotebookResult::from_value(entry).map_err(DataSourceError::SchemaMismatch))
        .collect()
}
