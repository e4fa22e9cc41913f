use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Default result cache period for executions, in seconds.
pub const DEFAULT_CACHE_TIMEOUT: u64 = 86400;

/// One user-configured notebook query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryTarget {
    #[serde(deserialize_with = "null_as_empty")]
    pub ref_id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub path: String,
    /// Saved queries may carry `[]` or `null` here; both mean no parameters.
    #[serde(deserialize_with = "object_or_empty")]
    pub parameters: Map<String, Value>,
    #[serde(deserialize_with = "null_as_empty")]
    pub output: String,
    /// Result cache period in seconds; the data source default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_timeout: Option<u64>,
}

impl QueryTarget {
    pub fn new(path: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            output: output.into(),
            ..Default::default()
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn object_or_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Queued | ExecutionStatus::InProgress)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Canceled => "CANCELED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// A notebook execution as reported by the execution service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub notebook_path: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub cached_result: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExecutionRequest {
    pub notebook_path: String,
    pub parameters: Map<String, Value>,
    pub result_cache_period: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedExecution {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub path: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub metadata: NotebookMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookMetadata {
    pub version: u32,
    pub parameters: Vec<NotebookParameter>,
    pub outputs: Vec<NotebookOutput>,
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebookParameter {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebookOutput {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Variable query selecting the enumerated options of one notebook parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotebookParameterQuery {
    pub path: String,
    pub parameter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QueryNotebooksRequest {
    pub filter: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct QueryNotebooksResponse {
    #[serde(default)]
    pub notebooks: Option<Vec<Notebook>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultValuesRequest {
    pub field: String,
    pub starts_with: String,
}

/// Response of the auth service describing the caller's granted policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthInfo {
    pub policies: Vec<Policy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resource: Vec<String>,
}

impl AuthInfo {
    pub fn allows(&self, action: &str) -> bool {
        let service = action.split(':').next().unwrap_or(action);
        self.policies
            .iter()
            .flat_map(|p| p.statements.iter())
            .flat_map(|s| s.actions.iter())
            .any(|granted| {
                granted == "*"
                    || granted == action
                    || granted
                        .strip_suffix(":*")
                        .map_or(false, |prefix| prefix == service)
            })
    }
}
