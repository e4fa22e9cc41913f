use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    client::NotebookBackend,
    frame::Frame,
    metrics::{self, QueryTimer},
    models::{
        ExecutionStatus, Notebook, NotebookParameterQuery, QueryTarget, DEFAULT_CACHE_TIMEOUT,
    },
    normalize::normalize,
    poller::{ExecutionPoller, PollSettings},
    schema::validate_result,
    substitute::{substitute_parameters, VariableContext},
    DataSourceError, Result,
};

/// Permissions the data source needs from the auth service.
pub const REQUIRED_PERMISSIONS: [&str; 3] = [
    "notebook:Query",
    "notebookexecution:Execute",
    "notebookexecution:Query",
];

pub const DEFAULT_EXCLUDED_NAMESPACE: &str = "ni-testmanagement";

const SUPPORTED_NOTEBOOK_VERSION: u32 = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "data")]
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub message: String,
}

/// Evaluates notebook queries against an injected backend.
pub struct NotebookDataSource<B: NotebookBackend> {
    backend: B,
    poll: PollSettings,
    default_cache_timeout: u64,
    excluded_namespace: String,
}

impl<B: NotebookBackend> NotebookDataSource<B> {
    pub fn new(backend: B, poll: PollSettings) -> Self {
        Self {
            backend,
            poll,
            default_cache_timeout: DEFAULT_CACHE_TIMEOUT,
            excluded_namespace: DEFAULT_EXCLUDED_NAMESPACE.to_string(),
        }
    }

    pub fn with_default_cache_timeout(mut self, seconds: u64) -> Self {
        self.default_cache_timeout = seconds;
        self
    }

    pub fn with_excluded_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.excluded_namespace = namespace.into();
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run every target in order and concatenate their frames.
    ///
    /// The first failing target aborts the whole query; frames already
    /// produced by earlier targets are discarded.
    pub async fn query(
        &self,
        targets: &[QueryTarget],
        context: &dyn VariableContext,
    ) -> Result<QueryResponse> {
        let _timer = QueryTimer::new();
        let result = self.run_targets(targets, context).await;
        match &result {
            Ok(response) => metrics::record_frames(response.frames.len()),
            Err(e) => {
                metrics::record_query_failure();
                warn!("Notebook query failed: {}", e);
            }
        }
        result
    }

    async fn run_targets(
        &self,
        targets: &[QueryTarget],
        context: &dyn VariableContext,
    ) -> Result<QueryResponse> {
        if targets.is_empty() {
            return Err(DataSourceError::NotConfigured);
        }

        let mut frames = Vec::new();
        for target in targets.iter().filter(|t| !t.path.is_empty()) {
            frames.extend(self.run_target(target, context).await?);
        }
        Ok(QueryResponse { frames })
    }

    #[instrument(skip_all, fields(ref_id = %target.ref_id, notebook = %target.path))]
    async fn run_target(
        &self,
        target: &QueryTarget,
        context: &dyn VariableContext,
    ) -> Result<Vec<Frame>> {
        let parameters = substitute_parameters(&target.parameters, context);
        let poller = ExecutionPoller::new(&self.backend, self.poll);
        let cache_timeout = target.cache_timeout.unwrap_or(self.default_cache_timeout);
        let execution = poller.run(&target.path, parameters, cache_timeout).await?;

        if execution.status != ExecutionStatus::Succeeded {
            return Err(DataSourceError::ExecutionFailed {
                status: execution.status,
                exception: execution.exception,
            });
        }

        let raw = execution.result.ok_or_else(|| {
            DataSourceError::SchemaMismatch("succeeded execution has no result".to_string())
        })?;
        let results = validate_result(&raw)?;
        let output = results
            .iter()
            .find(|r| r.id == target.output)
            .ok_or_else(|| DataSourceError::OutputNotFound {
                output: target.output.clone(),
            })?;

        normalize(output, target)
    }

    /// Notebooks whose path contains `path`, restricted to the supported
    /// metadata version.
    pub async fn query_notebooks(&self, path: &str) -> Result<Vec<Notebook>> {
        let filter = format!(
            "path.Contains(\"{}\") && !metadata.namespaces.Contains(\"{}\")",
            escape_quotes(path),
            escape_quotes(&self.excluded_namespace)
        );
        let notebooks = match self.backend.query_notebooks(&filter).await? {
            Some(notebooks) => notebooks,
            None => {
                warn!("Notebook query response did not contain a notebook list");
                return Ok(Vec::new());
            }
        };

        Ok(notebooks
            .into_iter()
            .filter(|n| n.metadata.version == SUPPORTED_NOTEBOOK_VERSION)
            .collect())
    }

    /// Enumerated options of one notebook parameter, for dashboard variables.
    pub async fn parameter_values(&self, query: &NotebookParameterQuery) -> Result<Vec<String>> {
        let notebooks = self.query_notebooks(&query.path).await?;
        let options = notebooks
            .iter()
            .find(|n| n.path == query.path)
            .and_then(|n| {
                n.metadata
                    .parameters
                    .iter()
                    .find(|p| p.id == query.parameter)
            })
            .and_then(|p| p.options.clone())
            .unwrap_or_default();
        Ok(options)
    }

    pub async fn autocomplete(&self, field: &str, starts_with: &str) -> Result<Vec<String>> {
        self.backend.query_result_values(field, starts_with).await
    }

    /// Check that the configured credentials carry every required permission.
    pub async fn test_datasource(&self) -> HealthStatus {
        let auth = match self.backend.get_auth().await {
            Ok(auth) => auth,
            Err(e) => {
                warn!("Health check failed: {}", e);
                return HealthStatus {
                    status: HealthState::Error,
                    message: format!("Failed to reach the notebook service: {}", e),
                };
            }
        };

        let missing: Vec<&str> = REQUIRED_PERMISSIONS
            .iter()
            .copied()
            .filter(|p| !auth.allows(p))
            .collect();

        if missing.is_empty() {
            info!("Health check succeeded");
            HealthStatus {
                status: HealthState::Success,
                message: "Success".to_string(),
            }
        } else {
            HealthStatus {
                status: HealthState::Error,
                message: format!("Missing required permissions: {}", missing.join(", ")),
            }
        }
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('"', "\\\"")
}

/// Display label for a notebook path: shared notebooks drop the leading
/// underscore, personal notebooks drop the owning user segment.
pub fn notebook_label(path: &str) -> &str {
    if path.starts_with("_shared") {
        &path[1..]
    } else {
        path.find('/').map_or(path, |ix| &path[ix..])
    }
}
