//! Scripted in-memory backend for tests and local development.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::{
    client::NotebookBackend,
    models::{AuthInfo, CreateExecutionRequest, Execution, ExecutionStatus, Notebook},
    DataSourceError, Result,
};

/// Backend whose executions follow a per-notebook script of statuses.
///
/// Submitting a notebook returns its path as the execution id. Each status
/// fetch consumes the next scripted execution; the last one repeats.
#[derive(Clone, Default)]
pub struct MockNotebookBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, VecDeque<Execution>>,
    submissions: Vec<CreateExecutionRequest>,
    fetches: HashMap<String, usize>,
    rejected_submission: Option<(u16, String)>,
    notebooks: Option<Vec<Notebook>>,
    filters: Vec<String>,
    result_values: Vec<String>,
    auth: Option<AuthInfo>,
}

pub fn execution(status: ExecutionStatus, result: Option<Value>) -> Execution {
    Execution {
        id: String::new(),
        notebook_path: String::new(),
        parameters: Map::new(),
        status,
        exception: None,
        result,
        cached_result: false,
    }
}

impl MockNotebookBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, path: &str, executions: Vec<Execution>) {
        self.state
            .lock()
            .scripts
            .insert(path.to_string(), executions.into());
    }

    pub fn reject_submissions(&self, status: u16, message: &str) {
        self.state.lock().rejected_submission = Some((status, message.to_string()));
    }

    pub fn set_notebooks(&self, notebooks: Option<Vec<Notebook>>) {
        self.state.lock().notebooks = notebooks;
    }

    pub fn set_result_values(&self, values: Vec<String>) {
        self.state.lock().result_values = values;
    }

    pub fn set_auth(&self, auth: AuthInfo) {
        self.state.lock().auth = Some(auth);
    }

    pub fn submissions(&self) -> Vec<CreateExecutionRequest> {
        self.state.lock().submissions.clone()
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.state.lock().fetches.get(id).copied().unwrap_or(0)
    }

    pub fn filters(&self) -> Vec<String> {
        self.state.lock().filters.clone()
    }
}

#[async_trait]
impl NotebookBackend for MockNotebookBackend {
    async fn create_execution(&self, request: &CreateExecutionRequest) -> Result<String> {
        let mut state = self.state.lock();
        if let Some((status, message)) = &state.rejected_submission {
            return Err(DataSourceError::SubmissionError {
                status: *status,
                message: message.clone(),
            });
        }
        state.submissions.push(request.clone());
        Ok(request.notebook_path.clone())
    }

    async fn get_execution(&self, id: &str) -> Result<Execution> {
        let mut state = self.state.lock();
        *state.fetches.entry(id.to_string()).or_insert(0) += 1;

        let script = state
            .scripts
            .get_mut(id)
            .ok_or_else(|| DataSourceError::Transport {
                status: Some(404),
                message: format!("Execution {} not found", id),
            })?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        let mut execution = next.ok_or_else(|| DataSourceError::Transport {
            status: Some(500),
            message: format!("Execution {} has no scripted status", id),
        })?;
        execution.id = id.to_string();
        execution.notebook_path = id.to_string();
        Ok(execution)
    }

    async fn query_notebooks(&self, filter: &str) -> Result<Option<Vec<Notebook>>> {
        let mut state = self.state.lock();
        state.filters.push(filter.to_string());
        Ok(state.notebooks.clone())
    }

    async fn query_result_values(&self, _field: &str, starts_with: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        Ok(state
            .result_values
            .iter()
            .filter(|v| v.starts_with(starts_with))
            .cloned()
            .collect())
    }

    async fn get_auth(&self) -> Result<AuthInfo> {
        self.state
            .lock()
            .auth
            .clone()
            .ok_or_else(|| DataSourceError::Transport {
                status: Some(401),
                message: "Unauthorized".to_string(),
            })
    }
}
