//! Transport to the notebook execution, test monitor and auth services.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    models::{
        AuthInfo, CreateExecutionRequest, CreatedExecution, Execution, Notebook,
        QueryNotebooksRequest, QueryNotebooksResponse, ResultValuesRequest,
    },
    DataSourceError, Result,
};

/// The REST operations the data source needs from the backend.
#[async_trait]
pub trait NotebookBackend: Send + Sync {
    /// Create one execution and return its id.
    async fn create_execution(&self, request: &CreateExecutionRequest) -> Result<String>;

    async fn get_execution(&self, id: &str) -> Result<Execution>;

    /// Returns `None` when the response carries no `notebooks` list.
    async fn query_notebooks(&self, filter: &str) -> Result<Option<Vec<Notebook>>>;

    async fn query_result_values(&self, field: &str, starts_with: &str) -> Result<Vec<String>>;

    async fn get_auth(&self) -> Result<AuthInfo>;
}

#[derive(Clone)]
pub struct HttpNotebookClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNotebookClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "notebook service returned an error");
            return Err(DataSourceError::Transport {
                status: Some(status.as_u16()),
                message: if message.is_empty() {
                    status.to_string()
                } else {
                    message
                },
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl NotebookBackend for HttpNotebookClient {
    async fn create_execution(&self, request: &CreateExecutionRequest) -> Result<String> {
        let url = self.url("/ninbexec/v2/executions");
        debug!(notebook = %request.notebook_path, "creating notebook execution");

        let response = self
            .client
            .post(&url)
            .json(&[request])
            .send()
            .await
            .map_err(|e| DataSourceError::SubmissionError {
                status: e.status().map_or(0, |s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DataSourceError::SubmissionError {
                status: status.as_u16(),
                message,
            });
        }

        let created: Vec<CreatedExecution> =
            response
                .json()
                .await
                .map_err(|e| DataSourceError::SubmissionError {
                    status: status.as_u16(),
                    message: format!("Failed to parse execution response: {}", e),
                })?;

        created
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| DataSourceError::SubmissionError {
                status: status.as_u16(),
                message: "No execution id was returned".to_string(),
            })
    }

    async fn get_execution(&self, id: &str) -> Result<Execution> {
        let url = self.url(&format!("/ninbexec/v2/executions/{}", id));
        let response = self.client.get(&url).send().await?;
        let mut execution: Execution = Self::read_json(response).await?;
        if execution.id.is_empty() {
            execution.id = id.to_string();
        }
        Ok(execution)
    }

    async fn query_notebooks(&self, filter: &str) -> Result<Option<Vec<Notebook>>> {
        let url = self.url("/ninbexec/v2/query-notebooks");
        let body = QueryNotebooksRequest {
            filter: filter.to_string(),
        };
        let response = self.client.post(&url).json(&body).send().await?;
        let parsed: QueryNotebooksResponse = Self::read_json(response).await?;
        Ok(parsed.notebooks)
    }

    async fn query_result_values(&self, field: &str, starts_with: &str) -> Result<Vec<String>> {
        let url = self.url("/nitestmonitor/v2/query-result-values");
        let body = ResultValuesRequest {
            field: field.to_string(),
            starts_with: starts_with.to_string(),
        };
        let response = self.client.post(&url).json(&body).send().await?;
        Self::read_json(response).await
    }

    async fn get_auth(&self) -> Result<AuthInfo> {
        let url = self.url("/niauth/v1/auth");
        let response = self.client.get(&url).send().await?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    type Recorded = Arc<Mutex<Vec<Value>>>;

    async fn serve_stub(app: Router) -> HttpNotebookClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        HttpNotebookClient::new(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap()
    }

    fn create_request() -> CreateExecutionRequest {
        let mut parameters = Map::new();
        parameters.insert("part".to_string(), json!("A-100"));
        CreateExecutionRequest {
            notebook_path: "_shared/report.ipynb".to_string(),
            parameters,
            result_cache_period: 60,
        }
    }

    #[tokio::test]
    async fn create_execution_posts_a_single_element_array() {
        let recorded = Recorded::default();
        let app = Router::new().route(
            "/ninbexec/v2/executions",
            post({
                let recorded = recorded.clone();
                move |Json(body): Json<Value>| async move {
                    recorded.lock().push(body);
                    Json(json!([{ "id": "exec-1" }]))
                }
            }),
        );
        let client = serve_stub(app).await;

        let id = client.create_execution(&create_request()).await.unwrap();

        assert_eq!(id, "exec-1");
        assert_eq!(
            recorded.lock().clone(),
            vec![json!([{
                "notebookPath": "_shared/report.ipynb",
                "parameters": { "part": "A-100" },
                "resultCachePeriod": 60
            }])]
        );
    }

    #[tokio::test]
    async fn create_execution_without_id_is_a_submission_error() {
        let app = Router::new().route(
            "/ninbexec/v2/executions",
            post(|| async { Json(json!([])) }),
        );
        let client = serve_stub(app).await;

        let err = client.create_execution(&create_request()).await.unwrap_err();

        assert!(matches!(err, DataSourceError::SubmissionError { status: 200, .. }));
    }

    #[tokio::test]
    async fn rejected_creation_keeps_the_status() {
        let app = Router::new().route(
            "/ninbexec/v2/executions",
            post(|| async { (StatusCode::FORBIDDEN, "denied") }),
        );
        let client = serve_stub(app).await;

        let err = client.create_execution(&create_request()).await.unwrap_err();

        match err {
            DataSourceError::SubmissionError { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "denied");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_execution_parses_status_and_maps_failures_to_transport() {
        let app = Router::new().route(
            "/ninbexec/v2/executions/:id",
            get(|Path(id): Path<String>| async move {
                if id == "missing" {
                    return Err((StatusCode::NOT_FOUND, "no such execution"));
                }
                Ok(Json(json!({
                    "notebookPath": "nb",
                    "status": "IN_PROGRESS",
                    "cachedResult": true
                })))
            }),
        );
        let client = serve_stub(app).await;

        let execution = client.get_execution("exec-1").await.unwrap();
        assert_eq!(execution.id, "exec-1");
        assert_eq!(execution.status, crate::models::ExecutionStatus::InProgress);
        assert!(execution.cached_result);

        let err = client.get_execution("missing").await.unwrap_err();
        match err {
            DataSourceError::Transport { status, message } => {
                assert_eq!(status, Some(404));
                assert_eq!(message, "no such execution");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn query_notebooks_sends_filter_and_handles_missing_list() {
        let recorded = Recorded::default();
        let app = Router::new().route(
            "/ninbexec/v2/query-notebooks",
            post({
                let recorded = recorded.clone();
                move |Json(body): Json<Value>| async move {
                    recorded.lock().push(body);
                    Json(json!({ "totalCount": 0 }))
                }
            }),
        );
        let client = serve_stub(app).await;

        let notebooks = client.query_notebooks("path.Contains(\"x\")").await.unwrap();

        assert!(notebooks.is_none());
        assert_eq!(
            recorded.lock().clone(),
            vec![json!({ "filter": "path.Contains(\"x\")" })]
        );
    }

    #[tokio::test]
    async fn result_values_request_uses_camel_case() {
        let recorded = Recorded::default();
        let app = Router::new().route(
            "/nitestmonitor/v2/query-result-values",
            post({
                let recorded = recorded.clone();
                move |Json(body): Json<Value>| async move {
                    recorded.lock().push(body);
                    Json(json!(["PN-1", "PN-2"]))
                }
            }),
        );
        let client = serve_stub(app).await;

        let values = client.query_result_values("PART_NUMBER", "PN").await.unwrap();

        assert_eq!(values, vec!["PN-1", "PN-2"]);
        assert_eq!(
            recorded.lock().clone(),
            vec![json!({ "field": "PART_NUMBER", "startsWith": "PN" })]
        );
    }

    #[tokio::test]
    async fn get_auth_reads_policies_and_reports_unauthorized() {
        let app = Router::new().route(
            "/niauth/v1/auth",
            get(|| async {
                Json(json!({
                    "policies": [{ "statements": [{ "actions": ["*"], "resource": ["*"] }] }]
                }))
            }),
        );
        let client = serve_stub(app).await;

        let auth = client.get_auth().await.unwrap();
        assert!(auth.allows("notebookexecution:Execute"));

        let unauthorized = serve_stub(Router::new().route(
            "/niauth/v1/auth",
            get(|| async { StatusCode::UNAUTHORIZED }),
        ))
        .await;
        let err = unauthorized.get_auth().await.unwrap_err();
        assert!(matches!(err, DataSourceError::Transport { status: Some(401), .. }));
    }

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let client = HttpNotebookClient::new("http://test/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://test");
        assert_eq!(
            client.url("/ninbexec/v2/executions/42"),
            "http://test/ninbexec/v2/executions/42"
        );
    }
}
