use axum::{
    extract::{FromRequest, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    client::NotebookBackend,
    datasource::{HealthStatus, NotebookDataSource, QueryResponse},
    metrics,
    models::{Notebook, NotebookParameterQuery, QueryTarget},
    substitute::{TemplateVariables, TimeRange, VariableValue},
    DataSourceError, Result,
};

type SharedDataSource<B> = Arc<NotebookDataSource<B>>;

/// JSON body extractor whose rejections use the crate's `{ "error": .. }` body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(DataSourceError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRequest {
    pub targets: Vec<QueryTarget>,
    pub range: Option<TimeRange>,
    pub scoped_vars: HashMap<String, ScopedVar>,
}

#[derive(Debug, Deserialize)]
pub struct ScopedVar {
    #[serde(default)]
    pub text: Option<String>,
    pub value: VariableValue,
}

impl QueryRequest {
    fn variables(&self) -> TemplateVariables {
        let vars = self
            .scoped_vars
            .iter()
            .fold(TemplateVariables::new(), |vars, (name, var)| {
                vars.with_variable(name.clone(), var.value.clone())
            });
        match self.range {
            Some(range) => vars.with_range(range),
            None => vars,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotebooksRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteRequest {
    pub field: String,
    #[serde(default)]
    pub starts_with: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct VariableOption {
    pub text: String,
}

pub fn router<B: NotebookBackend + 'static>(datasource: SharedDataSource<B>) -> Router {
    Router::new()
        .route("/query", post(query::<B>))
        .route("/notebooks", post(notebooks::<B>))
        .route("/variables", post(variables::<B>))
        .route("/autocomplete", post(autocomplete::<B>))
        .route("/health", get(health::<B>))
        .route("/metrics", get(metrics_text))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(datasource)
}

async fn query<B: NotebookBackend + 'static>(
    State(datasource): State<SharedDataSource<B>>,
    ApiJson(request): ApiJson<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    info!("Running query with {} targets", request.targets.len());
    let variables = request.variables();
    let response = datasource.query(&request.targets, &variables).await?;
    Ok(Json(response))
}

async fn notebooks<B: NotebookBackend + 'static>(
    State(datasource): State<SharedDataSource<B>>,
    ApiJson(request): ApiJson<NotebooksRequest>,
) -> Result<Json<Vec<Notebook>>> {
    let notebooks = datasource.query_notebooks(&request.path).await?;
    Ok(Json(notebooks))
}

async fn variables<B: NotebookBackend + 'static>(
    State(datasource): State<SharedDataSource<B>>,
    ApiJson(request): ApiJson<NotebookParameterQuery>,
) -> Result<Json<Vec<VariableOption>>> {
    let values = datasource.parameter_values(&request).await?;
    Ok(Json(
        values
            .into_iter()
            .map(|text| VariableOption { text })
            .collect(),
    ))
}

async fn autocomplete<B: NotebookBackend + 'static>(
    State(datasource): State<SharedDataSource<B>>,
    ApiJson(request): ApiJson<AutocompleteRequest>,
) -> Result<Json<Vec<String>>> {
    let values = datasource
        .autocomplete(&request.field, &request.starts_with)
        .await?;
    Ok(Json(values))
}

async fn health<B: NotebookBackend + 'static>(
    State(datasource): State<SharedDataSource<B>>,
) -> Json<HealthStatus> {
    Json(datasource.test_datasource().await)
}

async fn metrics_text() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
