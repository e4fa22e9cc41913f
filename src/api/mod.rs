pub mod routes;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    client::HttpNotebookClient, config::Config, datasource::NotebookDataSource, DataSourceError,
    Result,
};

pub use routes::router;

/// Bind the configured port and serve the data source until shutdown.
pub async fn serve(config: Config) -> Result<()> {
    let client = HttpNotebookClient::new(&config.api_url, config.request_timeout)?;
    let datasource = NotebookDataSource::new(client, config.poll)
        .with_default_cache_timeout(config.default_cache_timeout)
        .with_excluded_namespace(config.excluded_namespace.clone());

    let app = router(Arc::new(datasource));
    let addr = config.listen_addr();
    info!("Starting notebook data source on {} for {}", addr, config.api_url);

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        DataSourceError::Config(format!("Failed to bind to address {}: {}", addr, e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| DataSourceError::Transport {
            status: None,
            message: format!("Server error: {}", e),
        })
}
