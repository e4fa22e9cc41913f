use notebook_datasource::{api, config::Config, logging, metrics};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = logging::init_logger(logging::json_requested()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    metrics::init_metrics();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = api::serve(config).await {
        error!("Data source stopped: {}", e);
        std::process::exit(1);
    }
}
