pub mod api;
pub mod client;
pub mod config;
pub mod datasource;
pub mod error;
pub mod frame;
pub mod logging;
pub mod metrics;
pub mod mock;
pub mod models;
pub mod normalize;
pub mod poller;
pub mod schema;
pub mod substitute;

pub use error::{DataSourceError, Result};
