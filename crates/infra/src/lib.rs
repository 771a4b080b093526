//! Infrastructure layer: Web Connector facade, run log stores, config.

pub mod config;
pub mod connector;
pub mod run_log;


pub use config::{ConfigError, ConnectorConfig};
pub use connector::{ConnectorError, PROGRESS_FAILED, WebConnector};
pub use run_log::{InMemoryRunLog, PostgresRunLog};
