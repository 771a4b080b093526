//! Web Connector callback surface.

mod session_store;
pub mod status;
pub mod web_connector;

pub use status::{ResponseStatus, first_error, parse_statuses};
pub use web_connector::{ConnectorError, PROGRESS_FAILED, WebConnector};
