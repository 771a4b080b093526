//! Web Connector configuration.

use std::time::Duration;

use qbsync_jobs::{OnError, QbxmlEnvelope};
use qbsync_jobs::request::DEFAULT_QBXML_VERSION;

pub const ENV_SERVER_VERSION: &str = "QBSYNC_SERVER_VERSION";
pub const ENV_MIN_CLIENT_VERSION: &str = "QBSYNC_MIN_CLIENT_VERSION";
pub const ENV_QBXML_VERSION: &str = "QBSYNC_QBXML_VERSION";
pub const ENV_ON_ERROR: &str = "QBSYNC_ON_ERROR";
pub const ENV_IDLE_TIMEOUT_SECS: &str = "QBSYNC_IDLE_TIMEOUT_SECS";

/// Web Connector facade configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// Reported by `serverVersion`.
    pub server_version: String,
    /// Oldest Web Connector release accepted by `clientVersion`.
    pub min_client_version: Option<String>,
    /// `<?qbxml version?>` of outbound documents.
    pub qbxml_version: String,
    /// `onError` of outbound documents; with `StopOnError` an error status in
    /// a response also ends the exchange.
    pub on_error: OnError,
    /// Sessions untouched for this long are dropped by `evict_idle`.
    pub idle_timeout: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            min_client_version: None,
            qbxml_version: DEFAULT_QBXML_VERSION.to_string(),
            on_error: OnError::StopOnError,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl ConnectorConfig {
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    pub fn with_min_client_version(mut self, version: impl Into<String>) -> Self {
        self.min_client_version = Some(version.into());
        self
    }

    pub fn with_qbxml_version(mut self, version: impl Into<String>) -> Self {
        self.qbxml_version = version.into();
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn envelope(&self) -> QbxmlEnvelope {
        QbxmlEnvelope::new(self.qbxml_version.clone(), self.on_error)
    }

    /// Load from `QBSYNC_*` environment variables, falling back to defaults
    /// for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(version) = get(ENV_SERVER_VERSION) {
            config.server_version = version;
        }

        if let Some(version) = get(ENV_MIN_CLIENT_VERSION) {
            if parse_version(&version).is_none() {
                return Err(ConfigError::invalid(
                    ENV_MIN_CLIENT_VERSION,
                    &version,
                    "expected dotted numeric version",
                ));
            }
            config.min_client_version = Some(version);
        }

        if let Some(version) = get(ENV_QBXML_VERSION) {
            config.qbxml_version = version;
        }

        if let Some(policy) = get(ENV_ON_ERROR) {
            config.on_error = policy
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_ON_ERROR, &policy, e))?;
        }

        if let Some(secs) = get(ENV_IDLE_TIMEOUT_SECS) {
            let parsed: u64 = secs
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_IDLE_TIMEOUT_SECS, &secs, e))?;
            config.idle_timeout = Duration::from_secs(parsed);
        }

        Ok(config)
    }
}

/// Parse `2.1.0.30` into its numeric components.
pub fn parse_version(version: &str) -> Option<Vec<u32>> {
    let version = version.trim();
    if version.is_empty() {
        return None;
    }
    version.split('.').map(|part| part.trim().parse().ok()).collect()
}

/// Compare dotted versions; missing trailing components count as zero.
pub fn version_at_least(version: &[u32], minimum: &[u32]) -> bool {
    let len = version.len().max(minimum.len());
    let padded = |v: &[u32]| (0..len).map(|i| v.get(i).copied().unwrap_or(0)).collect::<Vec<_>>();
    padded(version) >= padded(minimum)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
