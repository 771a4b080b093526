//! Identifiers handed to the engine by the transport layer.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Opaque session ticket issued to a Web Connector client after it
/// authenticates. One ticket identifies one polling exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(String);

/// QuickBooks company file the desktop client has open
/// (e.g. `C:\Company Files\acme.qbw`). An empty string means "whatever file is
/// currently open".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyFile(String);

impl Ticket {
    /// Wrap a ticket issued elsewhere. Blank tickets are rejected.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::invalid_id("Ticket: must not be blank"));
        }
        Ok(Self(value))
    }

    /// Generate a fresh ticket.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing tickets explicitly in tests
    /// for determinism.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Ticket {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl CompanyFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CompanyFile {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CompanyFile {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Display for Ticket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::fmt::Display for CompanyFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
