//! Domain error model.

use thiserror::Error;

/// Result type used across the sync engine.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Covers deterministic failures of the engine itself (bad registrations,
/// unknown jobs, protocol misuse). Worker and storage failures have their own
/// types closer to where they happen.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. an empty job name).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A named resource (job, ticket) was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller broke the request/response lock-step of a session.
    #[error("sequence violation: {0}")]
    SequenceViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn sequence(msg: impl Into<String>) -> Self {
        Self::SequenceViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
