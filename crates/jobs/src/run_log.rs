//! Job run history boundary.
//!
//! The session never touches this directly. The transport records finished
//! and failed jobs here, and workers read it to decide whether they are due.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use qbsync_core::{CompanyFile, Ticket};

use crate::request::Request;

/// A persisted job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRunEntry {
    pub id: Uuid,
    pub job_name: String,
    pub company: CompanyFile,
    pub ticket: Ticket,
    /// Requests the job issued, as JSON (see [`Request`] serialization).
    pub requests: JsonValue,
    /// `None` on success.
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRunEntry {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A run about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobRun {
    pub job_name: String,
    pub company: CompanyFile,
    pub ticket: Ticket,
    pub requests: JsonValue,
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl NewJobRun {
    pub fn new(
        job_name: impl Into<String>,
        company: CompanyFile,
        ticket: Ticket,
        requests: &[Request],
    ) -> Result<Self, RunLogError> {
        let requests = serde_json::to_value(requests)
            .map_err(|e| RunLogError::Serialization(e.to_string()))?;

        Ok(Self {
            job_name: job_name.into(),
            company,
            ticket,
            requests,
            error: None,
            processed_at: Utc::now(),
        })
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn processed_at(mut self, at: DateTime<Utc>) -> Self {
        self.processed_at = at;
        self
    }

    /// Assign identity and bookkeeping timestamps.
    pub fn into_entry(self) -> JobRunEntry {
        let now = Utc::now();
        JobRunEntry {
            id: Uuid::now_v7(),
            job_name: self.job_name,
            company: self.company,
            ticket: self.ticket,
            requests: self.requests,
            error: self.error,
            processed_at: self.processed_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Run-log store abstraction.
pub trait RunLog: Send + Sync {
    /// Most recent run (by `processed_at`) that finished without an error.
    fn last_successful_run(&self, job_name: &str) -> Result<Option<JobRunEntry>, RunLogError>;

    /// Append a run. Entries are never updated afterwards.
    fn record_run(&self, run: NewJobRun) -> Result<JobRunEntry, RunLogError>;
}

impl<T: RunLog + ?Sized> RunLog for Arc<T> {
    fn last_successful_run(&self, job_name: &str) -> Result<Option<JobRunEntry>, RunLogError> {
        (**self).last_successful_run(job_name)
    }

    fn record_run(&self, run: NewJobRun) -> Result<JobRunEntry, RunLogError> {
        (**self).record_run(run)
    }
}

/// True if `job_name` has never succeeded, or last succeeded at least
/// `interval` before `now`. Meant for `Worker::should_run`.
pub fn is_due(
    run_log: &dyn RunLog,
    job_name: &str,
    interval: Duration,
    now: DateTime<Utc>,
) -> Result<bool, RunLogError> {
    Ok(match run_log.last_successful_run(job_name)? {
        Some(last) => now - last.processed_at >= interval,
        None => true,
    })
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RunLogError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
