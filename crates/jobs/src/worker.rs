//! Worker contract: the application code behind a job.

use std::sync::Arc;

use thiserror::Error;

use qbsync_core::{CompanyFile, Ticket};

use crate::request::RequestSet;
use crate::run_log::RunLogError;

/// Application hooks for one job.
///
/// A fresh worker is built from the job's [`WorkerFactory`] every time a
/// session selects the job, so per-exchange state can live on `self`.
///
/// Hook order within a session:
/// 1. `should_run` once, before anything else.
/// 2. `requests` at most once, and only if the job was registered without
///    requests of its own. The returned set is frozen for the session.
/// 3. `response` once per answered request, in issue order.
///
/// Errors are not recovered by the session; they end the exchange.
pub trait Worker: Send {
    fn should_run(&mut self, _ctx: &JobContext<'_>) -> Result<bool, WorkerError> {
        Ok(true)
    }

    fn requests(&mut self, _ctx: &JobContext<'_>) -> Result<Option<RequestSet>, WorkerError> {
        Ok(None)
    }

    /// Raw response document, exactly as the desktop client returned it.
    fn response(&mut self, _ctx: &JobContext<'_>, _response: &str) -> Result<(), WorkerError> {
        Ok(())
    }
}

/// Builds one worker per job per session.
pub type WorkerFactory = Arc<dyn Fn() -> Box<dyn Worker> + Send + Sync>;

/// Wrap a constructor closure as a [`WorkerFactory`].
pub fn factory<W, F>(build: F) -> WorkerFactory
where
    W: Worker + 'static,
    F: Fn() -> W + Send + Sync + 'static,
{
    Arc::new(move || Box::new(build()) as Box<dyn Worker>)
}

/// Factory for workers with a `Default` constructor.
pub fn default_factory<W>() -> WorkerFactory
where
    W: Worker + Default + 'static,
{
    factory(W::default)
}

/// What a worker can see about the exchange it is running in.
#[derive(Debug, Clone, Copy)]
pub struct JobContext<'a> {
    job_name: &'a str,
    ticket: &'a Ticket,
    company: &'a CompanyFile,
    request: Option<(usize, usize)>,
}

impl<'a> JobContext<'a> {
    pub fn new(job_name: &'a str, ticket: &'a Ticket, company: &'a CompanyFile) -> Self {
        Self {
            job_name,
            ticket,
            company,
            request: None,
        }
    }

    pub(crate) fn with_request(mut self, index: usize, total: usize) -> Self {
        self.request = Some((index, total));
        self
    }

    pub fn job_name(&self) -> &'a str {
        self.job_name
    }

    pub fn ticket(&self) -> &'a Ticket {
        self.ticket
    }

    pub fn company(&self) -> &'a CompanyFile {
        self.company
    }

    /// Zero-based index of the request being answered (response hook only).
    pub fn request_index(&self) -> Option<usize> {
        self.request.map(|(index, _)| index)
    }

    /// Number of requests the job issues in this session (response hook only).
    pub fn request_total(&self) -> Option<usize> {
        self.request.map(|(_, total)| total)
    }

    /// True while answering the job's final request.
    pub fn is_last_response(&self) -> bool {
        matches!(self.request, Some((index, total)) if index + 1 == total)
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker failed: {0}")]
    Failed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    RunLog(#[from] RunLogError),
}

impl WorkerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}
