//! Job descriptor.

use std::fmt;
use std::sync::Arc;

use qbsync_core::{CompanyFile, DomainError, DomainResult};

use crate::request::RequestSet;
use crate::worker::{Worker, WorkerFactory};

/// Whether a job takes part in an exchange.
///
/// A predicate is stored as-is and evaluated once per session, when the
/// session's job cursor reaches the job.
#[derive(Clone)]
pub enum Enabled {
    Flag(bool),
    When(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl Enabled {
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::When(Arc::new(predicate))
    }

    pub fn evaluate(&self) -> bool {
        match self {
            Enabled::Flag(flag) => *flag,
            Enabled::When(predicate) => predicate(),
        }
    }
}

impl Default for Enabled {
    fn default() -> Self {
        Self::Flag(true)
    }
}

impl From<bool> for Enabled {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl fmt::Debug for Enabled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enabled::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Enabled::When(_) => f.write_str("When(<predicate>)"),
        }
    }
}

/// A unit of synchronization work.
///
/// Built once at startup, then shared read-only through the
/// [`JobRegistry`](crate::registry::JobRegistry).
#[derive(Clone)]
pub struct Job {
    name: String,
    enabled: Enabled,
    company: Option<CompanyFile>,
    worker: WorkerFactory,
    initial_requests: Option<RequestSet>,
    requests_provided_when_added: bool,
}

impl Job {
    /// Create an enabled job for every company, with no requests of its own.
    pub fn new(name: impl Into<String>, worker: WorkerFactory) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("job name must not be empty"));
        }

        Ok(Self {
            name,
            enabled: Enabled::default(),
            company: None,
            worker,
            initial_requests: None,
            requests_provided_when_added: false,
        })
    }

    pub fn enabled(mut self, enabled: impl Into<Enabled>) -> Self {
        self.enabled = enabled.into();
        self
    }

    /// Only run this job when the desktop client has `company` open.
    pub fn for_company(mut self, company: impl Into<CompanyFile>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Supply the job's requests up front. The worker's `requests` hook is
    /// then never called.
    pub fn with_requests(mut self, requests: impl Into<RequestSet>) -> Self {
        self.initial_requests = Some(requests.into());
        self.requests_provided_when_added = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.evaluate()
    }

    pub fn company(&self) -> Option<&CompanyFile> {
        self.company.as_ref()
    }

    /// Company files are Windows paths, so the match ignores ASCII case.
    pub fn runs_for(&self, company: &CompanyFile) -> bool {
        match &self.company {
            None => true,
            Some(bound) => bound.as_str().eq_ignore_ascii_case(company.as_str()),
        }
    }

    pub fn initial_requests(&self) -> Option<&RequestSet> {
        self.initial_requests.as_ref()
    }

    pub fn requests_provided_when_added(&self) -> bool {
        self.requests_provided_when_added
    }

    pub fn build_worker(&self) -> Box<dyn Worker> {
        (self.worker)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("company", &self.company)
            .field("initial_requests", &self.initial_requests)
            .field("requests_provided_when_added", &self.requests_provided_when_added)
            .finish_non_exhaustive()
    }
}
