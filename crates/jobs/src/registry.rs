//! Ordered job registry.

use std::sync::Arc;

use tracing::debug;

use qbsync_core::{CompanyFile, DomainError, DomainResult};

use crate::job::{Enabled, Job};
use crate::request::RequestSet;
use crate::worker::WorkerFactory;

/// Registration-ordered set of jobs, unique by name.
///
/// Populate it with `&mut` access during startup, then share it read-only
/// (typically `Arc<JobRegistry>`). Sessions take their own snapshot, so a
/// registry rebuilt later never changes an exchange already in progress.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Vec<Arc<Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `job`, replacing any job with the same name in place.
    ///
    /// Returns the replaced job, if any.
    pub fn add(&mut self, job: Job) -> Option<Arc<Job>> {
        let job = Arc::new(job);
        match self.position(job.name()) {
            Some(index) => {
                debug!(job = job.name(), "replacing registered job");
                Some(std::mem::replace(&mut self.jobs[index], job))
            }
            None => {
                debug!(job = job.name(), "registering job");
                self.jobs.push(job);
                None
            }
        }
    }

    /// Convenience form of [`add`](Self::add) taking every job attribute.
    pub fn add_job(
        &mut self,
        name: impl Into<String>,
        enabled: impl Into<Enabled>,
        company: Option<CompanyFile>,
        worker: WorkerFactory,
        requests: Option<RequestSet>,
    ) -> DomainResult<Option<Arc<Job>>> {
        let mut job = Job::new(name, worker)?.enabled(enabled);
        if let Some(company) = company {
            job = job.for_company(company);
        }
        if let Some(requests) = requests {
            job = job.with_requests(requests);
        }
        Ok(self.add(job))
    }

    /// Jobs in registration order.
    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    pub fn find(&self, name: &str) -> DomainResult<&Arc<Job>> {
        self.jobs
            .iter()
            .find(|job| job.name() == name)
            .ok_or_else(|| DomainError::not_found(format!("job `{name}`")))
    }

    pub fn remove(&mut self, name: &str) -> DomainResult<Arc<Job>> {
        let index = self
            .position(name)
            .ok_or_else(|| DomainError::not_found(format!("job `{name}`")))?;
        Ok(self.jobs.remove(index))
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.jobs.iter().position(|job| job.name() == name)
    }
}
