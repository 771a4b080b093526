//! In-memory run log for tests/dev.

use std::sync::{Arc, RwLock};

use qbsync_jobs::{JobRunEntry, NewJobRun, RunLog, RunLogError};

#[derive(Debug, Default)]
pub struct InMemoryRunLog {
    entries: RwLock<Vec<JobRunEntry>>,
}

impl InMemoryRunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Every recorded run of `job_name`, oldest first.
    pub fn runs_for(&self, job_name: &str) -> Result<Vec<JobRunEntry>, RunLogError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .iter()
            .filter(|entry| entry.job_name == job_name)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RunLog for InMemoryRunLog {
    fn last_successful_run(&self, job_name: &str) -> Result<Option<JobRunEntry>, RunLogError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .iter()
            .filter(|entry| entry.job_name == job_name && entry.is_success())
            .max_by_key(|entry| entry.processed_at)
            .cloned())
    }

    fn record_run(&self, run: NewJobRun) -> Result<JobRunEntry, RunLogError> {
        let entry = run.into_entry();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.push(entry.clone());
        Ok(entry)
    }
}

fn poisoned() -> RunLogError {
    RunLogError::Storage("run log lock poisoned".to_string())
}
