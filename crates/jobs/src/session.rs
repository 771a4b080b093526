//! Polling session: the per-ticket state machine that decides which request
//! goes to the desktop client next.
//!
//! ## Lifecycle
//!
//! ```text
//! AwaitingJobSelection ──select──▶ AwaitingRequests ──next()──▶ RequestIssued
//!        ▲   │                         │    ▲                       │
//!        │   └─(nothing left)─▶ Drained │    └──received_response()─┘
//!        └────────(job exhausted)───────┘
//! ```
//!
//! Any worker error moves the session to `Aborted`.
//!
//! A session walks a snapshot of the registry taken when it was opened. For
//! each job it evaluates the enabled flag, builds a worker, asks `should_run`,
//! then fixes the job's request list (initial requests or one `requests()`
//! call) before handing requests out one at a time.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use qbsync_core::{CompanyFile, DomainError, Ticket};

use crate::job::Job;
use crate::registry::JobRegistry;
use crate::request::{QbxmlEnvelope, Request, RequestSet};
use crate::worker::{JobContext, Worker, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No job selected; the next poll advances the job cursor.
    AwaitingJobSelection,
    /// A job is selected and no request is outstanding.
    AwaitingRequests,
    /// A request was handed out; exactly one response must come back.
    RequestIssued,
    /// Every job has been visited. Terminal.
    Drained,
    /// A worker or the transport ended the exchange early. Terminal.
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Drained | SessionState::Aborted)
    }
}

/// A request handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedRequest {
    pub job_name: String,
    /// Zero-based position within the job's requests.
    pub index: usize,
    pub total: usize,
    pub payload: Request,
    /// Full QBXML document for the desktop client.
    pub body: String,
}

/// A job the session is done with, waiting to be written to the run log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub job_name: String,
    pub requests: Vec<Request>,
    /// `None` if every request was answered and handled.
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("job `{job}` failed: {source}")]
    Worker {
        job: String,
        #[source]
        source: WorkerError,
    },
}

struct ActiveJob {
    job: Arc<Job>,
    worker: Box<dyn Worker>,
    /// `None` until the request list has been fixed for this session.
    pending: Option<Vec<Request>>,
    cursor: usize,
}

impl ActiveJob {
    fn pending(&self) -> &[Request] {
        self.pending.as_deref().unwrap_or(&[])
    }

    fn is_exhausted(&self) -> bool {
        self.pending.is_some() && self.cursor >= self.pending().len()
    }
}

/// One polling exchange for a ticket + company pair.
pub struct Session {
    ticket: Ticket,
    company: CompanyFile,
    jobs: Vec<Arc<Job>>,
    job_cursor: usize,
    current: Option<ActiveJob>,
    state: SessionState,
    envelope: QbxmlEnvelope,
    finished: Vec<JobRun>,
    last_error: Option<String>,
}

impl Session {
    /// Open a session over the jobs in `registry` that run for `company`.
    pub fn new(registry: &JobRegistry, ticket: Ticket, company: CompanyFile) -> Self {
        let jobs: Vec<Arc<Job>> = registry
            .jobs()
            .iter()
            .filter(|job| job.runs_for(&company))
            .cloned()
            .collect();

        debug!(ticket = %ticket, company = %company, jobs = jobs.len(), "session opened");

        Self {
            ticket,
            company,
            jobs,
            job_cursor: 0,
            current: None,
            state: SessionState::AwaitingJobSelection,
            envelope: QbxmlEnvelope::default(),
            finished: Vec::new(),
            last_error: None,
        }
    }

    pub fn with_envelope(mut self, envelope: QbxmlEnvelope) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn company(&self) -> &CompanyFile {
        &self.company
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_job(&self) -> Option<&str> {
        self.current.as_ref().map(|active| active.job.name())
    }

    /// Percentage of this session's jobs already visited. 100 exactly when
    /// the session is drained.
    pub fn progress(&self) -> i32 {
        if self.state == SessionState::Drained {
            return 100;
        }
        if self.jobs.is_empty() {
            return 0;
        }
        let visited = self.job_cursor - usize::from(self.current.is_some());
        ((visited * 100 / self.jobs.len()) as i32).min(99)
    }

    /// Produce the next request, or `None` once every job is done (or the
    /// session was aborted).
    ///
    /// Fails with a sequence violation while a previously issued request is
    /// still unanswered.
    pub fn next(&mut self) -> Result<Option<IssuedRequest>, SessionError> {
        match self.state {
            SessionState::RequestIssued => {
                return Err(DomainError::sequence(
                    "next() called while a request is still awaiting its response",
                )
                .into());
            }
            SessionState::Drained | SessionState::Aborted => return Ok(None),
            SessionState::AwaitingJobSelection | SessionState::AwaitingRequests => {}
        }

        loop {
            if self.current.is_none() && !self.select_next_job()? {
                self.state = SessionState::Drained;
                info!(ticket = %self.ticket, "all jobs drained");
                return Ok(None);
            }

            self.state = SessionState::AwaitingRequests;
            self.fix_requests()?;

            if self.current.as_ref().is_some_and(ActiveJob::is_exhausted) {
                self.finish_current();
                continue;
            }

            let Some(active) = self.current.as_ref() else {
                continue;
            };
            let Some(payload) = active.pending().get(active.cursor).cloned() else {
                continue;
            };

            let job_name = active.job.name().to_string();
            let request_id = format!("{}:{}", job_name, active.cursor + 1);
            let issued = IssuedRequest {
                body: payload.render(&self.envelope, Some(&request_id)),
                index: active.cursor,
                total: active.pending().len(),
                job_name,
                payload,
            };

            debug!(
                ticket = %self.ticket,
                job = %issued.job_name,
                index = issued.index,
                total = issued.total,
                "request issued"
            );
            self.state = SessionState::RequestIssued;
            return Ok(Some(issued));
        }
    }

    /// Hand the response for the outstanding request to its worker.
    ///
    /// The payload is forwarded untouched; parsing it is the worker's job.
    pub fn received_response(&mut self, payload: &str) -> Result<(), SessionError> {
        if self.state != SessionState::RequestIssued {
            return Err(DomainError::sequence(
                "received_response() called without an outstanding request",
            )
            .into());
        }
        let Some(active) = self.current.as_mut() else {
            return Err(DomainError::sequence("no job is waiting for a response").into());
        };

        let total = active.pending().len();
        let ctx = JobContext::new(active.job.name(), &self.ticket, &self.company)
            .with_request(active.cursor, total);
        let result = active.worker.response(&ctx, payload);
        active.cursor += 1;

        match result {
            Ok(()) => {
                self.state = SessionState::AwaitingRequests;
                Ok(())
            }
            Err(source) => {
                let job = active.job.name().to_string();
                Err(self.fail(job, source))
            }
        }
    }

    /// End the exchange on behalf of the transport (connection error, QBXML
    /// error status). The current job, if any, is reported as failed.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if let Some(active) = self.current.take() {
            self.finished.push(JobRun {
                job_name: active.job.name().to_string(),
                requests: active.pending.unwrap_or_default(),
                error: Some(reason.clone()),
            });
        }
        warn!(ticket = %self.ticket, reason = %reason, "session aborted");
        self.last_error = Some(reason);
        self.state = SessionState::Aborted;
    }

    /// Jobs finished (or failed) since the last call.
    pub fn take_finished(&mut self) -> Vec<JobRun> {
        std::mem::take(&mut self.finished)
    }

    /// Advance the cursor to the next job that is enabled and whose worker
    /// agrees to run. Returns `false` when the snapshot is exhausted.
    fn select_next_job(&mut self) -> Result<bool, SessionError> {
        self.state = SessionState::AwaitingJobSelection;

        while let Some(job) = self.jobs.get(self.job_cursor).cloned() {
            self.job_cursor += 1;

            if !job.is_enabled() {
                debug!(ticket = %self.ticket, job = job.name(), "job disabled, skipping");
                continue;
            }

            let mut worker = job.build_worker();
            let ctx = JobContext::new(job.name(), &self.ticket, &self.company);
            match worker.should_run(&ctx) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(ticket = %self.ticket, job = job.name(), "worker declined to run, skipping");
                    continue;
                }
                Err(source) => {
                    self.current = Some(ActiveJob {
                        job: job.clone(),
                        worker,
                        pending: None,
                        cursor: 0,
                    });
                    return Err(self.fail(job.name().to_string(), source));
                }
            }

            debug!(ticket = %self.ticket, job = job.name(), "job selected");
            self.current = Some(ActiveJob {
                job,
                worker,
                pending: None,
                cursor: 0,
            });
            return Ok(true);
        }

        Ok(false)
    }

    /// Fix the current job's request list if that has not happened yet in
    /// this session. The worker is asked at most once.
    fn fix_requests(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.current.as_mut() else {
            return Ok(());
        };
        if active.pending.is_some() {
            return Ok(());
        }

        let computed = match active.job.initial_requests() {
            Some(requests) => Ok(requests.clone().into_vec()),
            None => {
                let ctx = JobContext::new(active.job.name(), &self.ticket, &self.company);
                active
                    .worker
                    .requests(&ctx)
                    .map(|set| set.map(RequestSet::into_vec).unwrap_or_default())
            }
        };

        match computed {
            Ok(requests) => {
                debug!(
                    ticket = %self.ticket,
                    job = active.job.name(),
                    count = requests.len(),
                    "requests fixed for session"
                );
                active.pending = Some(requests);
                Ok(())
            }
            Err(source) => {
                let job = active.job.name().to_string();
                Err(self.fail(job, source))
            }
        }
    }

    fn finish_current(&mut self) {
        let Some(active) = self.current.take() else {
            return;
        };
        let requests = active.pending.unwrap_or_default();
        if requests.is_empty() {
            debug!(ticket = %self.ticket, job = active.job.name(), "job had no requests");
            return;
        }

        info!(
            ticket = %self.ticket,
            job = active.job.name(),
            requests = requests.len(),
            "job finished"
        );
        self.finished.push(JobRun {
            job_name: active.job.name().to_string(),
            requests,
            error: None,
        });
    }

    fn fail(&mut self, job: String, source: WorkerError) -> SessionError {
        self.abort(format!("job `{job}` failed: {source}"));
        SessionError::Worker { job, source }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ticket", &self.ticket)
            .field("company", &self.company)
            .field("jobs", &self.jobs.len())
            .field("job_cursor", &self.job_cursor)
            .field("current_job", &self.current_job())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;
    use crate::job::Enabled;
    use crate::worker::{WorkerFactory, factory};

    /// Shared record of every hook call made by [`ScriptedWorker`]s.
    #[derive(Debug, Default)]
    struct Calls {
        requests: AtomicUsize,
        responses: Mutex<Vec<(String, String)>>,
    }

    #[derive(Clone)]
    struct ScriptedWorker {
        calls: Arc<Calls>,
        should_run: bool,
        requests: Option<Value>,
        fail_response: bool,
    }

    impl ScriptedWorker {
        fn new(calls: &Arc<Calls>, requests: Option<Value>) -> Self {
            Self {
                calls: calls.clone(),
                should_run: true,
                requests,
                fail_response: false,
            }
        }

        fn into_factory(self) -> WorkerFactory {
            factory(move || self.clone())
        }
    }

    impl Worker for ScriptedWorker {
        fn should_run(&mut self, _ctx: &JobContext<'_>) -> Result<bool, WorkerError> {
            Ok(self.should_run)
        }

        fn requests(&mut self, _ctx: &JobContext<'_>) -> Result<Option<RequestSet>, WorkerError> {
            self.calls.requests.fetch_add(1, Ordering::SeqCst);
            Ok(self.requests.clone().map(RequestSet::from))
        }

        fn response(&mut self, ctx: &JobContext<'_>, response: &str) -> Result<(), WorkerError> {
            if self.fail_response {
                return Err(WorkerError::invalid_response("unparseable"));
            }
            self.calls
                .responses
                .lock()
                .unwrap()
                .push((ctx.job_name().to_string(), response.to_string()));
            Ok(())
        }
    }

    fn session(registry: &JobRegistry) -> Session {
        Session::new(registry, Ticket::generate(), CompanyFile::new("acme.qbw"))
    }

    /// Poll until drained, answering each request with `resp-<job>-<index>`.
    fn drain(session: &mut Session) -> Vec<IssuedRequest> {
        let mut issued = Vec::new();
        while let Some(request) = session.next().unwrap() {
            session
                .received_response(&format!("resp-{}-{}", request.job_name, request.index))
                .unwrap();
            issued.push(request);
        }
        issued
    }

    fn add(registry: &mut JobRegistry, name: &str, worker: WorkerFactory) {
        registry.add(Job::new(name, worker).unwrap());
    }

    #[test]
    fn polls_jobs_in_registration_order() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        add(
            &mut registry,
            "a",
            ScriptedWorker::new(&calls, Some(json!({ "foo": "bar" }))).into_factory(),
        );
        add(
            &mut registry,
            "b",
            ScriptedWorker::new(&calls, Some(json!([{ "bar": "foo" }, { "foo": "bar" }]))).into_factory(),
        );

        let mut session = session(&registry);

        let first = session.next().unwrap().unwrap();
        assert_eq!((first.job_name.as_str(), first.index, first.total), ("a", 0, 1));
        assert_eq!(first.payload, Request::from(json!({ "foo": "bar" })));
        assert!(first.body.contains("<Foo>bar</Foo>"));
        session.received_response("r1").unwrap();

        let second = session.next().unwrap().unwrap();
        assert_eq!((second.job_name.as_str(), second.index, second.total), ("b", 0, 2));
        assert_eq!(second.payload, Request::from(json!({ "bar": "foo" })));
        session.received_response("r2").unwrap();

        let third = session.next().unwrap().unwrap();
        assert_eq!((third.job_name.as_str(), third.index), ("b", 1));
        assert_eq!(third.payload, Request::from(json!({ "foo": "bar" })));
        session.received_response("r3").unwrap();

        assert!(session.next().unwrap().is_none());
        assert_eq!(session.state(), SessionState::Drained);
        assert_eq!(session.progress(), 100);

        let responses = calls.responses.lock().unwrap().clone();
        assert_eq!(
            responses,
            vec![
                ("a".to_string(), "r1".to_string()),
                ("b".to_string(), "r2".to_string()),
                ("b".to_string(), "r3".to_string()),
            ]
        );

        let finished = session.take_finished();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[1].requests.len(), 2);
        assert!(finished.iter().all(|run| run.error.is_none()));
    }

    #[test]
    fn jobs_without_requests_are_skipped_silently() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        add(&mut registry, "nothing", ScriptedWorker::new(&calls, None).into_factory());
        add(&mut registry, "empty", ScriptedWorker::new(&calls, Some(json!([]))).into_factory());
        registry.add(
            Job::new("seeded_empty", ScriptedWorker::new(&calls, None).into_factory())
                .unwrap()
                .with_requests(Vec::<Request>::new()),
        );
        add(
            &mut registry,
            "real",
            ScriptedWorker::new(&calls, Some(json!({ "foo": "bar" }))).into_factory(),
        );

        let mut session = session(&registry);
        let issued = drain(&mut session);

        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].job_name, "real");
        // Only jobs that actually issued something are reported.
        let finished = session.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].job_name, "real");
    }

    #[test]
    fn empty_registry_drains_immediately() {
        let mut session = session(&JobRegistry::new());
        assert_eq!(session.progress(), 0);
        assert!(session.next().unwrap().is_none());
        assert!(session.next().unwrap().is_none());
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn requests_are_snapshotted_on_first_access() {
        static COUNTER: AtomicUsize = AtomicUsize::new(2);

        struct CounterWorker {
            calls: Arc<Calls>,
        }

        impl Worker for CounterWorker {
            fn requests(&mut self, _ctx: &JobContext<'_>) -> Result<Option<RequestSet>, WorkerError> {
                self.calls.requests.fetch_add(1, Ordering::SeqCst);
                let count = COUNTER.load(Ordering::SeqCst);
                Ok(Some(RequestSet::Many(
                    (0..count).map(|i| Request::from(json!({ "n": i }))).collect(),
                )))
            }

            fn response(&mut self, _ctx: &JobContext<'_>, _response: &str) -> Result<(), WorkerError> {
                Ok(())
            }
        }

        let calls = Arc::new(Calls::default());
        let factory_calls = calls.clone();
        let mut registry = JobRegistry::new();
        add(
            &mut registry,
            "counter",
            factory(move || CounterWorker {
                calls: factory_calls.clone(),
            }),
        );

        let mut session = session(&registry);
        let first = session.next().unwrap().unwrap();
        assert_eq!(first.total, 2);

        COUNTER.store(5, Ordering::SeqCst);
        session.received_response("r").unwrap();

        let second = session.next().unwrap().unwrap();
        assert_eq!(second.total, 2);
        session.received_response("r").unwrap();

        assert!(session.next().unwrap().is_none());
        assert_eq!(calls.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn initial_requests_suppress_the_requests_hook() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        registry.add(
            Job::new("alice", ScriptedWorker::new(&calls, None).into_factory())
                .unwrap()
                .with_requests(json!({ "name": "Alice" })),
        );
        assert!(registry.find("alice").unwrap().requests_provided_when_added());

        let mut session = session(&registry);
        let issued = drain(&mut session);

        assert_eq!(issued.len(), 1);
        assert!(issued[0].body.contains("Alice"));
        assert_eq!(calls.requests.load(Ordering::SeqCst), 0);
        assert!(registry.find("alice").unwrap().requests_provided_when_added());

        let finished = session.take_finished();
        assert_eq!(
            serde_json::to_value(&finished[0].requests).unwrap(),
            json!([{ "name": "Alice" }])
        );
    }

    #[test]
    fn declined_jobs_never_compute_requests() {
        let calls = Arc::new(Calls::default());
        let mut declined = ScriptedWorker::new(&calls, Some(json!({ "foo": "bar" })));
        declined.should_run = false;

        let mut registry = JobRegistry::new();
        add(&mut registry, "declined", declined.into_factory());

        let mut session = session(&registry);
        assert!(session.next().unwrap().is_none());
        assert_eq!(calls.requests.load(Ordering::SeqCst), 0);
        assert!(session.take_finished().is_empty());
    }

    #[test]
    fn disabled_jobs_drop_out_without_reordering_others() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        for name in ["one", "two", "three"] {
            let job = Job::new(
                name,
                ScriptedWorker::new(&calls, Some(json!({ "job": name }))).into_factory(),
            )
            .unwrap()
            .enabled(Enabled::when(move || name != "two"));
            registry.add(job);
        }

        let mut session = session(&registry);
        let order: Vec<String> = drain(&mut session).into_iter().map(|r| r.job_name).collect();
        assert_eq!(order, vec!["one", "three"]);
    }

    #[test]
    fn jobs_bound_to_other_companies_are_ignored() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        registry.add(
            Job::new("elsewhere", ScriptedWorker::new(&calls, Some(json!({ "a": 1 }))).into_factory())
                .unwrap()
                .for_company("other.qbw"),
        );
        registry.add(
            Job::new("here", ScriptedWorker::new(&calls, Some(json!({ "b": 2 }))).into_factory())
                .unwrap()
                .for_company("ACME.qbw"),
        );

        let mut session = session(&registry);
        let issued = drain(&mut session);
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].job_name, "here");
    }

    #[test]
    fn lock_step_violations_fail_fast() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        add(
            &mut registry,
            "a",
            ScriptedWorker::new(&calls, Some(json!({ "foo": "bar" }))).into_factory(),
        );

        let mut session = session(&registry);
        assert!(matches!(
            session.received_response("early"),
            Err(SessionError::Domain(DomainError::SequenceViolation(_)))
        ));

        session.next().unwrap().unwrap();
        assert!(matches!(
            session.next(),
            Err(SessionError::Domain(DomainError::SequenceViolation(_)))
        ));
        assert_eq!(session.state(), SessionState::RequestIssued);

        session.received_response("ok").unwrap();
        assert!(matches!(
            session.received_response("twice"),
            Err(SessionError::Domain(DomainError::SequenceViolation(_)))
        ));
    }

    #[test]
    fn worker_errors_abort_the_session() {
        let calls = Arc::new(Calls::default());
        let mut failing = ScriptedWorker::new(&calls, Some(json!([{ "a": 1 }, { "a": 2 }])));
        failing.fail_response = true;

        let mut registry = JobRegistry::new();
        add(&mut registry, "failing", failing.into_factory());
        add(
            &mut registry,
            "later",
            ScriptedWorker::new(&calls, Some(json!({ "b": 1 }))).into_factory(),
        );

        let mut session = session(&registry);
        session.next().unwrap().unwrap();
        let err = session.received_response("<garbage").unwrap_err();
        assert!(matches!(err, SessionError::Worker { ref job, .. } if job == "failing"));

        assert_eq!(session.state(), SessionState::Aborted);
        assert!(session.last_error().unwrap().contains("failing"));
        assert!(session.next().unwrap().is_none());

        let finished = session.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].requests.len(), 2);
        assert!(finished[0].error.is_some());
    }

    #[test]
    fn should_run_errors_propagate() {
        struct Broken;

        impl Worker for Broken {
            fn should_run(&mut self, _ctx: &JobContext<'_>) -> Result<bool, WorkerError> {
                Err(WorkerError::failed("database unavailable"))
            }

            fn response(&mut self, _ctx: &JobContext<'_>, _response: &str) -> Result<(), WorkerError> {
                Ok(())
            }
        }

        let mut registry = JobRegistry::new();
        add(&mut registry, "broken", factory(|| Broken));

        let mut session = session(&registry);
        assert!(matches!(session.next(), Err(SessionError::Worker { .. })));
        assert!(session.is_finished());
        assert_eq!(session.take_finished()[0].error.as_deref().map(|e| e.contains("database unavailable")), Some(true));
    }

    #[test]
    fn progress_tracks_visited_jobs() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        for name in ["a", "b", "c", "d"] {
            add(
                &mut registry,
                name,
                ScriptedWorker::new(&calls, Some(json!({ "x": 1 }))).into_factory(),
            );
        }

        let mut session = session(&registry);
        let mut seen = Vec::new();
        while let Some(_request) = session.next().unwrap() {
            seen.push(session.progress());
            session.received_response("r").unwrap();
        }

        assert_eq!(seen, vec![0, 25, 50, 75]);
        assert_eq!(session.progress(), 100);
    }

    #[test]
    fn registry_changes_do_not_leak_into_open_sessions() {
        let calls = Arc::new(Calls::default());
        let mut registry = JobRegistry::new();
        add(
            &mut registry,
            "a",
            ScriptedWorker::new(&calls, Some(json!({ "x": 1 }))).into_factory(),
        );

        let mut session = session(&registry);
        registry.clear();

        assert_eq!(drain(&mut session).len(), 1);
    }

    proptest! {
        /// For any mix of per-job request counts, the session yields every
        /// request exactly once, grouped by job in registration order and in
        /// original order within each job.
        #[test]
        fn yields_every_request_in_order(counts in prop::collection::vec(0usize..5, 0..6)) {
            let calls = Arc::new(Calls::default());
            let mut registry = JobRegistry::new();
            for (job, count) in counts.iter().enumerate() {
                let requests: Vec<Value> = (0..*count).map(|i| json!({ "job": job, "i": i })).collect();
                add(
                    &mut registry,
                    &format!("job{job}"),
                    ScriptedWorker::new(&calls, Some(Value::Array(requests))).into_factory(),
                );
            }

            let mut session = session(&registry);
            let issued = drain(&mut session);

            let expected: Vec<(String, usize)> = counts
                .iter()
                .enumerate()
                .flat_map(|(job, count)| (0..*count).map(move |i| (format!("job{job}"), i)))
                .collect();
            let actual: Vec<(String, usize)> = issued.iter().map(|r| (r.job_name.clone(), r.index)).collect();

            prop_assert_eq!(actual, expected);
            prop_assert_eq!(calls.requests.load(Ordering::SeqCst), counts.len());
            prop_assert_eq!(calls.responses.lock().unwrap().len(), counts.iter().sum::<usize>());
        }
    }
}
