//! QuickBooks Web Connector facade.
//!
//! Exposes the QBWC callback operations over plain strings. A SOAP layer maps
//! each operation onto the matching method; ticket issuance (`authenticate`)
//! happens outside and ends in [`WebConnector::open_session`].
//!
//! ## Progress
//!
//! The desktop client stops polling once `receiveResponseXML` reports 100, so
//! after forwarding a response the connector immediately asks the session for
//! the following request and buffers it. That keeps the session's lock-step
//! contract while letting the reported progress reach 100 exactly when nothing
//! is left.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use qbsync_core::{CompanyFile, DomainError, Ticket};
use qbsync_jobs::{JobRegistry, JobRun, NewJobRun, OnError, RunLog, Session, SessionError};

use super::session_store::{SessionSlot, SessionStore};
use super::status;
use crate::config::{ConnectorConfig, parse_version, version_at_least};

/// `receiveResponseXML` result signalling the exchange ended with an error.
pub const PROGRESS_FAILED: i32 = -1;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("unknown ticket: {0}")]
    UnknownTicket(Ticket),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub struct WebConnector<L: RunLog> {
    registry: Arc<JobRegistry>,
    run_log: L,
    config: ConnectorConfig,
    sessions: SessionStore,
}

impl<L: RunLog> WebConnector<L> {
    pub fn new(registry: Arc<JobRegistry>, run_log: L, config: ConnectorConfig) -> Self {
        Self {
            registry,
            run_log,
            config,
            sessions: SessionStore::new(),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn run_log(&self) -> &L {
        &self.run_log
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// `serverVersion`.
    pub fn server_version(&self) -> String {
        self.config.server_version.clone()
    }

    /// `clientVersion`: empty when the client is acceptable, `E:<reason>`
    /// when it is older than the configured minimum, `W:<reason>` when its
    /// version string cannot be read.
    pub fn client_version(&self, version: &str) -> String {
        let Some(minimum) = self.config.min_client_version.as_deref() else {
            return String::new();
        };
        let (Some(client), Some(required)) = (parse_version(version), parse_version(minimum)) else {
            return format!("W:Unrecognized Web Connector version {version:?}");
        };

        if version_at_least(&client, &required) {
            String::new()
        } else {
            format!("E:Web Connector {version} is older than the minimum supported version {minimum}. Please upgrade.")
        }
    }

    /// Start the exchange for an authenticated ticket. A session already
    /// registered under the same ticket is replaced.
    pub fn open_session(&self, ticket: Ticket, company: CompanyFile) {
        info!(ticket = %ticket, company = %company, "opening session");
        let session = Session::new(&self.registry, ticket.clone(), company).with_envelope(self.config.envelope());
        if self.sessions.insert(session) {
            warn!(ticket = %ticket, "replaced an existing session for ticket");
        }
    }

    /// `sendRequestXML`: the next QBXML document, or an empty string when the
    /// session has nothing more to send.
    pub fn send_request_xml(&self, ticket: &Ticket) -> Result<String, ConnectorError> {
        let (outcome, runs) = self.with_slot(ticket, |slot| {
            let outcome = match slot.buffered.take() {
                Some(request) => Ok(Some(request)),
                None => slot.session.next(),
            };
            (outcome, finished_runs(slot))
        })?;
        self.record_runs(runs);

        match outcome {
            Ok(Some(request)) => Ok(request.body),
            Ok(None) => Ok(String::new()),
            Err(SessionError::Worker { job, source }) => {
                warn!(ticket = %ticket, job = %job, error = %source, "worker failed while preparing a request");
                Ok(String::new())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `receiveResponseXML`: percent complete, or [`PROGRESS_FAILED`].
    ///
    /// A non-empty `hresult`, an error status under `stopOnError`, or a
    /// worker error ends the exchange and is written to the run log. Error
    /// statuses still reach the worker before the exchange stops.
    pub fn receive_response_xml(
        &self,
        ticket: &Ticket,
        response: &str,
        hresult: &str,
        message: &str,
    ) -> Result<i32, ConnectorError> {
        let stop_on_error = self.config.on_error == OnError::StopOnError;
        let (progress, runs) = self.with_slot(ticket, |slot| {
            let progress = receive(slot, response, hresult, message, stop_on_error);
            (progress, finished_runs(slot))
        })?;
        self.record_runs(runs);
        progress
    }

    /// `connectionError`: the client could not reach QuickBooks. Always
    /// answers `done` (no alternate company file to try).
    pub fn connection_error(&self, ticket: &Ticket, hresult: &str, message: &str) -> Result<String, ConnectorError> {
        let runs = self.with_slot(ticket, |slot| {
            slot.session.abort(format!("connection error {hresult}: {message}"));
            finished_runs(slot)
        })?;
        self.record_runs(runs);
        Ok("done".to_string())
    }

    /// `getLastError`.
    pub fn get_last_error(&self, ticket: &Ticket) -> Result<String, ConnectorError> {
        self.with_slot(ticket, |slot| slot.session.last_error().unwrap_or_default().to_string())
    }

    /// `closeConnection`: forget the session.
    pub fn close_connection(&self, ticket: &Ticket) -> Result<String, ConnectorError> {
        let slot = self
            .sessions
            .remove(ticket)
            .ok_or_else(|| ConnectorError::UnknownTicket(ticket.clone()))?;
        info!(
            ticket = %ticket,
            state = ?slot.session.state(),
            progress = slot.session.progress(),
            "session closed"
        );
        Ok("OK".to_string())
    }

    /// Drop sessions idle longer than the configured timeout. Returns how
    /// many were dropped.
    pub fn evict_idle(&self) -> usize {
        let evicted = self.sessions.evict_idle(self.config.idle_timeout, Instant::now());
        for ticket in &evicted {
            info!(ticket = %ticket, "evicted idle session");
        }
        evicted.len()
    }

    fn with_slot<R>(&self, ticket: &Ticket, f: impl FnOnce(&mut SessionSlot) -> R) -> Result<R, ConnectorError> {
        self.sessions
            .with_slot(ticket, f)
            .ok_or_else(|| ConnectorError::UnknownTicket(ticket.clone()))
    }

    /// Storage failures are logged, not surfaced: the client cannot act on
    /// them and the exchange itself succeeded.
    fn record_runs(&self, runs: Vec<(Ticket, CompanyFile, JobRun)>) {
        for (ticket, company, run) in runs {
            let job_name = run.job_name.clone();
            let new_run = match NewJobRun::new(run.job_name, company, ticket, &run.requests) {
                Ok(new_run) => match run.error {
                    Some(err) => new_run.with_error(err),
                    None => new_run,
                },
                Err(err) => {
                    error!(job = %job_name, error = %err, "failed to serialize job run");
                    continue;
                }
            };

            match self.run_log.record_run(new_run) {
                Ok(entry) if entry.is_success() => info!(job = %job_name, "job run recorded"),
                Ok(entry) => warn!(job = %job_name, error = ?entry.error, "failed job run recorded"),
                Err(err) => error!(job = %job_name, error = %err, "failed to record job run"),
            }
        }
    }
}

fn receive(
    slot: &mut SessionSlot,
    response: &str,
    hresult: &str,
    message: &str,
    stop_on_error: bool,
) -> Result<i32, ConnectorError> {
    if slot.buffered.is_some() {
        return Err(SessionError::from(DomainError::sequence(
            "response received before the next request was sent",
        ))
        .into());
    }

    let session = &mut slot.session;
    if session.is_finished() {
        return Ok(PROGRESS_FAILED);
    }

    if !hresult.trim().is_empty() {
        session.abort(format!("connection error {hresult}: {message}"));
        return Ok(PROGRESS_FAILED);
    }

    match session.received_response(response) {
        Ok(()) => {}
        Err(SessionError::Worker { .. }) => return Ok(PROGRESS_FAILED),
        Err(err) => return Err(err.into()),
    }

    if stop_on_error {
        if let Some(status) = status::first_error(response) {
            session.abort(status.to_string());
            return Ok(PROGRESS_FAILED);
        }
    }

    match session.next() {
        Ok(next) => slot.buffered = next,
        Err(SessionError::Worker { .. }) => return Ok(PROGRESS_FAILED),
        Err(err) => return Err(err.into()),
    }

    Ok(slot.session.progress())
}

fn finished_runs(slot: &mut SessionSlot) -> Vec<(Ticket, CompanyFile, JobRun)> {
    let ticket = slot.session.ticket().clone();
    let company = slot.session.company().clone();
    slot.session
        .take_finished()
        .into_iter()
        .map(|run| (ticket.clone(), company.clone(), run))
        .collect()
}
