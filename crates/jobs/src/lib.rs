//! `qbsync-jobs`
//!
//! **Responsibility:** the polling engine behind the QuickBooks Web Connector.
//!
//! - `Job` / `JobRegistry`: what work exists, in which order.
//! - `Worker`: application hooks deciding whether a job runs, what it asks
//!   QuickBooks for, and what it does with the answers.
//! - `Session`: the per-ticket state machine pairing every issued request with
//!   exactly one response.
//! - `RunLog`: storage boundary for job run history (implemented in infra).
//!
//! This crate performs no IO of its own.

pub mod job;
pub mod registry;
pub mod request;
pub mod run_log;
pub mod session;
pub mod worker;

pub use job::{Enabled, Job};
pub use registry::JobRegistry;
pub use request::{OnError, QbxmlEnvelope, Request, RequestSet};
pub use run_log::{JobRunEntry, NewJobRun, RunLog, RunLogError, is_due};
pub use session::{IssuedRequest, JobRun, Session, SessionError, SessionState};
pub use worker::{JobContext, Worker, WorkerError, WorkerFactory, default_factory, factory};
