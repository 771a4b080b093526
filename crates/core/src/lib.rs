//! `qbsync-core`: shared building blocks for the QuickBooks sync engine.
//!
//! This crate holds identifiers and the domain error model only (no IO).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{CompanyFile, Ticket};
