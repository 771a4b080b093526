//! Run log implementations.

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryRunLog;
pub use postgres::PostgresRunLog;
