//! Postgres-backed run log.
//!
//! Rows live in `qbwc_job_runs` and are append-only. The store owns a
//! current-thread tokio runtime so it can sit behind the synchronous
//! [`RunLog`] trait that workers and the Web Connector use.
//!
//! Do not call it from inside another tokio runtime: `block_on` panics there.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::runtime::{Builder, Runtime};
use tracing::instrument;

use qbsync_core::{CompanyFile, Ticket};
use qbsync_jobs::{JobRunEntry, NewJobRun, RunLog, RunLogError};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS qbwc_job_runs (
        id            UUID PRIMARY KEY,
        job_name      TEXT NOT NULL,
        company       TEXT NOT NULL,
        ticket        TEXT NOT NULL,
        requests      JSONB NOT NULL,
        error         TEXT NULL,
        processed_at  TIMESTAMPTZ NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_INDEX: &str = r#"
    CREATE INDEX IF NOT EXISTS qbwc_job_runs_job_processed
        ON qbwc_job_runs (job_name, processed_at DESC)
"#;

#[derive(Debug)]
pub struct PostgresRunLog {
    pool: PgPool,
    runtime: Runtime,
}

impl PostgresRunLog {
    /// Connect to `database_url` and make sure the table exists.
    pub fn connect(database_url: &str) -> anyhow::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build runtime for the run log")?;

        let pool = runtime
            .block_on(PgPoolOptions::new().max_connections(5).connect(database_url))
            .context("failed to connect run log pool")?;

        let store = Self { pool, runtime };
        store.migrate().context("failed to create qbwc_job_runs")?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<(), RunLogError> {
        self.runtime.block_on(async {
            sqlx::query(CREATE_TABLE)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("create table", e))?;
            sqlx::query(CREATE_INDEX)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("create index", e))?;
            Ok::<(), RunLogError>(())
        })
    }

    #[instrument(skip(self), err)]
    async fn fetch_last_successful(&self, job_name: &str) -> Result<Option<JobRunEntry>, RunLogError> {
        let row = sqlx::query(
            r#"
            SELECT id, job_name, company, ticket, requests, error,
                   processed_at, created_at, updated_at
            FROM qbwc_job_runs
            WHERE job_name = $1 AND error IS NULL
            ORDER BY processed_at DESC
            LIMIT 1
            "#,
        )
        .bind(job_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("last_successful_run", e))?;

        row.map(|row| entry_from_row(&row)).transpose()
    }

    #[instrument(skip(self, run), fields(job_name = %run.job_name), err)]
    async fn insert(&self, run: NewJobRun) -> Result<JobRunEntry, RunLogError> {
        let entry = run.into_entry();

        sqlx::query(
            r#"
            INSERT INTO qbwc_job_runs (
                id, job_name, company, ticket, requests, error,
                processed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.job_name)
        .bind(entry.company.as_str())
        .bind(entry.ticket.as_str())
        .bind(&entry.requests)
        .bind(entry.error.as_deref())
        .bind(entry.processed_at)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_run", e))?;

        Ok(entry)
    }
}

impl RunLog for PostgresRunLog {
    fn last_successful_run(&self, job_name: &str) -> Result<Option<JobRunEntry>, RunLogError> {
        self.runtime.block_on(self.fetch_last_successful(job_name))
    }

    fn record_run(&self, run: NewJobRun) -> Result<JobRunEntry, RunLogError> {
        self.runtime.block_on(self.insert(run))
    }
}

fn entry_from_row(row: &PgRow) -> Result<JobRunEntry, RunLogError> {
    let read = |e: sqlx::Error| map_sqlx_error("decode row", e);

    let ticket: String = row.try_get("ticket").map_err(read)?;
    let processed_at: DateTime<Utc> = row.try_get("processed_at").map_err(read)?;

    Ok(JobRunEntry {
        id: row.try_get("id").map_err(read)?,
        job_name: row.try_get("job_name").map_err(read)?,
        company: CompanyFile::new(row.try_get::<String, _>("company").map_err(read)?),
        ticket: Ticket::new(ticket).map_err(|e| RunLogError::Storage(e.to_string()))?,
        requests: row.try_get("requests").map_err(read)?,
        error: row.try_get("error").map_err(read)?,
        processed_at,
        created_at: row.try_get("created_at").map_err(read)?,
        updated_at: row.try_get("updated_at").map_err(read)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RunLogError {
    RunLogError::Storage(format!("{operation}: {err}"))
}
