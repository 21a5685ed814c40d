//! Table definitions, applied idempotently at startup.

use crate::db::DbPool;
use crate::error::StoreError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS workflow_runs (
    run_id           TEXT PRIMARY KEY,
    workflow_name    TEXT NOT NULL,
    status           TEXT NOT NULL,
    input            JSONB NOT NULL DEFAULT 'null'::jsonb,
    output           JSONB,
    error            TEXT,
    owner            TEXT,
    claim_expires_at TIMESTAMPTZ,
    cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS workflow_runs_status_idx ON workflow_runs (status);

CREATE TABLE IF NOT EXISTS step_records (
    run_id      TEXT NOT NULL REFERENCES workflow_runs (run_id) ON DELETE CASCADE,
    step_index  INTEGER NOT NULL,
    step_name   TEXT NOT NULL,
    status      TEXT NOT NULL,
    output      JSONB,
    error       TEXT,
    attempts    INTEGER NOT NULL DEFAULT 1,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (run_id, step_index)
);

CREATE TABLE IF NOT EXISTS counters (
    name  TEXT PRIMARY KEY,
    count BIGINT NOT NULL CHECK (count >= 0)
);
"#;

/// Create the engine tables if they do not exist.
pub async fn ensure_schema(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    tracing::info!("Database schema verified");
    Ok(())
}
