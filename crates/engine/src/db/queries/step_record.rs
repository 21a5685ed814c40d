//! Step record queries.
//!
//! A COMMITTED row is never modified: every write below is guarded by
//! `status <> 'COMMITTED'`.

use sqlx::PgConnection;

use crate::db::models::StepRecord;
use crate::db::DbPool;
use crate::error::StoreError;

const STEP_COLUMNS: &str =
    "run_id, step_index, step_name, status, output, error, attempts, updated_at";

/// Record that an attempt of a step began.
///
/// Creates the row, or bumps `attempts` on a STARTED/FAILED row. A
/// COMMITTED row is returned as is.
pub async fn record_start(
    pool: &DbPool,
    run_id: &str,
    step_index: i32,
    step_name: &str,
) -> Result<StepRecord, StoreError> {
    let record = sqlx::query_as::<_, StepRecord>(&format!(
        r#"
        INSERT INTO step_records (run_id, step_index, step_name, status, attempts, updated_at)
        VALUES ($1, $2, $3, 'STARTED', 1, now())
        ON CONFLICT (run_id, step_index) DO UPDATE
        SET status = 'STARTED',
            step_name = EXCLUDED.step_name,
            error = NULL,
            attempts = step_records.attempts + 1,
            updated_at = now()
        WHERE step_records.status <> 'COMMITTED'
        RETURNING {STEP_COLUMNS}
        "#
    ))
    .bind(run_id)
    .bind(step_index)
    .bind(step_name)
    .fetch_optional(pool)
    .await?;

    match record {
        Some(record) => Ok(record),
        None => lookup(pool, run_id, step_index)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("step {run_id}/{step_index}"))),
    }
}

/// Record the committed output of a step on the step's own transaction.
///
/// The row lock taken by the UPDATE makes a concurrent second commit of the
/// same step wait, then match nothing once the first has committed.
pub async fn record_commit(
    conn: &mut PgConnection,
    run_id: &str,
    step_index: i32,
    output: &serde_json::Value,
) -> Result<(), StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE step_records
        SET status = 'COMMITTED', output = $3, error = NULL, updated_at = now()
        WHERE run_id = $1 AND step_index = $2 AND status <> 'COMMITTED'
        "#,
    )
    .bind(run_id)
    .bind(step_index)
    .bind(output)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 1 {
        return Ok(());
    }

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT status FROM step_records WHERE run_id = $1 AND step_index = $2",
    )
    .bind(run_id)
    .bind(step_index)
    .fetch_optional(&mut *conn)
    .await?;

    match existing {
        Some(_) => Err(StoreError::Constraint(format!(
            "step {run_id}/{step_index} is already committed"
        ))),
        None => Err(StoreError::NotFound(format!(
            "step {run_id}/{step_index} was never started"
        ))),
    }
}

/// Record a fatal step failure.
pub async fn record_failure(
    pool: &DbPool,
    run_id: &str,
    step_index: i32,
    error: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE step_records
        SET status = 'FAILED', error = $3, updated_at = now()
        WHERE run_id = $1 AND step_index = $2 AND status <> 'COMMITTED'
        "#,
    )
    .bind(run_id)
    .bind(step_index)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the record for one step.
pub async fn lookup(
    pool: &DbPool,
    run_id: &str,
    step_index: i32,
) -> Result<Option<StepRecord>, StoreError> {
    let record = sqlx::query_as::<_, StepRecord>(&format!(
        "SELECT {STEP_COLUMNS} FROM step_records WHERE run_id = $1 AND step_index = $2"
    ))
    .bind(run_id)
    .bind(step_index)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// All step records of a run in step order.
pub async fn list_steps(pool: &DbPool, run_id: &str) -> Result<Vec<StepRecord>, StoreError> {
    let records = sqlx::query_as::<_, StepRecord>(&format!(
        "SELECT {STEP_COLUMNS} FROM step_records WHERE run_id = $1 ORDER BY step_index ASC"
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(records)
}
