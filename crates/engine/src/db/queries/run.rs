//! Workflow run queries.
//!
//! Claim changes are conditional `UPDATE ... WHERE` statements so that two
//! orchestrators racing on one run cannot both win.

use std::time::Duration;

use crate::db::models::{NewRun, RunCompletion, RunFilter, WorkflowRun};
use crate::db::DbPool;
use crate::error::StoreError;

const RUN_COLUMNS: &str = "run_id, workflow_name, status, input, output, error, owner, \
     claim_expires_at, cancel_requested, created_at, updated_at";

/// Insert a PENDING run unless one with the same id exists.
///
/// Returns the stored run and whether this call created it.
pub async fn insert_run_if_absent(
    pool: &DbPool,
    new_run: &NewRun,
) -> Result<(WorkflowRun, bool), StoreError> {
    let inserted = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        INSERT INTO workflow_runs (run_id, workflow_name, status, input, created_at, updated_at)
        VALUES ($1, $2, 'PENDING', $3, now(), now())
        ON CONFLICT (run_id) DO NOTHING
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(&new_run.run_id)
    .bind(&new_run.workflow_name)
    .bind(&new_run.input)
    .fetch_optional(pool)
    .await?;

    if let Some(run) = inserted {
        return Ok((run, true));
    }

    let existing = get_run(pool, &new_run.run_id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("run {}", new_run.run_id)))?;
    Ok((existing, false))
}

/// Get a run by id.
pub async fn get_run(pool: &DbPool, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
    let run = sqlx::query_as::<_, WorkflowRun>(&format!(
        "SELECT {RUN_COLUMNS} FROM workflow_runs WHERE run_id = $1"
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(run)
}

/// Take or renew the exclusive claim on a run and mark it RUNNING.
///
/// Succeeds only when the run is not terminal and is unclaimed, claimed by
/// `owner`, or holds an expired claim.
pub async fn claim_run(
    pool: &DbPool,
    run_id: &str,
    owner: &str,
    ttl: Duration,
) -> Result<Option<WorkflowRun>, StoreError> {
    let run = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        UPDATE workflow_runs
        SET status = 'RUNNING',
            owner = $2,
            claim_expires_at = now() + make_interval(secs => $3),
            updated_at = now()
        WHERE run_id = $1
          AND status IN ('PENDING', 'RUNNING')
          AND (owner IS NULL OR owner = $2 OR claim_expires_at <= now())
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(run_id)
    .bind(owner)
    .bind(ttl.as_secs_f64())
    .fetch_optional(pool)
    .await?;

    Ok(run)
}

/// Drop the claim without changing status.
pub async fn release_run(pool: &DbPool, run_id: &str, owner: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE workflow_runs
        SET owner = NULL, claim_expires_at = NULL, updated_at = now()
        WHERE run_id = $1 AND owner = $2
        "#,
    )
    .bind(run_id)
    .bind(owner)
    .execute(pool)
    .await?;

    Ok(())
}

/// Write the terminal outcome. Returns `None` if `owner` no longer holds the claim.
pub async fn finish_run(
    pool: &DbPool,
    run_id: &str,
    owner: &str,
    completion: &RunCompletion,
) -> Result<Option<WorkflowRun>, StoreError> {
    let run = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        UPDATE workflow_runs
        SET status = $3,
            output = $4,
            error = $5,
            owner = NULL,
            claim_expires_at = NULL,
            updated_at = now()
        WHERE run_id = $1 AND owner = $2 AND status = 'RUNNING'
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(run_id)
    .bind(owner)
    .bind(completion.status().as_str())
    .bind(completion.output())
    .bind(completion.error())
    .fetch_optional(pool)
    .await?;

    Ok(run)
}

/// Flag a run for cancellation.
///
/// An unclaimed PENDING run is cancelled immediately; a claimed run is
/// cancelled by its orchestrator at the next step boundary.
pub async fn request_cancel(pool: &DbPool, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
    let updated = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        UPDATE workflow_runs
        SET cancel_requested = TRUE,
            status = CASE WHEN owner IS NULL AND status = 'PENDING' THEN 'CANCELLED' ELSE status END,
            error = CASE WHEN owner IS NULL AND status = 'PENDING' THEN 'cancelled' ELSE error END,
            updated_at = now()
        WHERE run_id = $1 AND status IN ('PENDING', 'RUNNING')
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(run) => Ok(Some(run)),
        None => get_run(pool, run_id).await,
    }
}

/// Reopen a FAILED or CANCELLED run as PENDING. Committed steps are kept.
pub async fn reset_for_resume(pool: &DbPool, run_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
    let run = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        UPDATE workflow_runs
        SET status = 'PENDING',
            output = NULL,
            error = NULL,
            owner = NULL,
            claim_expires_at = NULL,
            cancel_requested = FALSE,
            updated_at = now()
        WHERE run_id = $1 AND status IN ('FAILED', 'CANCELLED')
        RETURNING {RUN_COLUMNS}
        "#
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?;

    Ok(run)
}

/// List runs, newest first.
pub async fn list_runs(pool: &DbPool, filter: &RunFilter) -> Result<Vec<WorkflowRun>, StoreError> {
    let runs = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        SELECT {RUN_COLUMNS}
        FROM workflow_runs
        WHERE ($1::TEXT IS NULL OR status = $1)
          AND ($2::TEXT IS NULL OR workflow_name = $2)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(filter.status.map(|s| s.as_str()))
    .bind(filter.workflow_name.as_deref())
    .bind(filter.limit())
    .bind(filter.offset())
    .fetch_all(pool)
    .await?;

    Ok(runs)
}

/// Unfinished runs nobody currently holds, oldest first.
pub async fn list_recoverable(pool: &DbPool, limit: i64) -> Result<Vec<WorkflowRun>, StoreError> {
    let runs = sqlx::query_as::<_, WorkflowRun>(&format!(
        r#"
        SELECT {RUN_COLUMNS}
        FROM workflow_runs
        WHERE status IN ('PENDING', 'RUNNING')
          AND (owner IS NULL OR claim_expires_at <= now())
        ORDER BY created_at ASC
        LIMIT $1
        "#
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(runs)
}
