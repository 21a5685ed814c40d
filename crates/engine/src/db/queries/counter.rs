//! Counter queries. These run on a transaction's connection, never on the
//! pool directly, so reads and writes share one atomic scope.

use sqlx::PgConnection;

use crate::db::models::Counter;
use crate::db::DbPool;
use crate::error::StoreError;

/// Read a counter and hold its row lock until the transaction ends.
///
/// A missing row is created at zero first so that concurrent first-time
/// increments queue on the same lock instead of racing on insert.
pub async fn lock_counter(conn: &mut PgConnection, name: &str) -> Result<i64, StoreError> {
    sqlx::query("INSERT INTO counters (name, count) VALUES ($1, 0) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(&mut *conn)
        .await?;

    let row: (i64,) = sqlx::query_as("SELECT count FROM counters WHERE name = $1 FOR UPDATE")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;

    Ok(row.0)
}

/// Write a counter value inside the current transaction.
pub async fn write_counter(conn: &mut PgConnection, name: &str, count: i64) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO counters (name, count) VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET count = EXCLUDED.count
        "#,
    )
    .bind(name)
    .bind(count)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Committed value of a counter.
pub async fn get_counter(pool: &DbPool, name: &str) -> Result<Option<Counter>, StoreError> {
    let counter = sqlx::query_as::<_, Counter>("SELECT name, count FROM counters WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(counter)
}
