//! PostgreSQL implementation of TaskStore
//!
//! Production persistence using PostgreSQL with:
//! - Lease acquisition with `FOR UPDATE SKIP LOCKED`, safe across processes
//! - Owner-checked negative acknowledgment
//! - Backoff via a `run_after` column
//!
//! Expected table layout:
//!
//! ```sql
//! CREATE TABLE tasks (
//!     id            BIGSERIAL PRIMARY KEY,
//!     type          TEXT        NOT NULL,
//!     status        TEXT        NOT NULL DEFAULT 'PENDING',
//!     payload       JSONB       NOT NULL DEFAULT '{}'::jsonb,
//!     attempt       INTEGER     NOT NULL DEFAULT 0,
//!     max_retries   INTEGER     NOT NULL DEFAULT 3,
//!     locked_until  TIMESTAMPTZ,
//!     locked_by     TEXT,
//!     last_error    TEXT,
//!     run_after     TIMESTAMPTZ,
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//!
//! CREATE INDEX tasks_pickable_idx ON tasks (type, status, run_after);
//! ```

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

use super::store::*;

const TASK_COLUMNS: &str = "t.id, t.type, t.status, t.payload, t.attempt, t.max_retries, \
     t.locked_until, t.locked_by, t.last_error, t.run_after, t.created_at, t.updated_at";

/// PostgreSQL implementation of TaskStore
///
/// # Example
///
/// ```ignore
/// use lease_queue::PostgresTaskStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/mydb").await?;
/// let store = PostgresTaskStore::new(pool);
/// ```
#[derive(Clone)]
pub struct PostgresTaskStore {
    pool: PgPool,
}

impl PostgresTaskStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn task_from_row(row: &PgRow) -> Result<Task, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::Serialization(e.to_string());
    let status: String = row.try_get("status").map_err(get_err)?;

    Ok(Task {
        id: row.try_get("id").map_err(get_err)?,
        task_type: row.try_get("type").map_err(get_err)?,
        status: status.parse()?,
        payload: row.try_get("payload").map_err(get_err)?,
        attempt: row.try_get("attempt").map_err(get_err)?,
        max_retries: row.try_get("max_retries").map_err(get_err)?,
        locked_until: row.try_get("locked_until").map_err(get_err)?,
        locked_by: row.try_get("locked_by").map_err(get_err)?,
        last_error: row.try_get("last_error").map_err(get_err)?,
        run_after: row.try_get("run_after").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

#[async_trait]
impl TaskStore for PostgresTaskStore {
    #[instrument(skip(self, params), fields(owner = %params.lease_owner, max_count = params.max_count))]
    async fn pick_tasks(&self, params: PickTasksParams) -> Result<Vec<Task>, StoreError> {
        if params.max_count == 0 || params.supported_types.is_empty() {
            return Ok(vec![]);
        }

        // One statement: select eligible rows, skip rows locked by concurrent
        // pickers, and stamp the lease on the survivors.
        let sql = format!(
            r#"
            WITH pickable AS (
                SELECT id
                FROM tasks
                WHERE type = ANY($1)
                  AND (
                        status = 'PENDING'
                     OR (status = 'ERROR_RETRYABLE'
                         AND attempt < max_retries
                         AND (run_after IS NULL OR run_after <= NOW()))
                     OR (status = 'LOCKED' AND locked_until < NOW())
                  )
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE tasks t
            SET status = 'LOCKED',
                locked_until = NOW() + make_interval(secs => $3),
                locked_by = $4,
                updated_at = NOW()
            FROM pickable p
            WHERE t.id = p.id
            RETURNING {TASK_COLUMNS}
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&params.supported_types)
            .bind(params.max_count as i64)
            .bind(params.lease_duration.as_secs_f64())
            .bind(&params.lease_owner)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to pick tasks: {}", e);
                StoreError::Database(e.to_string())
            })?;

        let mut tasks = rows.iter().map(task_from_row).collect::<Result<Vec<_>, _>>()?;
        // RETURNING order is unspecified
        tasks.sort_by_key(|t| t.id);

        if !tasks.is_empty() {
            debug!(count = tasks.len(), "picked tasks");
        }

        Ok(tasks)
    }

    #[instrument(skip(self))]
    async fn ack_tasks(&self, ids: &[TaskId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = 'DONE',
                locked_until = NULL,
                locked_by = NULL,
                updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to ack tasks: {}", e);
            StoreError::Database(e.to_string())
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, params), fields(task_id = params.task_id, status = %params.status))]
    async fn nack_task(&self, params: NackTaskParams) -> Result<u64, StoreError> {
        let retryable = params.status == TaskStatus::ErrorRetryable;
        let retry_in_secs = params.retry_in.map(|d| d.as_secs_f64());

        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2,
                last_error = $3,
                attempt = CASE WHEN $4 THEN attempt + 1 ELSE attempt END,
                run_after = CASE
                    WHEN $4 THEN NOW() + make_interval(secs => COALESCE($5::double precision, 0))
                    ELSE NULL
                END,
                locked_until = NULL,
                locked_by = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND locked_by = $6
            "#,
        )
        .bind(params.task_id)
        .bind(params.status.as_str())
        .bind(&params.error_message)
        .bind(retryable)
        .bind(retry_in_secs)
        .bind(&params.lease_owner)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to nack task: {}", e);
            StoreError::Database(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            debug!("nack matched no rows, lease no longer held");
        }

        Ok(result.rows_affected())
    }
}
