//! PostgreSQL implementation of the job queue ports.
//!
//! Statements run against the `river_job` and `river_queue` tables. Every
//! operation happens inside a [`PgTx`] opened by [`PgBackend::begin`]; row
//! locks taken with `FOR UPDATE` hold until the transaction ends.

use async_trait::async_trait;
use diesel::OptionalExtension;
use diesel::sql_query;
use diesel::sql_types::{Array, BigInt, Jsonb, SmallInt, Text};
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::warn;

use crate::domain::ports::{QueueExecutor, QueueStoreError, Transaction, TxBackend};
use crate::domain::{Job, JobId, JobListParams, JobState, JobStateCounts, Queue};

use super::diesel_helpers::{map_diesel_error, map_pool_error};
use super::pool::{DbPool, OwnedConnection};
use super::rows::{JOB_COLUMNS, JobRow, QueueRow, StateCountRow, fold_counts, into_jobs};

type Tm = AnsiTransactionManager;

const QUEUE_SELECT: &str = "SELECT q.name, c.count_available, c.count_running, q.created_at, \
q.metadata, q.paused_at, q.updated_at \
FROM river_queue q \
CROSS JOIN LATERAL ( \
    SELECT count(*) FILTER (WHERE j.state = 'available') AS count_available, \
           count(*) FILTER (WHERE j.state = 'running') AS count_running \
    FROM river_job j WHERE j.queue = q.name \
) c";

const PAUSE_SQL: &str = "UPDATE river_queue \
SET paused_at = COALESCE(paused_at, now()), updated_at = now() WHERE name = $1";

const RESUME_SQL: &str =
    "UPDATE river_queue SET paused_at = NULL, updated_at = now() WHERE name = $1";

const UPDATE_METADATA_SQL: &str =
    "UPDATE river_queue SET metadata = $2, updated_at = now() WHERE name = $1";

const COUNT_BY_STATE_SQL: &str =
    "SELECT state::text AS state, count(*) AS count FROM river_job GROUP BY state";

fn job_select(tail: &str) -> String {
    format!("SELECT {JOB_COLUMNS} FROM river_job {tail}")
}

fn job_update(set: &str) -> String {
    format!("UPDATE river_job SET {set} WHERE id = $1 RETURNING {JOB_COLUMNS}")
}

/// Job queue backend over a pooled PostgreSQL database.
#[derive(Debug, Clone)]
pub struct PgBackend {
    pool: DbPool,
}

impl PgBackend {
    /// Backend drawing transactions from `pool`.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TxBackend for PgBackend {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, QueueStoreError> {
        let mut conn = self.pool.get_owned().await.map_err(map_pool_error)?;
        <Tm as TransactionManager<AsyncPgConnection>>::begin_transaction(&mut *conn)
            .await
            .map_err(|err| map_diesel_error(err, "begin"))?;
        Ok(PgTx { conn: Some(conn) })
    }
}

/// Open transaction on an owned pooled connection.
///
/// Dropping an unfinished transaction schedules a rollback on the current
/// runtime; without a runtime the connection is discarded by the pool
/// instead, which aborts the transaction server-side.
pub struct PgTx {
    conn: Option<OwnedConnection>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut AsyncPgConnection, QueueStoreError> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| QueueStoreError::transaction("transaction already finished"))
    }

    fn finish(&mut self) -> Result<OwnedConnection, QueueStoreError> {
        self.conn
            .take()
            .ok_or_else(|| QueueStoreError::transaction("transaction already finished"))
    }

    async fn locked_job(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let row = sql_query(job_select("WHERE id = $1 FOR UPDATE"))
            .bind::<BigInt, _>(id.get())
            .get_result::<JobRow>(self.conn()?)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "job lock"))?;
        row.map(Job::try_from)
            .transpose()?
            .ok_or_else(|| QueueStoreError::not_found("job", id.to_string()))
    }

    async fn update_job(&mut self, id: JobId, set: &str) -> Result<Job, QueueStoreError> {
        let row = sql_query(job_update(set))
            .bind::<BigInt, _>(id.get())
            .get_result::<JobRow>(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "job update"))?;
        Job::try_from(row)
    }

    async fn touch_queue(&mut self, sql: &str, name: &str) -> Result<(), QueueStoreError> {
        let updated = sql_query(sql)
            .bind::<Text, _>(name)
            .execute(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "queue update"))?;
        if updated == 0 {
            return Err(QueueStoreError::not_found("queue", name));
        }
        Ok(())
    }
}

async fn rollback(conn: &mut AsyncPgConnection) -> Result<(), QueueStoreError> {
    <Tm as TransactionManager<AsyncPgConnection>>::rollback_transaction(conn)
        .await
        .map_err(|err| map_diesel_error(err, "rollback"))
}

#[async_trait]
impl Transaction for PgTx {
    async fn commit(mut self) -> Result<(), QueueStoreError> {
        let mut conn = self.finish()?;
        <Tm as TransactionManager<AsyncPgConnection>>::commit_transaction(&mut *conn)
            .await
            .map_err(|err| map_diesel_error(err, "commit"))
    }

    async fn rollback(mut self) -> Result<(), QueueStoreError> {
        let mut conn = self.finish()?;
        rollback(&mut conn).await
    }
}

impl Drop for PgTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = rollback(&mut conn).await {
                        warn!(error = %err, "rollback of abandoned transaction failed");
                    }
                });
            }
            Err(_) => warn!("transaction dropped outside a runtime; discarding its connection"),
        }
    }
}

#[async_trait]
impl QueueExecutor for PgTx {
    async fn job_get(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let row = sql_query(job_select("WHERE id = $1"))
            .bind::<BigInt, _>(id.get())
            .get_result::<JobRow>(self.conn()?)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "job get"))?;
        row.map(Job::try_from)
            .transpose()?
            .ok_or_else(|| QueueStoreError::not_found("job", id.to_string()))
    }

    async fn job_list(&mut self, params: &JobListParams) -> Result<Vec<Job>, QueueStoreError> {
        let states: Vec<&str> = params.states.iter().map(|state| state.as_str()).collect();
        let ids: Vec<i64> = params.ids.iter().map(|id| id.get()).collect();
        let rows = sql_query(job_select(
            "WHERE (cardinality($1::text[]) = 0 OR state::text = ANY($1)) \
             AND (cardinality($2::bigint[]) = 0 OR id = ANY($2)) \
             AND (cardinality($3::text[]) = 0 OR kind = ANY($3)) \
             AND (cardinality($4::text[]) = 0 OR queue = ANY($4)) \
             AND (cardinality($5::smallint[]) = 0 OR priority = ANY($5)) \
             ORDER BY id LIMIT $6",
        ))
        .bind::<Array<Text>, _>(&states)
        .bind::<Array<BigInt>, _>(&ids)
        .bind::<Array<Text>, _>(&params.kinds)
        .bind::<Array<Text>, _>(&params.queues)
        .bind::<Array<SmallInt>, _>(&params.priorities)
        .bind::<BigInt, _>(i64::from(params.limit))
        .load::<JobRow>(self.conn()?)
        .await
        .map_err(|err| map_diesel_error(err, "job list"))?;
        into_jobs(rows)
    }

    async fn job_cancel(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let job = self.locked_job(id).await?;
        if job.state.is_finalized() {
            return Ok(job);
        }
        if job.state == JobState::Running {
            return self
                .update_job(
                    id,
                    "metadata = jsonb_set(metadata, '{cancel_attempted_at}', to_jsonb(now()))",
                )
                .await;
        }
        self.update_job(
            id,
            "state = 'cancelled', finalized_at = now(), \
             metadata = jsonb_set(metadata, '{cancel_attempted_at}', to_jsonb(now()))",
        )
        .await
    }

    async fn job_delete(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let job = self.locked_job(id).await?;
        if job.state == JobState::Running {
            return Err(QueueStoreError::job_running(id.get()));
        }
        sql_query("DELETE FROM river_job WHERE id = $1")
            .bind::<BigInt, _>(id.get())
            .execute(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "job delete"))?;
        Ok(job)
    }

    async fn job_retry(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let job = self.locked_job(id).await?;
        if matches!(job.state, JobState::Available | JobState::Running) {
            return Ok(job);
        }
        self.update_job(
            id,
            "state = 'available', scheduled_at = now(), finalized_at = NULL, \
             max_attempts = CASE WHEN attempt >= max_attempts THEN attempt + 1 \
             ELSE max_attempts END",
        )
        .await
    }

    async fn queue_get(&mut self, name: &str) -> Result<Queue, QueueStoreError> {
        let row = sql_query(format!("{QUEUE_SELECT} WHERE q.name = $1"))
            .bind::<Text, _>(name)
            .get_result::<QueueRow>(self.conn()?)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "queue get"))?;
        row.map(Queue::from)
            .ok_or_else(|| QueueStoreError::not_found("queue", name))
    }

    async fn queue_list(&mut self, limit: u32) -> Result<Vec<Queue>, QueueStoreError> {
        let rows = sql_query(format!("{QUEUE_SELECT} ORDER BY q.name LIMIT $1"))
            .bind::<BigInt, _>(i64::from(limit))
            .load::<QueueRow>(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "queue list"))?;
        Ok(rows.into_iter().map(Queue::from).collect())
    }

    async fn queue_pause(&mut self, name: &str) -> Result<(), QueueStoreError> {
        self.touch_queue(PAUSE_SQL, name).await
    }

    async fn queue_resume(&mut self, name: &str) -> Result<(), QueueStoreError> {
        self.touch_queue(RESUME_SQL, name).await
    }

    async fn queue_update_metadata(
        &mut self,
        name: &str,
        metadata: Value,
    ) -> Result<Queue, QueueStoreError> {
        let updated = sql_query(UPDATE_METADATA_SQL)
            .bind::<Text, _>(name)
            .bind::<Jsonb, _>(&metadata)
            .execute(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "queue metadata update"))?;
        if updated == 0 {
            return Err(QueueStoreError::not_found("queue", name));
        }
        self.queue_get(name).await
    }

    async fn job_count_by_state(&mut self) -> Result<JobStateCounts, QueueStoreError> {
        let rows = sql_query(COUNT_BY_STATE_SQL)
            .load::<StateCountRow>(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "job count by state"))?;
        Ok(fold_counts(rows))
    }

    async fn ping(&mut self) -> Result<(), QueueStoreError> {
        sql_query("SELECT 1")
            .execute(self.conn()?)
            .await
            .map_err(|err| map_diesel_error(err, "ping"))?;
        Ok(())
    }
}
