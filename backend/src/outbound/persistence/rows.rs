//! Row shapes for the raw job queue statements.
//!
//! Columns are cast in SQL (`state::text`, `tags::text[]`) so every row maps
//! onto plain Diesel SQL types without custom enum support.

use chrono::{DateTime, Utc};
use diesel::QueryableByName;
use diesel::sql_types::{Array, BigInt, Jsonb, Nullable, SmallInt, Text, Timestamptz};
use serde_json::Value;

use crate::domain::ports::QueueStoreError;
use crate::domain::{Job, JobId, JobState, JobStateCounts, Queue};

/// Select list matching [`JobRow`].
pub(crate) const JOB_COLUMNS: &str = "id, args, attempt, attempted_at, \
COALESCE(attempted_by, '{}') AS attempted_by, created_at, \
COALESCE(errors, '{}') AS errors, finalized_at, kind, max_attempts, metadata, \
priority, queue, state::text AS state, scheduled_at, tags::text[] AS tags";

#[derive(Debug, QueryableByName)]
pub(crate) struct JobRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = Jsonb)]
    args: Value,
    #[diesel(sql_type = SmallInt)]
    attempt: i16,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    attempted_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Array<Text>)]
    attempted_by: Vec<String>,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Array<Jsonb>)]
    errors: Vec<Value>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    finalized_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Text)]
    kind: String,
    #[diesel(sql_type = SmallInt)]
    max_attempts: i16,
    #[diesel(sql_type = Jsonb)]
    metadata: Value,
    #[diesel(sql_type = SmallInt)]
    priority: i16,
    #[diesel(sql_type = Text)]
    queue: String,
    #[diesel(sql_type = Text)]
    state: String,
    #[diesel(sql_type = Timestamptz)]
    scheduled_at: DateTime<Utc>,
    #[diesel(sql_type = Array<Text>)]
    tags: Vec<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = QueueStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state: JobState = row
            .state
            .parse()
            .map_err(|err| QueueStoreError::query(format!("job {}: {err}", row.id)))?;
        Ok(Self {
            id: JobId::new(row.id),
            args: row.args,
            attempt: row.attempt,
            attempted_at: row.attempted_at,
            attempted_by: row.attempted_by,
            created_at: row.created_at,
            errors: row.errors,
            finalized_at: row.finalized_at,
            kind: row.kind,
            max_attempts: row.max_attempts,
            metadata: row.metadata,
            priority: row.priority,
            queue: row.queue,
            state,
            scheduled_at: row.scheduled_at,
            tags: row.tags,
        })
    }
}

/// Convert a batch of rows, failing on the first malformed one.
pub(crate) fn into_jobs(rows: Vec<JobRow>) -> Result<Vec<Job>, QueueStoreError> {
    rows.into_iter().map(Job::try_from).collect()
}

#[derive(Debug, QueryableByName)]
pub(crate) struct QueueRow {
    #[diesel(sql_type = Text)]
    name: String,
    #[diesel(sql_type = BigInt)]
    count_available: i64,
    #[diesel(sql_type = BigInt)]
    count_running: i64,
    #[diesel(sql_type = Timestamptz)]
    created_at: DateTime<Utc>,
    #[diesel(sql_type = Jsonb)]
    metadata: Value,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    paused_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Timestamptz)]
    updated_at: DateTime<Utc>,
}

impl From<QueueRow> for Queue {
    fn from(row: QueueRow) -> Self {
        Self {
            name: row.name,
            count_available: row.count_available,
            count_running: row.count_running,
            created_at: row.created_at,
            metadata: row.metadata,
            paused_at: row.paused_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, QueryableByName)]
pub(crate) struct StateCountRow {
    #[diesel(sql_type = Text)]
    state: String,
    #[diesel(sql_type = BigInt)]
    count: i64,
}

/// Fold grouped counts into per-state totals. Unknown states are skipped.
pub(crate) fn fold_counts(rows: Vec<StateCountRow>) -> JobStateCounts {
    let mut counts = JobStateCounts::default();
    for row in rows {
        if let Ok(state) = row.state.parse::<JobState>() {
            counts.add(state, row.count);
        } else {
            tracing::warn!(state = %row.state, "ignoring count for unknown job state");
        }
    }
    counts
}
