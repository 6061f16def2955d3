//! Transactional backend and job queue client ports.

use async_trait::async_trait;
use serde_json::Value;

use super::define_port_error;
use crate::domain::{Job, JobId, JobListParams, JobStateCounts, Queue};

define_port_error! {
    /// Errors surfaced by a job queue store.
    ///
    /// `NotFound` is the sentinel endpoints translate into a 404; the
    /// connectivity and privilege variants are reinterpreted centrally by the
    /// HTTP pipeline.
    pub enum QueueStoreError {
        /// The referenced job or queue does not exist.
        NotFound { entity: String, key: String } => "{entity} not found: {key}",
        /// The job is being worked and cannot be removed.
        JobRunning { id: i64 } => "job {id} is running",
        /// The store could not be reached or dropped the connection.
        Connection { message: String } => "job queue store connection failed: {message}",
        /// The database role lacks a privilege the operation needs.
        InsufficientPrivilege { message: String } => "insufficient database privilege: {message}",
        /// The queue tables or types are missing from the database.
        MissingSchema { message: String } => "job queue schema is missing: {message}",
        /// The statement failed for any other reason.
        Query { message: String } => "job queue store query failed: {message}",
        /// Beginning, committing, or rolling back failed.
        Transaction { message: String } => "transaction failed: {message}",
    }
}

/// A unit of work opened by a [`TxBackend`].
///
/// Implementations must roll back when dropped without an explicit
/// [`Transaction::commit`] or [`Transaction::rollback`], so a cancelled
/// request never leaves a dangling transaction behind.
#[async_trait]
pub trait Transaction: Send {
    /// Make every change in the unit durable.
    async fn commit(self) -> Result<(), QueueStoreError>;

    /// Discard every change in the unit.
    async fn rollback(self) -> Result<(), QueueStoreError>;
}

/// Anything that can open a [`Transaction`].
#[async_trait]
pub trait TxBackend: Send + Sync {
    /// Native transaction handle.
    type Tx: Transaction + 'static;

    /// Open a new transaction.
    async fn begin(&self) -> Result<Self::Tx, QueueStoreError>;
}

/// Job queue client operations, scoped to an open transaction.
#[async_trait]
pub trait QueueExecutor: Send {
    /// Fetch one job.
    async fn job_get(&mut self, id: JobId) -> Result<Job, QueueStoreError>;

    /// List jobs matching `params`, ordered by identifier.
    async fn job_list(&mut self, params: &JobListParams) -> Result<Vec<Job>, QueueStoreError>;

    /// Cancel a job. Finalized jobs are returned unchanged; running jobs are
    /// flagged for the worker to observe.
    async fn job_cancel(&mut self, id: JobId) -> Result<Job, QueueStoreError>;

    /// Delete a job that is not running, returning its last state.
    async fn job_delete(&mut self, id: JobId) -> Result<Job, QueueStoreError>;

    /// Make a finalized or waiting job available to run again.
    async fn job_retry(&mut self, id: JobId) -> Result<Job, QueueStoreError>;

    /// Fetch one queue with its live counts.
    async fn queue_get(&mut self, name: &str) -> Result<Queue, QueueStoreError>;

    /// List queues ordered by name.
    async fn queue_list(&mut self, limit: u32) -> Result<Vec<Queue>, QueueStoreError>;

    /// Stop workers from fetching new jobs from a queue.
    async fn queue_pause(&mut self, name: &str) -> Result<(), QueueStoreError>;

    /// Let workers fetch from a paused queue again.
    async fn queue_resume(&mut self, name: &str) -> Result<(), QueueStoreError>;

    /// Replace a queue's metadata document.
    async fn queue_update_metadata(
        &mut self,
        name: &str,
        metadata: Value,
    ) -> Result<Queue, QueueStoreError>;

    /// Count jobs in every state. Expensive on large tables.
    async fn job_count_by_state(&mut self) -> Result<JobStateCounts, QueueStoreError>;

    /// Round-trip a trivial statement.
    async fn ping(&mut self) -> Result<(), QueueStoreError>;
}

/// A [`TxBackend`] whose transactions expose the job queue client.
pub trait QueueBackend: TxBackend<Tx: QueueExecutor> + 'static {}

impl<B> QueueBackend for B where B: TxBackend<Tx: QueueExecutor> + 'static {}
