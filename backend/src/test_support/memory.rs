//! In-memory job queue backend.
//!
//! Each transaction works on a private copy of the store; commit publishes
//! the copy, rollback (explicit or on drop) discards it. Faults and delays
//! can be injected to exercise error classification and timeouts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::ports::{QueueExecutor, QueueStoreError, Transaction, TxBackend};
use crate::domain::{Job, JobId, JobListParams, JobState, JobStateCounts, Queue};

#[derive(Debug, Clone, Default)]
struct MemoryStore {
    jobs: BTreeMap<JobId, Job>,
    queues: BTreeMap<String, Queue>,
    next_id: i64,
}

impl MemoryStore {
    fn with_counts(&self, queue: &Queue) -> Queue {
        let count = |state: JobState| {
            let matching = self
                .jobs
                .values()
                .filter(|job| job.queue == queue.name && job.state == state)
                .count();
            i64::try_from(matching).unwrap_or(i64::MAX)
        };
        Queue {
            count_available: count(JobState::Available),
            count_running: count(JobState::Running),
            ..queue.clone()
        }
    }

    fn queue(&self, name: &str) -> Result<Queue, QueueStoreError> {
        self.queues
            .get(name)
            .map(|queue| self.with_counts(queue))
            .ok_or_else(|| QueueStoreError::not_found("queue", name))
    }

    fn queue_mut(&mut self, name: &str) -> Result<&mut Queue, QueueStoreError> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| QueueStoreError::not_found("queue", name))
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut Job, QueueStoreError> {
        self.jobs
            .get_mut(&id)
            .ok_or_else(|| QueueStoreError::not_found("job", id.to_string()))
    }
}

#[derive(Debug, Default)]
struct Faults {
    begin: Option<QueueStoreError>,
    queries: Option<QueueStoreError>,
    commit: Option<QueueStoreError>,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    store: Mutex<MemoryStore>,
    faults: Mutex<Faults>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    count_queries: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared handle to an in-memory job queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl MemoryBackend {
    /// Empty store with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a job and return it.
    pub fn insert_job(&self, kind: &str, queue: &str, state: JobState) -> Job {
        let mut store = lock(&self.inner.store);
        store.next_id += 1;
        let now = Utc::now();
        let job = Job {
            id: JobId::new(store.next_id),
            args: Value::Object(Map::new()),
            attempt: i16::from(state == JobState::Running),
            attempted_at: (state == JobState::Running).then_some(now),
            attempted_by: Vec::new(),
            created_at: now,
            errors: Vec::new(),
            finalized_at: state.is_finalized().then_some(now),
            kind: kind.to_owned(),
            max_attempts: 25,
            metadata: Value::Object(Map::new()),
            priority: 1,
            queue: queue.to_owned(),
            state,
            scheduled_at: now,
            tags: Vec::new(),
        };
        store.jobs.insert(job.id, job.clone());
        job
    }

    /// Replace a stored job wholesale.
    pub fn put_job(&self, job: Job) {
        lock(&self.inner.store).jobs.insert(job.id, job);
    }

    /// Seed an unpaused queue with empty metadata.
    pub fn insert_queue(&self, name: &str) -> Queue {
        let now = Utc::now();
        let queue = Queue {
            name: name.to_owned(),
            count_available: 0,
            count_running: 0,
            created_at: now,
            metadata: Value::Object(Map::new()),
            paused_at: None,
            updated_at: now,
        };
        lock(&self.inner.store)
            .queues
            .insert(name.to_owned(), queue.clone());
        queue
    }

    /// Committed state of a job.
    pub fn job(&self, id: JobId) -> Option<Job> {
        lock(&self.inner.store).jobs.get(&id).cloned()
    }

    /// Committed state of a queue, with live counts.
    pub fn queue(&self, name: &str) -> Option<Queue> {
        lock(&self.inner.store).queue(name).ok()
    }

    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    /// How many times the per-state count ran.
    pub fn count_queries(&self) -> usize {
        self.inner.count_queries.load(Ordering::SeqCst)
    }

    /// Make every subsequent `begin` fail with `err`.
    pub fn fail_begin_with(&self, err: QueueStoreError) {
        lock(&self.inner.faults).begin = Some(err);
    }

    /// Make every subsequent query fail with `err`.
    pub fn fail_queries_with(&self, err: QueueStoreError) {
        lock(&self.inner.faults).queries = Some(err);
    }

    /// Make every subsequent commit fail with `err`.
    pub fn fail_commit_with(&self, err: QueueStoreError) {
        lock(&self.inner.faults).commit = Some(err);
    }

    /// Sleep for `delay` before every query.
    pub fn delay_queries(&self, delay: Duration) {
        lock(&self.inner.faults).delay = Some(delay);
    }

    pub fn clear_faults(&self) {
        *lock(&self.inner.faults) = Faults::default();
    }
}

#[async_trait]
impl TxBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, QueueStoreError> {
        if let Some(err) = lock(&self.inner.faults).begin.clone() {
            return Err(err);
        }
        let staged = lock(&self.inner.store).clone();
        Ok(MemoryTx {
            inner: Arc::clone(&self.inner),
            staged: Some(staged),
        })
    }
}

/// Transaction over a private copy of the store.
#[derive(Debug)]
pub struct MemoryTx {
    inner: Arc<Inner>,
    staged: Option<MemoryStore>,
}

impl MemoryTx {
    async fn store(&mut self) -> Result<&mut MemoryStore, QueueStoreError> {
        let (delay, fault) = {
            let faults = lock(&self.inner.faults);
            (faults.delay, faults.queries.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = fault {
            return Err(err);
        }
        self.staged
            .as_mut()
            .ok_or_else(|| QueueStoreError::transaction("transaction already finished"))
    }
}

#[async_trait]
impl Transaction for MemoryTx {
    async fn commit(mut self) -> Result<(), QueueStoreError> {
        let Some(staged) = self.staged.take() else {
            return Err(QueueStoreError::transaction("transaction already finished"));
        };
        if let Some(err) = lock(&self.inner.faults).commit.clone() {
            self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(err);
        }
        *lock(&self.inner.store) = staged;
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), QueueStoreError> {
        if self.staged.take().is_some() {
            self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.staged.take().is_some() {
            self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn flag_cancel_attempt(metadata: &mut Value, now: DateTime<Utc>) {
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    if let Value::Object(map) = metadata {
        map.insert(
            "cancel_attempted_at".to_owned(),
            Value::String(now.to_rfc3339()),
        );
    }
}

fn take_limit<T>(items: impl Iterator<Item = T>, limit: u32) -> Vec<T> {
    items
        .take(usize::try_from(limit).unwrap_or(usize::MAX))
        .collect()
}

#[async_trait]
impl QueueExecutor for MemoryTx {
    async fn job_get(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        Ok(self.store().await?.job_mut(id)?.clone())
    }

    async fn job_list(&mut self, params: &JobListParams) -> Result<Vec<Job>, QueueStoreError> {
        let store = &*self.store().await?;
        Ok(take_limit(
            store
                .jobs
                .values()
                .filter(|job| params.matches(job))
                .cloned(),
            params.limit,
        ))
    }

    async fn job_cancel(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let job = self.store().await?.job_mut(id)?;
        let now = Utc::now();
        if job.state.is_finalized() {
            return Ok(job.clone());
        }
        flag_cancel_attempt(&mut job.metadata, now);
        if job.state != JobState::Running {
            job.state = JobState::Cancelled;
            job.finalized_at = Some(now);
        }
        Ok(job.clone())
    }

    async fn job_delete(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let store = self.store().await?;
        let job = store.job_mut(id)?;
        if job.state == JobState::Running {
            return Err(QueueStoreError::job_running(id.get()));
        }
        store
            .jobs
            .remove(&id)
            .ok_or_else(|| QueueStoreError::not_found("job", id.to_string()))
    }

    async fn job_retry(&mut self, id: JobId) -> Result<Job, QueueStoreError> {
        let job = self.store().await?.job_mut(id)?;
        if matches!(job.state, JobState::Available | JobState::Running) {
            return Ok(job.clone());
        }
        job.state = JobState::Available;
        job.scheduled_at = Utc::now();
        job.finalized_at = None;
        if job.attempt >= job.max_attempts {
            job.max_attempts = job.attempt.saturating_add(1);
        }
        Ok(job.clone())
    }

    async fn queue_get(&mut self, name: &str) -> Result<Queue, QueueStoreError> {
        self.store().await?.queue(name)
    }

    async fn queue_list(&mut self, limit: u32) -> Result<Vec<Queue>, QueueStoreError> {
        let store = &*self.store().await?;
        Ok(take_limit(
            store.queues.values().map(|queue| store.with_counts(queue)),
            limit,
        ))
    }

    async fn queue_pause(&mut self, name: &str) -> Result<(), QueueStoreError> {
        let queue = self.store().await?.queue_mut(name)?;
        let now = Utc::now();
        queue.paused_at.get_or_insert(now);
        queue.updated_at = now;
        Ok(())
    }

    async fn queue_resume(&mut self, name: &str) -> Result<(), QueueStoreError> {
        let queue = self.store().await?.queue_mut(name)?;
        queue.paused_at = None;
        queue.updated_at = Utc::now();
        Ok(())
    }

    async fn queue_update_metadata(
        &mut self,
        name: &str,
        metadata: Value,
    ) -> Result<Queue, QueueStoreError> {
        let store = self.store().await?;
        let queue = store.queue_mut(name)?;
        queue.metadata = metadata;
        queue.updated_at = Utc::now();
        store.queue(name)
    }

    async fn job_count_by_state(&mut self) -> Result<JobStateCounts, QueueStoreError> {
        self.inner.count_queries.fetch_add(1, Ordering::SeqCst);
        let store = self.store().await?;
        let mut counts = JobStateCounts::default();
        for job in store.jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }

    async fn ping(&mut self) -> Result<(), QueueStoreError> {
        self.store().await.map(|_| ())
    }
}
