//! `GET /api/states`: job counts per state.
//!
//! Counting a large `river_job` table is expensive, so the endpoint reads
//! from a [`QueryCacher`] once the cached total is large enough that a
//! slightly stale answer is cheaper than a fresh one. Below the threshold it
//! counts inline.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;

use super::endpoint::{Endpoint, EndpointError, EndpointMeta, NoParams, Verb, json_replies};
use crate::domain::JobStateCounts;
use crate::domain::ports::{QueueBackend, QueueExecutor};
use crate::domain::transaction::with_result;
use crate::outbound::cache::{BoxError, QueryCacher, QueryCacherConfig};

/// Cached totals at or above this are served without re-counting.
pub const SKIP_CACHE_THRESHOLD: i64 = 1_000_000;

json_replies!(JobStateCounts);

/// Build the cacher that refreshes state counts in the background.
pub fn state_counts_cacher<B: QueueBackend>(
    backend: Arc<B>,
    config: QueryCacherConfig,
) -> QueryCacher<JobStateCounts> {
    QueryCacher::new("job_state_counts", config, move || {
        let backend = Arc::clone(&backend);
        async move {
            with_result(backend.as_ref(), |tx| {
                async move { tx.job_count_by_state().await }.boxed()
            })
            .await
            .map_err(BoxError::from)
        }
    })
}

/// `GET /api/states`
pub struct StateCountsEndpoint<B> {
    backend: Arc<B>,
    cacher: Arc<QueryCacher<JobStateCounts>>,
    skip_threshold: i64,
}

impl<B> StateCountsEndpoint<B> {
    /// Endpoint reading from `cacher`, falling back to `backend`.
    pub fn new(backend: Arc<B>, cacher: Arc<QueryCacher<JobStateCounts>>) -> Self {
        Self {
            backend,
            cacher,
            skip_threshold: SKIP_CACHE_THRESHOLD,
        }
    }

    /// Override the total above which cached counts are trusted.
    #[must_use]
    pub fn with_skip_threshold(mut self, skip_threshold: i64) -> Self {
        self.skip_threshold = skip_threshold;
        self
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for StateCountsEndpoint<B> {
    type Request = NoParams;
    type Response = JobStateCounts;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/states")
    }

    async fn execute(&self, _request: NoParams) -> Result<JobStateCounts, EndpointError> {
        if let Some(cached) = self.cacher.cached_res() {
            if cached.total() >= self.skip_threshold {
                return Ok(cached);
            }
        }
        with_result(self.backend.as_ref(), |tx| {
            async move { tx.job_count_by_state().await.map_err(EndpointError::from) }.boxed()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::domain::JobState;
    use crate::test_support::MemoryBackend;

    fn endpoint(backend: &MemoryBackend) -> StateCountsEndpoint<MemoryBackend> {
        let backend = Arc::new(backend.clone());
        let cacher = Arc::new(state_counts_cacher(
            Arc::clone(&backend),
            QueryCacherConfig::default(),
        ));
        StateCountsEndpoint::new(backend, cacher)
    }

    #[rstest]
    #[tokio::test]
    async fn counts_inline_when_nothing_is_cached() {
        let backend = MemoryBackend::new();
        backend.insert_job("email", "default", JobState::Available);
        backend.insert_job("email", "default", JobState::Running);

        let counts = endpoint(&backend)
            .execute(NoParams::default())
            .await
            .expect("counts");
        assert_eq!((counts.available, counts.running), (1, 1));
        assert_eq!(backend.count_queries(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn large_cached_totals_skip_the_query() {
        let backend = MemoryBackend::new();
        for _ in 0..3 {
            backend.insert_job("email", "default", JobState::Completed);
        }
        let endpoint = endpoint(&backend).with_skip_threshold(3);
        endpoint.cacher.run_query().await.expect("warm cache");
        backend.insert_job("email", "default", JobState::Completed);

        let counts = endpoint.execute(NoParams::default()).await.expect("counts");
        assert_eq!(counts.completed, 3);
        assert_eq!(backend.count_queries(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn small_cached_totals_are_recounted() {
        let backend = MemoryBackend::new();
        backend.insert_job("email", "default", JobState::Completed);
        let endpoint = endpoint(&backend);
        endpoint.cacher.run_query().await.expect("warm cache");
        backend.insert_job("email", "default", JobState::Completed);

        let counts = endpoint.execute(NoParams::default()).await.expect("counts");
        assert_eq!(counts.completed, 2);
        assert_eq!(backend.count_queries(), 2);
    }
}
