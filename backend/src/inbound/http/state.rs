//! Shared HTTP adapter state.
//!
//! Endpoints receive their dependencies through this bundle at mount time,
//! so they depend only on domain ports and stay testable without I/O.

use std::sync::Arc;

use super::pipeline::PipelineConfig;
use crate::domain::JobStateCounts;
use crate::outbound::cache::QueryCacher;

/// Dependencies handed to every mounted endpoint.
pub struct HttpState<B> {
    pub backend: Arc<B>,
    pub state_counts: Arc<QueryCacher<JobStateCounts>>,
    pub pipeline: PipelineConfig,
}

impl<B> HttpState<B> {
    /// Bundle the backend, the state-count cacher, and pipeline settings.
    pub fn new(
        backend: Arc<B>,
        state_counts: Arc<QueryCacher<JobStateCounts>>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            backend,
            state_counts,
            pipeline,
        }
    }
}

// Manual impl: `B` itself need not be `Clone`.
impl<B> Clone for HttpState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            state_counts: Arc::clone(&self.state_counts),
            pipeline: self.pipeline,
        }
    }
}
