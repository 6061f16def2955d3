//! API route table.
//!
//! ```text
//! GET   /api/health-checks/{name}
//! GET   /api/jobs
//! POST  /api/jobs/cancel
//! POST  /api/jobs/delete
//! POST  /api/jobs/retry
//! GET   /api/jobs/{job_id}
//! GET   /api/queues
//! GET   /api/queues/{name}
//! PATCH /api/queues/{name}
//! PUT   /api/queues/{name}/pause
//! PUT   /api/queues/{name}/resume
//! GET   /api/states
//! GET   /api/version
//! ```

use std::sync::Arc;

use actix_web::web;

use super::health::{HealthCheckEndpoint, VersionEndpoint};
use super::jobs::{JobAction, JobActionEndpoint, JobGetEndpoint, JobListEndpoint};
use super::pipeline::mount;
use super::queues::{
    QueueGetEndpoint, QueueListEndpoint, QueueToggle, QueueToggleEndpoint, QueueUpdateEndpoint,
};
use super::state::HttpState;
use super::state_counts::StateCountsEndpoint;
use crate::domain::ports::QueueBackend;

/// Mount every API endpoint on `cfg`.
///
/// # Examples
/// ```no_run
/// use actix_web::App;
/// use queue_admin::domain::ports::QueueBackend;
/// use queue_admin::inbound::http::routes::configure_api;
/// use queue_admin::inbound::http::state::HttpState;
///
/// fn app<B: QueueBackend>(state: HttpState<B>) {
///     let _app = App::new().configure(|cfg| configure_api(cfg, &state));
/// }
/// ```
pub fn configure_api<B: QueueBackend>(cfg: &mut web::ServiceConfig, state: &HttpState<B>) {
    let pipeline = state.pipeline;
    let backend = || Arc::clone(&state.backend);

    mount(cfg, HealthCheckEndpoint::new(backend()), pipeline);

    for action in [JobAction::Cancel, JobAction::Delete, JobAction::Retry] {
        mount(cfg, JobActionEndpoint::new(backend(), action), pipeline);
    }
    mount(cfg, JobListEndpoint::new(backend()), pipeline);
    mount(cfg, JobGetEndpoint::new(backend()), pipeline);

    mount(cfg, QueueListEndpoint::new(backend()), pipeline);
    mount(cfg, QueueGetEndpoint::new(backend()), pipeline);
    mount(cfg, QueueUpdateEndpoint::new(backend()), pipeline);
    for toggle in [QueueToggle::Pause, QueueToggle::Resume] {
        mount(cfg, QueueToggleEndpoint::new(backend(), toggle), pipeline);
    }

    mount(
        cfg,
        StateCountsEndpoint::new(backend(), Arc::clone(&state.state_counts)),
        pipeline,
    );
    mount(cfg, VersionEndpoint, pipeline);
}
