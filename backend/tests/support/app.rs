//! Shared harness for the HTTP integration suites: builds the full
//! application over an in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use actix_http::Request;
use actix_web::body::BoxBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::test;
use queue_admin::inbound::http::pipeline::PipelineConfig;
use queue_admin::inbound::http::spa::SpaAssets;
use queue_admin::inbound::http::state::HttpState;
use queue_admin::inbound::http::state_counts::state_counts_cacher;
use queue_admin::outbound::cache::QueryCacherConfig;
use queue_admin::server::build_app;
use queue_admin::test_support::MemoryBackend;
use serde_json::Value;

pub fn state(backend: &MemoryBackend, request_timeout: Duration) -> HttpState<MemoryBackend> {
    let backend = Arc::new(backend.clone());
    let cacher = Arc::new(state_counts_cacher(
        Arc::clone(&backend),
        QueryCacherConfig::default(),
    ));
    HttpState::new(
        backend,
        cacher,
        PipelineConfig::default().with_request_timeout(request_timeout),
    )
}

pub async fn init_app(
    backend: &MemoryBackend,
    assets: SpaAssets,
) -> impl Service<Request, Response = ServiceResponse<BoxBody>, Error = actix_web::Error> {
    init_app_with_timeout(backend, assets, Duration::from_secs(10)).await
}

pub async fn init_app_with_timeout(
    backend: &MemoryBackend,
    assets: SpaAssets,
    request_timeout: Duration,
) -> impl Service<Request, Response = ServiceResponse<BoxBody>, Error = actix_web::Error> {
    test::init_service(build_app(state(backend, request_timeout), assets)).await
}

/// Read a response body as JSON.
pub async fn json_body(res: ServiceResponse<BoxBody>) -> Value {
    let bytes = test::read_body(res).await;
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
