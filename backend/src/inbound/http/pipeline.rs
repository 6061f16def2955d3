//! Uniform request execution for [`Endpoint`] implementations.
//!
//! Every mounted endpoint runs the same steps under one deadline: decode the
//! body, extract path and query values, validate, execute, and encode the
//! reply. Failures are classified exactly once, here, so the wire only ever
//! sees the public message of an [`ApiError`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{HttpRequest, HttpResponse, web};
use tracing::{error, info};

use super::endpoint::{Endpoint, EndpointError, EndpointMeta, EndpointRequest, Reply, Verb};
use super::error::{ApiError, ErrorKind};
use super::validation::validate;
use crate::domain::ports::QueueStoreError;
use crate::middleware::RequestId;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const TIMEOUT_MESSAGE: &str = "Request timed out. Retrying the request might work.";
const INTERNAL_MESSAGE: &str = "Internal server error.";
const UNAVAILABLE_MESSAGE: &str = "Unable to reach the database. Retrying the request might work.";
const PRIVILEGE_MESSAGE: &str = "The database user lacks a privilege required for this operation. \
Grant access to the job queue tables and try again.";
const SCHEMA_MESSAGE: &str = "The job queue tables were not found. \
Check that migrations have been run against the configured database.";

/// Settings shared by every endpoint the pipeline mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl PipelineConfig {
    /// Override the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

/// Register `endpoint` on `cfg` at the route described by its metadata.
///
/// # Panics
/// Panics when the endpoint declares an empty path; that is a wiring mistake
/// caught at startup.
pub fn mount<E: Endpoint>(cfg: &mut web::ServiceConfig, endpoint: E, config: PipelineConfig) {
    let meta = endpoint.meta();
    assert!(
        !meta.path.is_empty(),
        "endpoint for {} declares an empty path",
        meta.verb.as_str()
    );
    let endpoint = Arc::new(endpoint);
    cfg.route(
        meta.path,
        meta.verb
            .route()
            .to(move |req: HttpRequest, body: web::Bytes| {
                let endpoint = Arc::clone(&endpoint);
                async move { handle(endpoint.as_ref(), meta, config, req, body).await }
            }),
    );
}

async fn handle<E: Endpoint>(
    endpoint: &E,
    meta: EndpointMeta,
    config: PipelineConfig,
    req: HttpRequest,
    body: web::Bytes,
) -> HttpResponse {
    let started = Instant::now();
    let outcome = tokio::time::timeout(config.request_timeout, run(endpoint, meta, &req, &body))
        .await
        .unwrap_or_else(|_| Err(EndpointError::DeadlineExceeded));

    match outcome {
        Ok(response) => {
            let request_id = request_id_field();
            info!(
                request_id = request_id.as_deref(),
                method = meta.verb.as_str(),
                route = meta.path,
                path = req.path(),
                status = response.status().as_u16(),
                elapsed_ms = elapsed_ms(started),
                "request completed"
            );
            response
        }
        Err(err) => {
            let failure = classify(err);
            log_failure(&failure, meta, &req, started);
            failure.error.write()
        }
    }
}

async fn run<E: Endpoint>(
    endpoint: &E,
    meta: EndpointMeta,
    req: &HttpRequest,
    body: &[u8],
) -> Result<HttpResponse, EndpointError> {
    let mut request: E::Request = decode(meta.verb, body)?;
    request.extract_raw(req)?;
    validate(&request)?;
    let reply = endpoint.execute(request).await?;
    Ok(reply.into_response(meta.success_status)?)
}

/// Decode `body` for `verb`, falling back to the default request value.
///
/// # Errors
/// Returns a `BadRequest` carrying the decoder's message when the body is
/// not valid JSON for `T`.
pub fn decode<T: EndpointRequest>(verb: Verb, body: &[u8]) -> Result<T, ApiError> {
    if verb.is_read_only() || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("Error decoding request body: {err}.")))
}

/// A classified failure plus how loudly it should be logged.
struct Failure {
    error: ApiError,
    expected: bool,
}

fn classify(err: EndpointError) -> Failure {
    match err {
        EndpointError::Api(error) => Failure {
            error,
            expected: true,
        },
        EndpointError::DeadlineExceeded => Failure {
            error: ApiError::service_unavailable(TIMEOUT_MESSAGE),
            expected: false,
        },
        EndpointError::Store(store) => Failure {
            error: reinterpret(store),
            expected: false,
        },
        EndpointError::Other(cause) => Failure {
            error: ApiError::internal_server_error(INTERNAL_MESSAGE)
                .with_shared_internal_error(Arc::from(cause)),
            expected: false,
        },
    }
}

/// Map an unclassified backend failure onto the taxonomy.
///
/// Privilege and schema problems are usually fixable by the operator, so
/// they surface as `BadRequest` with an actionable message.
pub fn reinterpret(store: QueueStoreError) -> ApiError {
    let public = match &store {
        QueueStoreError::InsufficientPrivilege { .. } => ApiError::bad_request(PRIVILEGE_MESSAGE),
        QueueStoreError::MissingSchema { .. } => ApiError::bad_request(SCHEMA_MESSAGE),
        QueueStoreError::Connection { .. } => ApiError::service_unavailable(UNAVAILABLE_MESSAGE),
        _ => ApiError::internal_server_error(INTERNAL_MESSAGE),
    };
    public.with_internal_error(store)
}

fn log_failure(failure: &Failure, meta: EndpointMeta, req: &HttpRequest, started: Instant) {
    let error = &failure.error;
    let cause = error.internal_error().map(ToString::to_string);
    let status = error.kind().status_code().as_u16();
    let request_id = request_id_field();
    if failure.expected && error.kind() != ErrorKind::InternalServerError {
        info!(
            request_id = request_id.as_deref(),
            method = meta.verb.as_str(),
            route = meta.path,
            path = req.path(),
            status,
            message = error.message(),
            internal_error = cause.as_deref(),
            elapsed_ms = elapsed_ms(started),
            "request rejected"
        );
    } else {
        error!(
            request_id = request_id.as_deref(),
            method = meta.verb.as_str(),
            route = meta.path,
            path = req.path(),
            status,
            message = error.message(),
            internal_error = cause.as_deref(),
            elapsed_ms = elapsed_ms(started),
            "request failed"
        );
    }
}

fn request_id_field() -> Option<String> {
    RequestId::current().map(|id| id.to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
