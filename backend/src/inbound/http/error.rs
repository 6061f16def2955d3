//! HTTP error taxonomy.
//!
//! Purpose: every failure that reaches a client is exactly one of four kinds,
//! each with a fixed status code and a public message. An optional internal
//! cause rides along for operators; it is logged by the pipeline and never
//! serialised.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use actix_web::http::header::{CONTENT_TYPE, HeaderValue};
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Content type used for every JSON body this service writes.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Boxed internal cause.
pub type InternalCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Classification of a client-facing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, failed validation, or a semantically invalid request.
    BadRequest,
    /// The referenced job, queue, or check does not exist.
    NotFound,
    /// Transient unavailability; retrying may succeed.
    ServiceUnavailable,
    /// Anything else. The message is deliberately generic.
    InternalServerError,
}

impl ErrorKind {
    /// Status code written for this kind.
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Wire shape of every error body: a single `message` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorBody {
    pub message: String,
}

/// A classified, client-safe error.
///
/// ## Invariants
/// - `message` is public and never embeds the internal cause's text.
/// - The internal cause is available to logging only.
///
/// # Examples
/// ```
/// use actix_web::ResponseError;
/// use actix_web::http::StatusCode;
/// use queue_admin::inbound::http::error::{ApiError, ErrorKind};
///
/// let err = ApiError::not_found(format!("Job not found: {}.", 123))
///     .with_internal_error(std::io::Error::other("row missing"));
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// assert_eq!(err.message(), "Job not found: 123.");
/// assert!(err.internal_error().is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    internal: Option<InternalCause>,
}

impl ApiError {
    /// Construct an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            internal: None,
        }
    }

    /// Convenience constructor for [`ErrorKind::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Convenience constructor for [`ErrorKind::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Convenience constructor for [`ErrorKind::ServiceUnavailable`].
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Convenience constructor for [`ErrorKind::InternalServerError`].
    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalServerError, message)
    }

    /// Attach a cause for server-side logging.
    pub fn with_internal_error<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.internal = Some(Arc::new(cause));
        self
    }

    /// Attach an already shared cause.
    pub fn with_shared_internal_error(mut self, cause: InternalCause) -> Self {
        self.internal = Some(cause);
        self
    }

    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Public message written to the client.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Cause recorded for operators, if any.
    pub fn internal_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.internal.as_deref()
    }

    /// Write the error as a JSON response.
    ///
    /// Serialisation failures are logged and produce an empty body with the
    /// same status; they never panic.
    pub fn write(&self) -> HttpResponse {
        let status = self.kind.status_code();
        let body = ErrorBody {
            message: self.message.clone(),
        };
        match serde_json::to_vec(&body) {
            Ok(bytes) => HttpResponse::build(status)
                .insert_header((CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE)))
                .body(bytes),
            Err(err) => {
                error!(error = %err, status = status.as_u16(), "failed to encode error body");
                HttpResponse::build(status).finish()
            }
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.internal
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        self.write()
    }
}
