//! The contract every API endpoint implements.
//!
//! An endpoint supplies static metadata and an `execute` operation; decoding,
//! validation, timeouts, and error rendering are handled once by the
//! [`pipeline`](super::pipeline). Request types may pull values from the path
//! or query string through [`EndpointRequest::extract_raw`]; response types
//! choose between the JSON envelope and a raw body through [`Reply`].

use actix_web::http::StatusCode;
use actix_web::http::header::{CONTENT_TYPE, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, Route, web};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::error::{ApiError, JSON_CONTENT_TYPE};
use super::validation::{Validate, Validator};
use crate::domain::ports::QueueStoreError;

/// HTTP verb an endpoint answers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// Reads; the request body is ignored.
    Get,
    /// Creates or triggers an action.
    Post,
    /// Replaces a resource.
    Put,
    /// Partially updates a resource.
    Patch,
    /// Removes a resource.
    Delete,
}

impl Verb {
    /// Read-only verbs never carry a body worth decoding.
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Get)
    }

    /// Upper-case method name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub(crate) fn route(self) -> Route {
        match self {
            Self::Get => web::get(),
            Self::Post => web::post(),
            Self::Put => web::put(),
            Self::Patch => web::patch(),
            Self::Delete => web::delete(),
        }
    }
}

/// Static description of an endpoint, read once when it is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointMeta {
    /// HTTP method the route answers.
    pub verb: Verb,
    /// Actix path template, e.g. `/api/jobs/{job_id}`.
    pub path: &'static str,
    /// Status written for a successful reply.
    pub success_status: StatusCode,
}

impl EndpointMeta {
    /// Metadata answering `verb path` with `200 OK`.
    pub const fn new(verb: Verb, path: &'static str) -> Self {
        Self {
            verb,
            path,
            success_status: StatusCode::OK,
        }
    }

    /// Override the success status.
    #[must_use]
    pub const fn with_status(mut self, success_status: StatusCode) -> Self {
        self.success_status = success_status;
        self
    }
}

/// Errors returned from [`Endpoint::execute`].
///
/// Only [`EndpointError::Api`] is already classified; the pipeline maps every
/// other variant onto the taxonomy before anything is written.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] QueueStoreError),
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Typed request value for one endpoint.
///
/// Bodies are JSON-decoded into `Self`; when there is no body the
/// [`Default`] value is used.
pub trait EndpointRequest: DeserializeOwned + Default + Validate + Send + 'static {
    /// Pull path or query values that do not arrive in the body.
    ///
    /// Runs after body decoding and before validation.
    ///
    /// # Errors
    /// Returns a classified error, conventionally a `BadRequest`.
    fn extract_raw(&mut self, _request: &HttpRequest) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Turns an endpoint's result into an HTTP response.
///
/// JSON types implement this with [`json_reply`]; raw responders (plain text
/// and the like) write their own response and ignore the envelope.
pub trait Reply: Send + 'static {
    /// Build the response using `status` on success.
    ///
    /// # Errors
    /// Returns an internal error when the value cannot be encoded.
    fn into_response(self, status: StatusCode) -> Result<HttpResponse, ApiError>;
}

/// Encode `value` as the JSON body of a response with `status`.
///
/// # Errors
/// Returns a generic internal error (and logs the cause) when serialisation
/// fails.
pub fn json_reply<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<HttpResponse, ApiError> {
    let bytes = serde_json::to_vec(value).map_err(|err| {
        error!(error = %err, "failed to encode response body");
        ApiError::internal_server_error("Internal server error.").with_internal_error(err)
    })?;
    Ok(HttpResponse::build(status)
        .insert_header((CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE)))
        .body(bytes))
}

/// Implement [`Reply`] for types that are written as plain JSON.
macro_rules! json_replies {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::inbound::http::endpoint::Reply for $ty {
                fn into_response(
                    self,
                    status: ::actix_web::http::StatusCode,
                ) -> Result<::actix_web::HttpResponse, $crate::inbound::http::error::ApiError> {
                    $crate::inbound::http::endpoint::json_reply(status, &self)
                }
            }
        )*
    };
}

pub(crate) use json_replies;

/// One API operation.
///
/// # Examples
/// ```
/// use async_trait::async_trait;
/// use queue_admin::inbound::http::endpoint::{
///     Endpoint, EndpointError, EndpointMeta, NoParams, StatusResponse, Verb,
/// };
///
/// struct Ping;
///
/// #[async_trait]
/// impl Endpoint for Ping {
///     type Request = NoParams;
///     type Response = StatusResponse;
///
///     fn meta(&self) -> EndpointMeta {
///         EndpointMeta::new(Verb::Get, "/api/ping")
///     }
///
///     async fn execute(&self, _request: NoParams) -> Result<StatusResponse, EndpointError> {
///         Ok(StatusResponse::ok())
///     }
/// }
/// ```
#[async_trait]
pub trait Endpoint: Send + Sync + 'static {
    type Request: EndpointRequest;
    type Response: Reply;

    /// Route and success status. Called once, at mount time.
    fn meta(&self) -> EndpointMeta;

    /// Perform the operation.
    async fn execute(&self, request: Self::Request) -> Result<Self::Response, EndpointError>;
}

/// Request type for endpoints that take no input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct NoParams {}

impl Validate for NoParams {
    fn validate(&self, _rules: &mut Validator) {}
}

impl EndpointRequest for NoParams {}

/// Acknowledgement body: `{"status":"ok"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Always `ok`.
    pub status: String,
}

impl StatusResponse {
    /// The `ok` acknowledgement.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_owned(),
        }
    }
}

/// List envelope: `{"data":[...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    /// Wrap `data` in the envelope.
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T: Serialize + Send + 'static> Reply for ListResponse<T> {
    fn into_response(self, status: StatusCode) -> Result<HttpResponse, ApiError> {
        json_reply(status, &self)
    }
}

/// Plain-text body written without the JSON envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainText(pub String);

impl Reply for PlainText {
    fn into_response(self, status: StatusCode) -> Result<HttpResponse, ApiError> {
        Ok(HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(self.0))
    }
}

json_replies!(StatusResponse);

/// Read a required path segment.
///
/// # Errors
/// Returns a `BadRequest` when the segment is missing from the matched route.
pub fn path_param<'r>(request: &'r HttpRequest, name: &str) -> Result<&'r str, ApiError> {
    request
        .match_info()
        .get(name)
        .ok_or_else(|| ApiError::bad_request(format!("Missing path parameter `{name}`.")))
}
