//! Queue endpoints: list, get, pause, resume, and metadata updates.

use std::sync::Arc;

use actix_web::HttpRequest;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Deserialize;
use serde_json::Value;

use super::endpoint::{
    Endpoint, EndpointError, EndpointMeta, EndpointRequest, ListResponse, StatusResponse, Verb,
    json_replies, path_param,
};
use super::error::ApiError;
use super::query::QueryParams;
use super::validation::{Validate, Validator};
use crate::domain::Queue;
use crate::domain::ports::{QueueBackend, QueueExecutor, QueueStoreError};
use crate::domain::transaction::with_result;

/// Page size of `GET /api/queues` when `limit` is absent.
pub const DEFAULT_QUEUE_LIMIT: i64 = 100;
/// Largest `limit` accepted by `GET /api/queues`.
pub const MAX_QUEUE_LIMIT: i64 = 1000;

json_replies!(Queue);

fn queue_error(name: &str, err: QueueStoreError) -> EndpointError {
    if err.is_not_found() {
        ApiError::not_found(format!("Queue not found: {name}."))
            .with_internal_error(err)
            .into()
    } else {
        err.into()
    }
}

/// Query for `GET /api/queues`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueueListRequest {
    pub limit: i64,
}

impl Default for QueueListRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_QUEUE_LIMIT,
        }
    }
}

impl Validate for QueueListRequest {
    fn validate(&self, rules: &mut Validator) {
        rules
            .min("limit", self.limit, 1)
            .max("limit", self.limit, MAX_QUEUE_LIMIT);
    }
}

impl EndpointRequest for QueueListRequest {
    fn extract_raw(&mut self, request: &HttpRequest) -> Result<(), ApiError> {
        if let Some(limit) = QueryParams::from_request(request).integer("limit")? {
            self.limit = limit;
        }
        Ok(())
    }
}

/// `GET /api/queues`
pub struct QueueListEndpoint<B> {
    backend: Arc<B>,
}

impl<B> QueueListEndpoint<B> {
    /// Listing endpoint over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for QueueListEndpoint<B> {
    type Request = QueueListRequest;
    type Response = ListResponse<Queue>;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/queues")
    }

    async fn execute(
        &self,
        request: QueueListRequest,
    ) -> Result<ListResponse<Queue>, EndpointError> {
        let limit = u32::try_from(request.limit).unwrap_or(u32::MAX);
        let queues = with_result(self.backend.as_ref(), move |tx| {
            async move { tx.queue_list(limit).await.map_err(EndpointError::from) }.boxed()
        })
        .await?;
        Ok(ListResponse::new(queues))
    }
}

/// Path for the single-queue routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QueueNameRequest {
    #[serde(skip)]
    pub name: String,
}

impl Validate for QueueNameRequest {
    fn validate(&self, rules: &mut Validator) {
        rules.required("name", !self.name.is_empty());
    }
}

impl EndpointRequest for QueueNameRequest {
    fn extract_raw(&mut self, request: &HttpRequest) -> Result<(), ApiError> {
        path_param(request, "name")?.clone_into(&mut self.name);
        Ok(())
    }
}

/// `GET /api/queues/{name}`
pub struct QueueGetEndpoint<B> {
    backend: Arc<B>,
}

impl<B> QueueGetEndpoint<B> {
    /// Single-queue endpoint over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for QueueGetEndpoint<B> {
    type Request = QueueNameRequest;
    type Response = Queue;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/queues/{name}")
    }

    async fn execute(&self, request: QueueNameRequest) -> Result<Queue, EndpointError> {
        let name = request.name;
        with_result(self.backend.as_ref(), move |tx| {
            async move {
                tx.queue_get(&name)
                    .await
                    .map_err(|err| queue_error(&name, err))
            }
            .boxed()
        })
        .await
    }
}

/// Whether a [`QueueToggleEndpoint`] pauses or resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueToggle {
    Pause,
    Resume,
}

/// `PUT /api/queues/{name}/pause` and `PUT /api/queues/{name}/resume`
pub struct QueueToggleEndpoint<B> {
    backend: Arc<B>,
    toggle: QueueToggle,
}

impl<B> QueueToggleEndpoint<B> {
    /// Endpoint applying `toggle` to the named queue.
    pub fn new(backend: Arc<B>, toggle: QueueToggle) -> Self {
        Self { backend, toggle }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for QueueToggleEndpoint<B> {
    type Request = QueueNameRequest;
    type Response = StatusResponse;

    fn meta(&self) -> EndpointMeta {
        let path = match self.toggle {
            QueueToggle::Pause => "/api/queues/{name}/pause",
            QueueToggle::Resume => "/api/queues/{name}/resume",
        };
        EndpointMeta::new(Verb::Put, path)
    }

    async fn execute(&self, request: QueueNameRequest) -> Result<StatusResponse, EndpointError> {
        let toggle = self.toggle;
        let name = request.name;
        with_result(self.backend.as_ref(), move |tx| {
            async move {
                let outcome = match toggle {
                    QueueToggle::Pause => tx.queue_pause(&name).await,
                    QueueToggle::Resume => tx.queue_resume(&name).await,
                };
                outcome.map_err(|err| queue_error(&name, err))?;
                Ok(StatusResponse::ok())
            }
            .boxed()
        })
        .await
    }
}

/// Body for `PATCH /api/queues/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueueUpdateRequest {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl Validate for QueueUpdateRequest {
    fn validate(&self, rules: &mut Validator) {
        rules.required("name", !self.name.is_empty());
        match &self.metadata {
            None | Some(Value::Null) => {
                rules.required("metadata", false);
            }
            Some(metadata) => {
                rules.satisfies("metadata", metadata.is_object(), "object");
            }
        }
    }
}

impl EndpointRequest for QueueUpdateRequest {
    fn extract_raw(&mut self, request: &HttpRequest) -> Result<(), ApiError> {
        path_param(request, "name")?.clone_into(&mut self.name);
        Ok(())
    }
}

/// `PATCH /api/queues/{name}`
pub struct QueueUpdateEndpoint<B> {
    backend: Arc<B>,
}

impl<B> QueueUpdateEndpoint<B> {
    /// Metadata update endpoint over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for QueueUpdateEndpoint<B> {
    type Request = QueueUpdateRequest;
    type Response = Queue;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Patch, "/api/queues/{name}")
    }

    async fn execute(&self, request: QueueUpdateRequest) -> Result<Queue, EndpointError> {
        let QueueUpdateRequest { name, metadata } = request;
        let metadata = metadata.unwrap_or(Value::Null);
        with_result(self.backend.as_ref(), move |tx| {
            async move {
                tx.queue_update_metadata(&name, metadata)
                    .await
                    .map_err(|err| queue_error(&name, err))
            }
            .boxed()
        })
        .await
    }
}
