//! Health checks and the version endpoint.

use std::sync::Arc;

use actix_web::HttpRequest;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Deserialize;

use super::endpoint::{
    Endpoint, EndpointError, EndpointMeta, EndpointRequest, NoParams, PlainText, StatusResponse,
    Verb, path_param,
};
use super::error::ApiError;
use super::validation::{Validate, Validator};
use crate::domain::ports::{QueueBackend, QueueExecutor, QueueStoreError};
use crate::domain::transaction::with_result;

/// Public message for a failed database health check.
pub const DATABASE_UNAVAILABLE_MESSAGE: &str = "Unable to query database. Check logs for details.";

/// Which health check to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheck {
    /// Round-trips the database inside a transaction.
    Complete,
    /// Answers without touching the database.
    Minimal,
}

impl HealthCheck {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "complete" => Some(Self::Complete),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

/// Path for `GET /api/health-checks/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HealthCheckRequest {
    #[serde(skip)]
    pub name: String,
}

impl Validate for HealthCheckRequest {
    fn validate(&self, rules: &mut Validator) {
        rules.required("name", !self.name.is_empty());
    }
}

impl EndpointRequest for HealthCheckRequest {
    fn extract_raw(&mut self, request: &HttpRequest) -> Result<(), ApiError> {
        path_param(request, "name")?.clone_into(&mut self.name);
        Ok(())
    }
}

/// `GET /api/health-checks/{name}`
pub struct HealthCheckEndpoint<B> {
    backend: Arc<B>,
}

impl<B> HealthCheckEndpoint<B> {
    /// Health check endpoint over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for HealthCheckEndpoint<B> {
    type Request = HealthCheckRequest;
    type Response = StatusResponse;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/health-checks/{name}")
    }

    async fn execute(&self, request: HealthCheckRequest) -> Result<StatusResponse, EndpointError> {
        let check = HealthCheck::from_name(&request.name).ok_or_else(|| {
            ApiError::not_found(format!("Health check not found: {}.", request.name))
        })?;
        if check == HealthCheck::Complete {
            with_result(self.backend.as_ref(), |tx| {
                async move { tx.ping().await }.boxed()
            })
            .await
            .map_err(|err: QueueStoreError| {
                ApiError::service_unavailable(DATABASE_UNAVAILABLE_MESSAGE).with_internal_error(err)
            })?;
        }
        Ok(StatusResponse::ok())
    }
}

/// `GET /api/version`, answered as plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionEndpoint;

#[async_trait]
impl Endpoint for VersionEndpoint {
    type Request = NoParams;
    type Response = PlainText;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/version")
    }

    async fn execute(&self, _request: NoParams) -> Result<PlainText, EndpointError> {
        Ok(PlainText(env!("CARGO_PKG_VERSION").to_owned()))
    }
}
