//! Job endpoints: list, get, and the bulk cancel/delete/retry actions.
//!
//! Bulk actions run every identifier inside one transaction, so a single
//! unknown or running job leaves all the others untouched.

use std::sync::Arc;

use actix_web::HttpRequest;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::Deserialize;

use super::endpoint::{
    Endpoint, EndpointError, EndpointMeta, EndpointRequest, ListResponse, StatusResponse, Verb,
    json_replies, path_param,
};
use super::error::ApiError;
use super::query::QueryParams;
use super::validation::{Validate, Validator};
use crate::domain::ports::{QueueBackend, QueueExecutor, QueueStoreError};
use crate::domain::transaction::with_result;
use crate::domain::{Job, JobId, JobListParams, JobState};

/// Page size of `GET /api/jobs` when `limit` is absent.
pub const DEFAULT_JOB_LIMIT: i64 = 20;
/// Largest `limit` accepted by `GET /api/jobs`.
pub const MAX_JOB_LIMIT: i64 = 1000;
/// Largest batch a bulk action accepts.
pub const MAX_BULK_JOBS: usize = 1000;

json_replies!(Job);

/// Translate store failures for `id` into client-facing errors.
fn job_error(id: JobId, err: QueueStoreError) -> EndpointError {
    match err {
        QueueStoreError::NotFound { .. } => ApiError::not_found(format!("Job not found: {id}."))
            .with_internal_error(err)
            .into(),
        QueueStoreError::JobRunning { .. } => ApiError::bad_request(format!(
            "Job {id} is running and cannot be deleted. Cancel it first."
        ))
        .into(),
        other => other.into(),
    }
}

/// Query for `GET /api/jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobListRequest {
    pub limit: i64,
    pub state: Option<String>,
    pub ids: Vec<JobId>,
    pub kinds: Vec<String>,
    pub queues: Vec<String>,
    pub priorities: Vec<i16>,
}

impl Default for JobListRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_JOB_LIMIT,
            state: None,
            ids: Vec::new(),
            kinds: Vec::new(),
            queues: Vec::new(),
            priorities: Vec::new(),
        }
    }
}

impl Validate for JobListRequest {
    fn validate(&self, rules: &mut Validator) {
        rules
            .min("limit", self.limit, 1)
            .max("limit", self.limit, MAX_JOB_LIMIT);
        if let Some(state) = &self.state {
            rules.one_of("state", state, &JobState::NAMES);
        }
        rules.max_items("ids", self.ids.len(), MAX_BULK_JOBS);
    }
}

impl EndpointRequest for JobListRequest {
    fn extract_raw(&mut self, request: &HttpRequest) -> Result<(), ApiError> {
        let query = QueryParams::from_request(request);
        if let Some(limit) = query.integer("limit")? {
            self.limit = limit;
        }
        self.state = query.last("state").map(str::to_owned);
        self.ids = query.integers::<i64>("ids")?.into_iter().map(JobId::new).collect();
        self.kinds = query.all("kinds");
        self.queues = query.all("queues");
        self.priorities = query.integers("priorities")?;
        Ok(())
    }
}

impl JobListRequest {
    fn into_params(self) -> JobListParams {
        let limit = u32::try_from(self.limit).unwrap_or(u32::MAX);
        let mut params = JobListParams::with_limit(limit);
        // Validation has already restricted `state` to known names.
        params.states = self
            .state
            .iter()
            .filter_map(|state| state.parse().ok())
            .collect();
        params.ids = self.ids;
        params.kinds = self.kinds;
        params.queues = self.queues;
        params.priorities = self.priorities;
        params
    }
}

/// `GET /api/jobs`
pub struct JobListEndpoint<B> {
    backend: Arc<B>,
}

impl<B> JobListEndpoint<B> {
    /// Listing endpoint over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for JobListEndpoint<B> {
    type Request = JobListRequest;
    type Response = ListResponse<Job>;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/jobs")
    }

    async fn execute(&self, request: JobListRequest) -> Result<ListResponse<Job>, EndpointError> {
        let params = request.into_params();
        let jobs = with_result(self.backend.as_ref(), move |tx| {
            async move { tx.job_list(&params).await.map_err(EndpointError::from) }.boxed()
        })
        .await?;
        Ok(ListResponse::new(jobs))
    }
}

/// Path for `GET /api/jobs/{job_id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobGetRequest {
    #[serde(skip)]
    pub job_id: Option<JobId>,
}

impl Validate for JobGetRequest {
    fn validate(&self, rules: &mut Validator) {
        rules.required("job_id", self.job_id.is_some());
    }
}

impl EndpointRequest for JobGetRequest {
    fn extract_raw(&mut self, request: &HttpRequest) -> Result<(), ApiError> {
        let raw = path_param(request, "job_id")?;
        let id = raw.parse::<JobId>().map_err(|err| {
            ApiError::bad_request(format!("Job ID `{}` is not a valid integer.", err.value()))
        })?;
        self.job_id = Some(id);
        Ok(())
    }
}

/// `GET /api/jobs/{job_id}`
pub struct JobGetEndpoint<B> {
    backend: Arc<B>,
}

impl<B> JobGetEndpoint<B> {
    /// Single-job endpoint over `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for JobGetEndpoint<B> {
    type Request = JobGetRequest;
    type Response = Job;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Get, "/api/jobs/{job_id}")
    }

    async fn execute(&self, request: JobGetRequest) -> Result<Job, EndpointError> {
        let id = request
            .job_id
            .ok_or_else(|| ApiError::bad_request("Field `job_id` is required."))?;
        with_result(self.backend.as_ref(), move |tx| {
            async move { tx.job_get(id).await.map_err(|err| job_error(id, err)) }.boxed()
        })
        .await
    }
}

/// Body for the bulk job actions: `{"job_ids": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobIdsRequest {
    #[serde(default)]
    pub job_ids: Vec<JobId>,
}

impl Validate for JobIdsRequest {
    fn validate(&self, rules: &mut Validator) {
        rules
            .min_items("job_ids", self.job_ids.len(), 1)
            .max_items("job_ids", self.job_ids.len(), MAX_BULK_JOBS);
    }
}

impl EndpointRequest for JobIdsRequest {}

/// Operation applied by a [`JobActionEndpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    Cancel,
    Delete,
    Retry,
}

impl JobAction {
    const fn path(self) -> &'static str {
        match self {
            Self::Cancel => "/api/jobs/cancel",
            Self::Delete => "/api/jobs/delete",
            Self::Retry => "/api/jobs/retry",
        }
    }

    async fn apply<X>(self, tx: &mut X, id: JobId) -> Result<Job, QueueStoreError>
    where
        X: QueueExecutor + ?Sized,
    {
        match self {
            Self::Cancel => tx.job_cancel(id).await,
            Self::Delete => tx.job_delete(id).await,
            Self::Retry => tx.job_retry(id).await,
        }
    }
}

/// `POST /api/jobs/{cancel,delete,retry}`
pub struct JobActionEndpoint<B> {
    backend: Arc<B>,
    action: JobAction,
}

impl<B> JobActionEndpoint<B> {
    /// Bulk endpoint applying `action` to each requested job.
    pub fn new(backend: Arc<B>, action: JobAction) -> Self {
        Self { backend, action }
    }
}

#[async_trait]
impl<B: QueueBackend> Endpoint for JobActionEndpoint<B> {
    type Request = JobIdsRequest;
    type Response = StatusResponse;

    fn meta(&self) -> EndpointMeta {
        EndpointMeta::new(Verb::Post, self.action.path())
    }

    async fn execute(&self, request: JobIdsRequest) -> Result<StatusResponse, EndpointError> {
        let action = self.action;
        let ids = request.job_ids;
        with_result(self.backend.as_ref(), move |tx| {
            async move {
                for id in ids {
                    action
                        .apply(tx, id)
                        .await
                        .map_err(|err| job_error(id, err))?;
                }
                Ok(StatusResponse::ok())
            }
            .boxed()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use rstest::rstest;

    use crate::inbound::http::error::ErrorKind;
    use crate::inbound::http::validation::validate;

    fn list_request(query: &str) -> Result<JobListRequest, ApiError> {
        let http = TestRequest::get()
            .uri(&format!("/api/jobs?{query}"))
            .to_http_request();
        let mut request = JobListRequest::default();
        request.extract_raw(&http)?;
        validate(&request)?;
        Ok(request)
    }

    #[rstest]
    fn list_defaults_to_twenty() {
        let request = list_request("").expect("defaults are valid");
        assert_eq!(request.limit, DEFAULT_JOB_LIMIT);
        assert_eq!(request.into_params(), JobListParams::with_limit(20));
    }

    #[rstest]
    fn list_reads_every_filter() {
        let request = list_request(
            "limit=5&state=running&ids=1&ids=2&kinds=email&queues=default,urgent&priorities=1",
        )
        .expect("valid query");
        let params = request.into_params();
        assert_eq!(params.limit, 5);
        assert_eq!(params.states, vec![JobState::Running]);
        assert_eq!(params.ids, vec![JobId::new(1), JobId::new(2)]);
        assert_eq!(params.kinds, vec!["email".to_owned()]);
        assert_eq!(params.queues, vec!["default".to_owned(), "urgent".to_owned()]);
        assert_eq!(params.priorities, vec![1]);
    }

    #[rstest]
    #[case("limit=0", "Field `limit` must be greater than or equal to 1.")]
    #[case("limit=1001", "Field `limit` must be less than or equal to 1000.")]
    #[case("limit=ten", "Query parameter `limit` must be an integer, got `ten`.")]
    #[case(
        "state=sleeping",
        "Field `state` should be one of the following values: available cancelled completed discarded pending retryable running scheduled."
    )]
    fn list_rejects_bad_queries(#[case] query: &str, #[case] expected: &str) {
        let err = list_request(query).expect_err("invalid query");
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        assert_eq!(err.message(), expected);
    }

    #[rstest]
    #[case(0, "Field `job_ids` must contain at least 1 element(s).")]
    #[case(1001, "Field `job_ids` must contain at most 1000 element(s).")]
    fn bulk_bounds_are_enforced(#[case] count: i64, #[case] expected: &str) {
        let request = JobIdsRequest {
            job_ids: (0..count).map(JobId::new).collect(),
        };
        let err = validate(&request).expect_err("out of bounds");
        assert_eq!(err.message(), expected);
    }

    #[rstest]
    fn job_errors_are_classified() {
        let id = JobId::new(123);
        let EndpointError::Api(not_found) = job_error(id, QueueStoreError::not_found("job", "123"))
        else {
            panic!("expected a classified error");
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.message(), "Job not found: 123.");

        let EndpointError::Api(running) = job_error(id, QueueStoreError::job_running(123_i64))
        else {
            panic!("expected a classified error");
        };
        assert_eq!(running.kind(), ErrorKind::BadRequest);

        assert!(matches!(
            job_error(id, QueueStoreError::query("boom")),
            EndpointError::Store(_)
        ));
    }
}
