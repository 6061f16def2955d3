//! HTTP inbound adapter exposing the admin REST API.
//!
//! [`endpoint`] defines the contract every operation implements and
//! [`pipeline`] runs it; the remaining modules are the concrete endpoints,
//! the route table, and the single-page-app fallback.

pub mod endpoint;
pub mod error;
pub mod health;
pub mod jobs;
pub mod pipeline;
pub mod query;
pub mod queues;
pub mod routes;
pub mod spa;
pub mod state;
pub mod state_counts;
pub mod validation;

pub use error::ApiError;
