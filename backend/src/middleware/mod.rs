//! Request middleware.
//!
//! Purpose: Define middleware components for request lifecycle concerns such as
//! request correlation.

pub mod request_id;

pub use request_id::{RequestId, RequestTrace};
