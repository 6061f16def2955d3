//! Administrative HTTP API for a PostgreSQL-backed job queue.
//!
//! The crate is laid out as ports and adapters: [`domain`] holds the job and
//! queue types plus the backend traits, [`inbound::http`] exposes them over
//! Actix, and [`outbound`] provides the PostgreSQL adapter and the
//! background query cache.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use middleware::RequestTrace;
