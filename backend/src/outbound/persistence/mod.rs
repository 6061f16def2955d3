//! PostgreSQL persistence adapter for the job queue.
//!
//! Diesel row types and SQL strings stay private to this module; callers see
//! only [`PgBackend`], the pool, and domain types.
//!
//! # Example
//!
//! ```no_run
//! use queue_admin::outbound::persistence::{DbPool, PgBackend, PoolConfig};
//!
//! # async fn build() -> Result<PgBackend, queue_admin::outbound::persistence::PoolError> {
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/river")).await?;
//! Ok(PgBackend::new(pool))
//! # }
//! ```

pub(crate) mod diesel_helpers;
mod pg_backend;
mod pool;
mod rows;

pub use pg_backend::{PgBackend, PgTx};
pub use pool::{DbPool, OwnedConnection, PoolConfig, PoolError};
