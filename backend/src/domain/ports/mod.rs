//! Domain ports: the seam between the admin surface and the external job
//! queue.
//!
//! The job queue engine owns scheduling, leasing, and its state machine; this
//! crate only reaches it through the transaction-scoped operations declared
//! here. Production wires a PostgreSQL adapter; tests wire an in-memory one.

mod macros;
mod queue_store;

pub(crate) use macros::define_port_error;
pub use queue_store::{QueueBackend, QueueExecutor, QueueStoreError, Transaction, TxBackend};
