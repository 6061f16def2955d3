//! Domain primitives for the job queue administration surface.
//!
//! Purpose: define the job and queue value types shared by the HTTP adapter
//! and the persistence adapters, the ports through which the external job
//! queue is reached, and the transaction scope every endpoint runs its work
//! inside.
//!
//! Public surface:
//! - [`Job`], [`JobId`], [`JobState`], [`Queue`], [`JobStateCounts`]: value
//!   types with their wire (serde) representation.
//! - [`ports`]: backend traits and the [`ports::QueueStoreError`] sentinel
//!   enum.
//! - [`transaction::with_result`]: begin/commit-or-rollback helper.

pub mod job;
pub mod ports;
pub mod transaction;

pub use self::job::{
    Job, JobId, JobIdParseError, JobListParams, JobState, JobStateCounts,
    JobStateParseError, Queue,
};
