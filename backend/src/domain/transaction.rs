//! Scoped transactions: begin, run, then commit or roll back.
//!
//! Every endpoint touches the store through [`with_result`], so the
//! begin/commit/rollback choreography lives in exactly one place. The helper
//! is generic over the backend's transaction handle, letting production
//! (pooled PostgreSQL connections) and tests (in-memory snapshots) share
//! endpoint code unchanged.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::warn;

use crate::domain::ports::{QueueStoreError, Transaction, TxBackend};

/// Run `work` inside a fresh transaction and return its result.
///
/// The transaction is committed only when `work` succeeds. An error from
/// `work` rolls back and is returned untouched; a panic rolls back and then
/// resumes unwinding. A failed commit surfaces as a
/// [`QueueStoreError::Transaction`], which the HTTP pipeline treats as an
/// internal error. If the returned future is dropped part-way (for example on
/// a request timeout) the handle's own drop logic rolls back.
///
/// # Examples
/// ```no_run
/// use futures_util::FutureExt;
/// use queue_admin::domain::ports::{QueueBackend, QueueExecutor, QueueStoreError};
/// use queue_admin::domain::transaction::with_result;
/// use queue_admin::domain::{Job, JobId};
///
/// async fn load<B: QueueBackend>(backend: &B, id: JobId) -> Result<Job, QueueStoreError> {
///     with_result(backend, |tx| async move { tx.job_get(id).await }.boxed()).await
/// }
/// ```
///
/// # Errors
/// Returns the error from `work`, or a converted [`QueueStoreError`] if the
/// transaction cannot be opened or committed.
pub async fn with_result<B, T, E, F>(backend: &B, work: F) -> Result<T, E>
where
    B: TxBackend + ?Sized,
    E: From<QueueStoreError>,
    F: for<'tx> FnOnce(&'tx mut B::Tx) -> BoxFuture<'tx, Result<T, E>>,
{
    let mut tx = backend.begin().await.map_err(E::from)?;

    let outcome = AssertUnwindSafe(work(&mut tx)).catch_unwind().await;
    match outcome {
        Ok(Ok(value)) => {
            tx.commit().await.map_err(E::from)?;
            Ok(value)
        }
        Ok(Err(err)) => {
            rollback_quietly(tx).await;
            Err(err)
        }
        Err(panic) => {
            rollback_quietly(tx).await;
            std::panic::resume_unwind(panic)
        }
    }
}

async fn rollback_quietly<Tx: Transaction>(tx: Tx) {
    if let Err(error) = tx.rollback().await {
        warn!(%error, "rollback after failed unit of work also failed");
    }
}
