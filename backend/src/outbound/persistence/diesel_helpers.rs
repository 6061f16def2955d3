//! Error translation from Diesel and the pool into [`QueueStoreError`].

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use crate::domain::ports::QueueStoreError;

use super::pool::PoolError;

/// SQLSTATE 42501 surfaces with this phrase.
const PRIVILEGE_MARKER: &str = "permission denied";
/// Undefined tables and types (SQLSTATE 42P01/42704) surface with this phrase.
const MISSING_MARKER: &str = "does not exist";

/// Map pool failures. A checkout timeout usually means the database is down.
pub fn map_pool_error(error: PoolError) -> QueueStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            QueueStoreError::connection(message)
        }
    }
}

/// Map a Diesel error raised by `operation`.
pub fn map_diesel_error(error: DieselError, operation: &str) -> QueueStoreError {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), %operation, "diesel operation failed");
        }
        _ => debug!(error = %error, %operation, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            QueueStoreError::connection(info.message())
        }
        DieselError::DatabaseError(_, info) => classify_message(info.message()),
        DieselError::BrokenTransactionManager
        | DieselError::AlreadyInTransaction
        | DieselError::NotInTransaction => QueueStoreError::transaction(error.to_string()),
        DieselError::RollbackErrorOnCommit {
            commit_error,
            rollback_error,
        } => QueueStoreError::transaction(format!(
            "commit failed ({commit_error}) and rollback failed ({rollback_error})"
        )),
        other => QueueStoreError::query(format!("{operation}: {other}")),
    }
}

fn classify_message(message: &str) -> QueueStoreError {
    let lower = message.to_lowercase();
    if lower.contains(PRIVILEGE_MARKER) {
        QueueStoreError::insufficient_privilege(message)
    } else if lower.contains(MISSING_MARKER)
        && (lower.contains("relation") || lower.contains("type"))
    {
        QueueStoreError::missing_schema(message)
    } else if lower.contains("connection") && lower.contains("closed") {
        QueueStoreError::connection(message)
    } else {
        QueueStoreError::query(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("permission denied for table river_job", "insufficient database privilege: permission denied for table river_job")]
    #[case("relation \"river_job\" does not exist", "job queue schema is missing: relation \"river_job\" does not exist")]
    #[case("type \"river_job_state\" does not exist", "job queue schema is missing: type \"river_job_state\" does not exist")]
    #[case("column \"kind\" does not exist", "job queue store query failed: column \"kind\" does not exist")]
    #[case("server closed the connection unexpectedly", "job queue store connection failed: server closed the connection unexpectedly")]
    fn database_messages_are_classified(#[case] message: &str, #[case] expected: &str) {
        assert_eq!(classify_message(message).to_string(), expected);
    }

    #[rstest]
    fn checkout_failures_are_connection_errors() {
        let err = map_pool_error(PoolError::checkout("timed out waiting for connection"));
        assert_eq!(err, QueueStoreError::connection("timed out waiting for connection"));
    }

    #[rstest]
    fn transaction_state_errors_are_transaction_errors() {
        let err = map_diesel_error(DieselError::NotInTransaction, "commit");
        assert!(matches!(err, QueueStoreError::Transaction { .. }));
    }

    #[rstest]
    fn other_errors_name_the_operation() {
        let err = map_diesel_error(DieselError::NotFound, "job get");
        assert_eq!(err, QueueStoreError::query("job get: Record not found"));
    }
}
