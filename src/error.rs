//! Error types for the registry model.

use thiserror::Error;

/// SQLSTATE class for a serialization failure.
const PSQL_SERIALIZATION_FAILURE: &str = "40001";

/// SQLSTATE class for a detected deadlock.
const PSQL_DEADLOCK_DETECTED: &str = "40P01";

/// SQLSTATE class for a unique constraint violation.
const PSQL_UNIQUE_VIOLATION: &str = "23505";

/// Registry model errors.
///
/// Controllable errors are expected outcomes that API front-ends catch and
/// map to protocol responses. Lock-contract violations are programming
/// errors and are never retried. Conflict-class database errors are
/// transient and retried by the executor.
#[derive(Debug, Error)]
pub enum Error {
    /// Referenced entity does not exist
    #[error("no such entry")]
    NoSuchEntry,

    /// Credential check failed
    #[error("authentication failed")]
    Authentication,

    /// Operation is not permitted for this user or host
    #[error("authorization failed")]
    Authorization,

    /// Account exists but has not been activated
    #[error("account not activated yet")]
    NotActivated,

    /// Username is already taken
    #[error("user already exists")]
    UserExists,

    /// A lock was used without being declared in the attempt's budget
    #[error("access exclusive lock on table '{table}' is required but missing")]
    LockNotDeclared { table: String },

    /// An advisory lock was used without being declared
    #[error("advisory lock on key '{key}' is required but missing")]
    AdvisoryLockNotDeclared { key: i64 },

    /// Declared locks that no operation justified before commit
    #[error("declared locks were never used (tables: {tables:?}, advisory keys: {keys:?})")]
    UnusedLocks { tables: Vec<String>, keys: Vec<i64> },

    /// The transaction handle was used after termination
    #[error("transaction already terminated")]
    TransactionTerminated,

    /// The group relation graph contains a cycle
    #[error("group relation cycle detected: {path}")]
    GroupCycle { path: String },

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for domain errors that callers are expected to handle.
    ///
    /// The executor does not log these; everything else is treated as an
    /// unexpected failure and logged before propagating.
    pub fn is_controllable(&self) -> bool {
        matches!(
            self,
            Error::NoSuchEntry
                | Error::Authentication
                | Error::Authorization
                | Error::NotActivated
                | Error::UserExists
        )
    }

    /// True for conflict-class database errors (serialization failure,
    /// deadlock detected) that warrant retrying the whole attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some(PSQL_SERIALIZATION_FAILURE) | Some(PSQL_DEADLOCK_DETECTED)
            ),
            _ => false,
        }
    }

    /// True for unique-violation database errors.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.code().as_deref() == Some(PSQL_UNIQUE_VIOLATION),
            _ => false,
        }
    }
}
