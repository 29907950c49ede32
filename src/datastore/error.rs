use error_stack::Report;
use thiserror::Error;

/// Datastore related errors
#[derive(Debug, Error)]
pub enum Error {
    /// An error caused by an invalid Postgres connection url.
    #[error("invalid connection url")]
    InvalidUrl,
    /// An error caused by an [`sqlx`] error.
    #[error("received a database error: {0}")]
    Internal(sqlx::Error),
    /// The database is currently in read mode (most likely due
    /// to maintenance) and should not perform any writes.
    #[error("database is currently in read mode")]
    Readonly,
    /// The database pool does not have a reliable connection
    /// to transact to the database.
    #[error("unhealthy database pool")]
    UnhealthyPool,
    /// No more record ids can be handed out.
    #[error("ran out of follow record ids")]
    Exhausted,
    /// A row does not carry one cell per registered slot.
    #[error("expected {expected} slot values, got {actual}")]
    SlotCount { expected: usize, actual: usize },
}

/// Converts from a generic [sqlx] result into a [datastore compatible error](Error).
pub trait ErrorExt<T> {
    fn into_db_error(self) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, sqlx::Error> {
    fn into_db_error(self) -> Result<T> {
        self.map_err(|e| match &e {
            sqlx::Error::Database(err) if err.message().ends_with("read-only transaction") => {
                Report::new(e).change_context(Error::Readonly)
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Report::new(e).change_context(Error::UnhealthyPool)
            }
            _ => Report::new(Error::Internal(e)),
        })
    }
}

/// Lazily typed [`std::result::Result`] but the error generic
/// is filled up with [a datastore error](Error).
pub type Result<T> = error_stack::Result<T, Error>;

pub trait ReportExt {
    fn is_unhealthy(&self) -> bool;
    fn is_readonly(&self) -> bool;
}

impl ReportExt for Report<Error> {
    fn is_unhealthy(&self) -> bool {
        matches!(self.current_context(), Error::UnhealthyPool)
    }

    fn is_readonly(&self) -> bool {
        matches!(self.current_context(), Error::Readonly)
    }
}
