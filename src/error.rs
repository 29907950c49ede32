use thiserror::Error;

/// Errors surfaced by [`FollowStore`](crate::FollowStore) operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The target (or kind) was never registered in the
    /// [target registry](crate::TargetRegistry).
    #[error("target kind is not registered")]
    UnregisteredKind,
    /// The request itself is malformed, e.g. an anonymous caller
    /// trying to create a follow record.
    #[error("invalid follow request")]
    Validation,
    /// A persisted row could not be turned back into a target.
    #[error("follow record is invalid")]
    InvalidRecord,
    /// The underlying datastore failed.
    #[error("datastore operation failed")]
    Datastore,
}

/// Lazily typed [`std::result::Result`] but the error generic
/// is filled up with [a follow error](Error).
pub type Result<T> = error_stack::Result<T, Error>;

/// Saves a `downcast_ref` dance when checking what went wrong:
///
/// ```rust,ignore
/// if let Err(report) = store.create(&viewer, &target).await {
///   if report.is_unregistered_kind() {
///     ...
///   }
/// }
/// ```
pub trait ErrorExt {
    fn is_unregistered_kind(&self) -> bool;
    fn is_validation(&self) -> bool;
}

impl ErrorExt for error_stack::Report<Error> {
    fn is_unregistered_kind(&self) -> bool {
        matches!(self.current_context(), Error::UnregisteredKind)
    }

    fn is_validation(&self) -> bool {
        matches!(self.current_context(), Error::Validation)
    }
}
