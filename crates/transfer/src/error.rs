//! Transfer Error Types
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.
//! Storage failures keep the storage error as a child frame; the kind carries
//! the human-readable message shown to the user when a task fails.

use derive_more::{Display, Error};
use strata_storage::error::Error as StorageError;

/// A transfer error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a failed work item.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A storage operation (listing, upload, download, delete) failed.
    #[display("{_0}")]
    Storage(#[error(not(source))] String),
    /// Reading or writing a local file failed.
    #[display("local file error: {_0}")]
    Io(#[error(not(source))] String),
    /// The task observed its cancellation token.
    #[display("cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}

/// Raise storage errors into transfer errors, keeping cancellation distinct.
pub(crate) trait StorageResultExt<T> {
    fn or_storage(self) -> Result<T>;
}
impl<T> StorageResultExt<T> for std::result::Result<T, StorageError> {
    fn or_storage(self) -> Result<T> {
        self.map_err(|err| {
            let kind = match err.is_cancelled() {
                true => ErrorKind::Cancelled,
                false => ErrorKind::Storage((*err).to_string()),
            };
            err.raise(kind)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_storage::error::ErrorKind as StorageErrorKind;

    #[test]
    fn test_storage_message_is_kept() {
        let result: std::result::Result<(), StorageError> =
            Err(exn::Exn::from(StorageErrorKind::Upload("up/a.txt".to_string())));
        let err = result.or_storage().unwrap_err();
        assert_eq!((*err).to_string(), "upload failed: up/a.txt");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancellation_is_kept() {
        let result: std::result::Result<(), StorageError> = Err(exn::Exn::from(StorageErrorKind::Cancelled));
        let err = result.or_storage().unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
    }
}
