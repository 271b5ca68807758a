//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Backend SDK errors are never exposed
//! directly: they are raised into one of the [`ErrorKind`] categories below
//! and kept as a child frame of the error tree.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Authentication or network failure while connecting to an account or
    /// listing its buckets. Surfaced to the user, never retried automatically.
    #[display("could not connect to storage account")]
    Connection,
    /// A single page fetch failed. The cursor that requested the page is left
    /// untouched, so the same fetch can be attempted again.
    #[display("listing failed")]
    Listing,
    /// [`next_page()`](crate::PagedResult::next_page) was called on the last page.
    #[display("there is no next page")]
    NoNextPage,
    /// Uploading the blob with this key failed.
    #[display("upload failed: {_0}")]
    Upload(#[error(not(source))] String),
    /// Downloading the blob with this key failed.
    #[display("download failed: {_0}")]
    Download(#[error(not(source))] String),
    /// The batch delete call itself failed. No per-key outcome is reported.
    #[display("delete failed")]
    Delete,
    /// A signed link could not be generated for the blob with this key.
    #[display("link generation failed: {_0}")]
    Link(#[error(not(source))] String),
    /// The operation observed its cancellation token. A benign stop.
    #[display("operation cancelled")]
    Cancelled,
    /// A blob-only operation was attempted on a directory entry.
    #[display("not a blob: {_0}")]
    NotABlob(#[error(not(source))] String),
    /// Key is empty, escapes its root, or contains invalid characters.
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    #[display("invalid list query: {_0}")]
    InvalidQuery(#[error(not(source))] String),
    /// Credential record is incomplete or malformed.
    #[display("invalid credential: {_0}")]
    InvalidCredential(#[error(not(source))] String),
    /// The backend needed for this operation was not compiled in.
    #[display("unsupported backend: {_0}")]
    Unsupported(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Listing | Self::Upload(_) | Self::Download(_) | Self::Delete | Self::Io(_)
        )
    }

    /// Returns `true` for user-initiated stops, which should be reported as
    /// such rather than as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
