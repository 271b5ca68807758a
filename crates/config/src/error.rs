//! Configuration Error Types
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Loading or merging the settings layers failed.
    #[display("could not load settings")]
    Settings,
    /// Settings loaded, but a value is out of range.
    #[display("invalid setting: {_0}")]
    InvalidSettings(#[error(not(source))] String),
    /// The secret store could not be read or written.
    #[display("secret store error: {_0}")]
    Secret(#[error(not(source))] String),
    /// Saved accounts could not be encoded or decoded.
    #[display("could not serialize saved accounts")]
    Serialization,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The OS keyring can be locked or briefly unavailable.
        matches!(self, Self::Secret(_))
    }
}
