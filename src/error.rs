//! Command Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("{_0}")]
    Config(#[error(not(source))] String),
    #[display("{_0}")]
    Storage(#[error(not(source))] String),
    #[display("no saved account named '{_0}'")]
    UnknownAccount(#[error(not(source))] String),
    #[display("account has no bucket named '{_0}'")]
    UnknownBucket(#[error(not(source))] String),
    #[display("no blob or directory at '{_0}'")]
    UnknownKey(#[error(not(source))] String),
    #[display("{_0}")]
    Input(#[error(not(source))] String),
    #[display("{_0}")]
    Transfer(#[error(not(source))] String),
    #[display("cancelled")]
    Cancelled,
}

/// Raise library errors into command errors, keeping their message.
pub trait RaiseExt<T> {
    fn or_command(self, kind: fn(String) -> ErrorKind) -> Result<T>;
}
impl<T, K> RaiseExt<T> for std::result::Result<T, exn::Exn<K>>
where
    K: std::error::Error + Send + Sync + 'static,
{
    fn or_command(self, kind: fn(String) -> ErrorKind) -> Result<T> {
        self.map_err(|err| {
            let message = (*err).to_string();
            err.raise(kind(message))
        })
    }
}
