//! Storage account and bucket traits and their implementations.
//!
//! An account ([`StorageAccount`]) is one set of credentials against one
//! provider; it hands out bucket handles. A bucket ([`StorageBucket`]) is the
//! adapter contract every backend implements: one page of listing at a time,
//! streamed uploads and downloads, batch deletes and signed links.
//!
//! Callers normally go through [`BucketExt`] which turns the single-page
//! primitive into [`PagedResult`] cursors and streams.
//!
//! # Ordering
//!
//! Within a page, directories and blobs are merged and ordered lexically
//! (byte-wise) by key. Every adapter follows this, whatever order its
//! provider returns.

#[cfg(any(test, feature = "mock"))]
mod mock;
#[cfg(any(feature = "azure", feature = "gcs"))]
mod objstore;
#[cfg(feature = "s3")]
mod s3;

#[cfg(any(test, feature = "mock"))]
pub use self::mock::{MockAccount, MockBucket};
#[cfg(any(feature = "azure", feature = "gcs"))]
pub use self::objstore::{ObjectStoreAccount, ObjectStoreBucket};
#[cfg(feature = "s3")]
pub use self::s3::{S3Account, S3Bucket};

use crate::entry::{Entry, EntryMeta, infer_content_type};
use crate::error::Result;
use crate::expand;
use crate::page::PagedResult;
use crate::progress::ProgressSink;
use crate::query::ListQuery;
use crate::{AccountHandle, BucketHandle};
use async_trait::async_trait;
use derive_more::Display;
use futures::Stream;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Cursor;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

pub type EntryStream<'a> = Pin<Box<dyn Stream<Item = Result<Entry>> + Send + 'a>>;
type BoxAsyncRead = Box<dyn AsyncRead + Send + Unpin + 'static>;

/// Which provider an account talks to.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountKind {
    #[display("AWS S3")]
    AwsS3,
    #[display("Azure Blob Storage")]
    AzureBlobStorage,
    #[display("Google Cloud Storage")]
    GoogleCloudStorage,
    #[display("In-memory")]
    Memory,
}

/// One set of credentials against one provider.
#[async_trait]
pub trait StorageAccount: Send + Sync {
    fn kind(&self) -> AccountKind;

    /// Display name of the account, used for selection and logging.
    fn name(&self) -> &str;

    /// Enumerate the buckets (containers) this account can reach.
    ///
    /// Fails with [`Connection`](crate::error::ErrorKind::Connection) on
    /// authentication or network failure. There are no partial results.
    async fn list_buckets(&self) -> Result<Vec<BucketHandle>>;
}

/// One page as returned by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Ordered lexically by key.
    pub entries: Vec<EntryMeta>,
    /// Opaque continuation token, `None` on the last page.
    pub next_token: Option<String>,
}

/// Content to be stored under one key.
pub struct BlobUpload {
    pub key: String,
    pub body: BoxAsyncRead,
    /// Exact number of bytes `body` will produce.
    pub length: u64,
    pub content_type: String,
}
impl BlobUpload {
    /// Upload with a content type inferred from `key`.
    pub fn new(key: impl Into<String>, body: impl AsyncRead + Send + Unpin + 'static, length: u64) -> Self {
        let key = key.into();
        let content_type = infer_content_type(&key);
        Self { key, body: Box::new(body), length, content_type }
    }

    /// Upload of an in-memory buffer.
    pub fn from_bytes(key: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let length = data.len() as u64;
        Self::new(key, Cursor::new(data), length)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}
impl Debug for BlobUpload {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("BlobUpload")
            .field("key", &self.key)
            .field("length", &self.length)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Adapter contract for one bucket (container).
///
/// All methods take `&self` and may be called concurrently from independent
/// tasks. Long-running calls receive a [`CancellationToken`] and fail with
/// [`Cancelled`](crate::error::ErrorKind::Cancelled) once they observe it.
#[async_trait]
pub trait StorageBucket: Send + Sync {
    /// Bucket name as known to the provider.
    fn name(&self) -> &str;

    /// Fetch one page of `query`, starting at continuation `token` (`None`
    /// for the first page).
    ///
    /// Fails with [`Listing`](crate::error::ErrorKind::Listing); nothing is
    /// cached between calls so a failed fetch can simply be repeated.
    async fn list_page(&self, query: &ListQuery, token: Option<&str>) -> Result<ListPage>;

    /// Store `upload.body` under `upload.key`, overwriting any existing blob.
    ///
    /// `progress` receives cumulative bytes sent, never decreasing. The blob
    /// only becomes visible to listings once the upload is complete. Fails
    /// with [`Upload`](crate::error::ErrorKind::Upload).
    async fn upload_blob(
        &self,
        upload: BlobUpload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Stream the blob at `key` into `target`, returning the bytes written.
    ///
    /// `progress` receives cumulative bytes received. Fails with
    /// [`Download`](crate::error::ErrorKind::Download).
    async fn download_blob(
        &self,
        key: &str,
        target: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64>;

    /// Best-effort batch delete of concrete blob keys.
    ///
    /// Keys that don't exist are not an error. Adapters split the batch to
    /// the provider's per-call limit. Fails with
    /// [`Delete`](crate::error::ErrorKind::Delete) only when a provider call
    /// itself fails; keys deleted by earlier calls stay deleted.
    async fn delete_blobs(&self, keys: &[String], cancel: &CancellationToken) -> Result<()>;

    /// Time-limited signed URL for the blob at `key`.
    async fn blob_link(&self, key: &str, lifetime: Duration) -> Result<String>;
}

impl Debug for dyn StorageBucket + Send + Sync {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StorageBucket").field("name", &self.name()).finish_non_exhaustive()
    }
}

/// Cursor and stream helpers on bucket handles.
///
/// ```
/// use futures::TryStreamExt;
/// use strata_storage::{BucketHandle, ListQuery};
/// use strata_storage::backend::BucketExt;
/// # use strata_storage::error::Result;
/// # async fn example(bucket: BucketHandle) -> Result<()> {
/// let mut page = bucket.list_entries(ListQuery::new("photos/").hierarchical(true)).await?;
/// while page.has_next_page() {
///     page = page.next_page().await?;
/// }
/// let everything = bucket.list_all_entries("photos/").await?;
/// let mut stream = bucket.list_stream(ListQuery::new(""));
/// while let Some(entry) = stream.try_next().await? {
///     println!("{}", entry.key);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait BucketExt {
    /// Fetch the first page of `query`.
    async fn list_entries(&self, query: ListQuery) -> Result<PagedResult>;

    /// Every entry of `query`, page by page, yielded as soon as each page
    /// arrives.
    fn list_stream(&self, query: ListQuery) -> EntryStream<'static>;

    /// Every blob under `prefix` (flat listing), in page order.
    async fn list_all_entries(&self, prefix: &str) -> Result<Vec<Entry>>;
}

#[async_trait]
impl BucketExt for BucketHandle {
    async fn list_entries(&self, query: ListQuery) -> Result<PagedResult> {
        PagedResult::first(self.clone(), query).await
    }

    fn list_stream(&self, query: ListQuery) -> EntryStream<'static> {
        expand::list_stream(self.clone(), query)
    }

    async fn list_all_entries(&self, prefix: &str) -> Result<Vec<Entry>> {
        expand::list_all_entries(self, prefix).await
    }
}

/// Find one of an account's buckets by name.
pub async fn find_bucket(account: &AccountHandle, name: &str) -> Result<Option<BucketHandle>> {
    let buckets = account.list_buckets().await?;
    Ok(buckets.into_iter().find(|bucket| bucket.name() == name))
}

/// Sort a page's entries into the shared lexical order.
pub(crate) fn sort_entries(entries: &mut [EntryMeta]) {
    entries.sort_by(|a, b| a.key.as_bytes().cmp(b.key.as_bytes()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::BlobMeta;
    use tokio::io::AsyncReadExt;

    #[test]
    fn test_sort_merges_directories_and_blobs() {
        let mut entries = vec![
            EntryMeta::blob("c.txt", BlobMeta::inferred("c.txt", 1)),
            EntryMeta::directory("a/"),
            EntryMeta::blob("B.txt", BlobMeta::inferred("B.txt", 1)),
            EntryMeta::blob("b.txt", BlobMeta::inferred("b.txt", 1)),
        ];
        sort_entries(&mut entries);
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        // Byte-wise: uppercase sorts before lowercase.
        assert_eq!(keys, ["B.txt", "a/", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn test_blob_upload_from_bytes() {
        let mut upload = BlobUpload::from_bytes("up/a.json", b"{}".to_vec());
        assert_eq!(upload.length, 2);
        assert_eq!(upload.content_type, "application/json");
        let mut body = Vec::new();
        upload.body.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"{}");
    }

    #[test]
    fn test_bucket_handle_debug() {
        let bucket: BucketHandle = std::sync::Arc::new(MockBucket::default().with_name("photos"));
        assert_eq!(format!("{bucket:?}"), r#"StorageBucket { name: "photos", .. }"#);
    }

    #[test]
    fn test_account_kind_display() {
        assert_eq!(AccountKind::AzureBlobStorage.to_string(), "Azure Blob Storage");
    }
}
