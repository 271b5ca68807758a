//! Entry model.
//!
//! Listings produce two layers of types:
//! - [`EntryMeta`] is what a backend adapter knows about one node: its key and
//!   whether it is a directory or a blob (plus blob metadata). Adapters build
//!   these without knowing which handle they are reachable through.
//! - [`Entry`] pairs that metadata with the [`BucketHandle`] it was listed
//!   from, which is all that's needed to download or link the node later.
//!   It derefs to [`EntryMeta`].

use crate::error::{ErrorKind, Result};
use crate::key;
use crate::progress::ProgressSink;
use crate::BucketHandle;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::ops::Deref;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Metadata of a leaf object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub content_type: String,
    /// `true` when the content type was guessed from the key's extension
    /// rather than reported by the backend.
    pub content_type_is_inferred: bool,
    /// Size in bytes.
    pub length: u64,
    /// Absent for backends that don't report it in listings.
    pub last_modified: Option<OffsetDateTime>,
    /// Storage class / access tier, backend-defined.
    pub tier: Option<String>,
}
impl BlobMeta {
    /// Blob metadata with a content type inferred from `key`.
    pub fn inferred(key: &str, length: u64) -> Self {
        Self {
            content_type: infer_content_type(key),
            content_type_is_inferred: true,
            length,
            last_modified: None,
            tier: None,
        }
    }

    /// Replace the inferred content type with one reported by the backend.
    /// Empty values are ignored.
    pub fn with_content_type(mut self, content_type: Option<impl Into<String>>) -> Self {
        if let Some(content_type) = content_type.map(Into::into)
            && !content_type.is_empty()
        {
            // Drop parameters such as `; charset=utf-8`.
            let essence = content_type.split(';').next().unwrap_or_default().trim().to_string();
            self.content_type = essence;
            self.content_type_is_inferred = false;
        }
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<OffsetDateTime>) -> Self {
        self.last_modified = last_modified;
        self
    }

    pub fn with_tier(mut self, tier: Option<impl Into<String>>) -> Self {
        self.tier = tier.map(Into::into);
        self
    }
}

/// Guess a MIME type from a key's extension.
pub fn infer_content_type(key: &str) -> String {
    mime_guess::from_path(key).first_or_octet_stream().essence_str().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A logical directory: a shared key prefix ending in the delimiter.
    Directory,
    Blob(BlobMeta),
}

/// What a backend knows about one listed node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Full key, relative to the bucket root.
    pub key: String,
    pub kind: EntryKind,
}
impl EntryMeta {
    pub fn directory(key: impl Into<String>) -> Self {
        Self { key: key.into(), kind: EntryKind::Directory }
    }

    pub fn blob(key: impl Into<String>, meta: BlobMeta) -> Self {
        Self { key: key.into(), kind: EntryKind::Blob(meta) }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// Blob metadata, `None` for directories.
    pub fn blob_meta(&self) -> Option<&BlobMeta> {
        match &self.kind {
            EntryKind::Blob(meta) => Some(meta),
            EntryKind::Directory => None,
        }
    }

    /// Size in bytes; directories count as zero.
    pub fn length(&self) -> u64 {
        self.blob_meta().map(|meta| meta.length).unwrap_or(0)
    }

    /// Last key segment, see [`key::display_name`].
    pub fn display_name(&self) -> &str {
        key::display_name(&self.key)
    }
}

/// One browsable node, as returned by a listing.
#[derive(Clone)]
pub struct Entry {
    meta: EntryMeta,
    bucket: BucketHandle,
}
impl Entry {
    pub fn new(bucket: BucketHandle, meta: EntryMeta) -> Self {
        Self { meta, bucket }
    }

    pub fn bucket(&self) -> &BucketHandle {
        &self.bucket
    }

    // Explicit version of self.deref()
    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    pub fn into_meta(self) -> EntryMeta {
        self.meta
    }

    /// Stream this blob's content into `target`, returning the number of
    /// bytes written.
    ///
    /// Fails with [`NotABlob`](ErrorKind::NotABlob) for directories.
    pub async fn download_to(
        &self,
        target: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.require_blob()?;
        self.bucket.download_blob(&self.meta.key, target, progress, cancel).await
    }

    /// Time-limited signed URL for this blob.
    ///
    /// Fails with [`NotABlob`](ErrorKind::NotABlob) for directories.
    pub async fn link(&self, lifetime: Duration) -> Result<String> {
        self.require_blob()?;
        self.bucket.blob_link(&self.meta.key, lifetime).await
    }

    fn require_blob(&self) -> Result<&BlobMeta> {
        match self.meta.blob_meta() {
            Some(meta) => Ok(meta),
            None => exn::bail!(ErrorKind::NotABlob(self.meta.key.clone())),
        }
    }
}
impl Deref for Entry {
    type Target = EntryMeta;
    fn deref(&self) -> &EntryMeta {
        &self.meta
    }
}
impl Debug for Entry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Entry").field("bucket", &self.bucket.name()).field("meta", &self.meta).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("b.txt", "text/plain")]
    #[case("photos/cat.JPG", "image/jpeg")]
    #[case("archive.tar.gz", "application/gzip")]
    #[case("no-extension", "application/octet-stream")]
    fn test_infer_content_type(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(infer_content_type(key), expected);
    }

    #[test]
    fn test_reported_content_type_wins() {
        let meta = BlobMeta::inferred("page.html", 10).with_content_type(Some("text/html; charset=utf-8"));
        assert_eq!(meta.content_type, "text/html");
        assert!(!meta.content_type_is_inferred);
        let meta = BlobMeta::inferred("page.html", 10).with_content_type(Some(""));
        assert!(meta.content_type_is_inferred);
    }

    #[test]
    fn test_directories_have_no_length() {
        let dir = EntryMeta::directory("a/");
        assert!(dir.is_directory());
        assert_eq!(dir.length(), 0);
        assert_eq!(dir.display_name(), "a/");
        let blob = EntryMeta::blob("a/b.txt", BlobMeta::inferred("a/b.txt", 42));
        assert!(!blob.is_directory());
        assert_eq!(blob.length(), 42);
        assert_eq!(blob.display_name(), "b.txt");
    }
}
