//! In-memory storage account and bucket for testing.

use super::{AccountKind, BlobUpload, ListPage, StorageAccount, StorageBucket, sort_entries};
use crate::entry::{BlobMeta, EntryMeta};
use crate::error::{ErrorKind, Result};
use crate::key::DELIMITER;
use crate::progress::ProgressSink;
use crate::query::ListQuery;
use crate::BucketHandle;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Transfers move data in chunks of this size unless configured otherwise.
const DEFAULT_CHUNK_SIZE: usize = 4;

type DownloadHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Vec<u8>,
    content_type: String,
    modified: OffsetDateTime,
}

/// In-memory bucket for testing.
///
/// Blobs are stored in a [`BTreeMap`] behind a [`RwLock`], so listings come
/// out in key order for free. On top of plain storage the mock records the
/// calls made against it and can be told to fail, which makes it the
/// workhorse for testing everything above the adapter layer.
pub struct MockBucket {
    name: String,
    storage: RwLock<BTreeMap<String, StoredBlob>>,
    chunk_size: usize,
    uploads: Mutex<Vec<String>>,
    delete_calls: Mutex<Vec<Vec<String>>>,
    fail_next_listing: AtomicBool,
    fail_deletes: AtomicBool,
    failing_uploads: Mutex<HashSet<String>>,
    download_hooks: Mutex<HashMap<String, DownloadHook>>,
}

impl MockBucket {
    /// Create a mock bucket pre-populated with blobs.
    ///
    /// Panics on an empty key. If test setup is wrong, then the test should
    /// not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut map = BTreeMap::new();
        for (key, data) in files {
            let key = key.into();
            if key.is_empty() {
                panic!("MockBucket::with_files: empty key");
            }
            let content_type = crate::entry::infer_content_type(&key);
            map.insert(key, StoredBlob { data: data.into(), content_type, modified: now });
        }
        Self {
            name: "mock".to_string(),
            storage: RwLock::new(map),
            chunk_size: DEFAULT_CHUNK_SIZE,
            uploads: Mutex::default(),
            delete_calls: Mutex::default(),
            fail_next_listing: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            failing_uploads: Mutex::default(),
            download_hooks: Mutex::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of bytes moved between two progress reports.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Store a blob directly, bypassing upload bookkeeping.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let key = key.into();
        let content_type = crate::entry::infer_content_type(&key);
        let blob = StoredBlob { data: data.into(), content_type, modified: OffsetDateTime::now_utc() };
        self.storage.write().await.insert(key, blob);
    }

    /// Content of the blob at `key`.
    pub async fn contents(&self, key: &str) -> Option<Vec<u8>> {
        self.storage.read().await.get(key).map(|blob| blob.data.clone())
    }

    /// Content type the blob at `key` was stored with.
    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.storage.read().await.get(key).map(|blob| blob.content_type.clone())
    }

    /// Every stored key, in order.
    pub async fn keys(&self) -> Vec<String> {
        self.storage.read().await.keys().cloned().collect()
    }

    /// Keys of completed uploads, in completion order.
    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().map(|uploads| uploads.clone()).unwrap_or_default()
    }

    /// Arguments of every `delete_blobs` call that reached the bucket.
    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.delete_calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Make the next listing call fail with [`Listing`](ErrorKind::Listing).
    pub fn fail_next_listing(&self) {
        self.fail_next_listing.store(true, Ordering::Release);
    }

    /// Make every delete call fail with [`Delete`](ErrorKind::Delete).
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::Release);
    }

    /// Make uploads to `key` fail with [`Upload`](ErrorKind::Upload).
    pub fn fail_upload(&self, key: impl Into<String>) {
        if let Ok(mut failing) = self.failing_uploads.lock() {
            failing.insert(key.into());
        }
    }

    /// Run `hook` when a download of `key` starts, before any data moves.
    pub fn on_download(&self, key: impl Into<String>, hook: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut hooks) = self.download_hooks.lock() {
            hooks.insert(key.into(), Box::new(hook));
        }
    }

    fn entry_meta(key: &str, blob: &StoredBlob) -> EntryMeta {
        let meta = BlobMeta::inferred(key, blob.data.len() as u64)
            .with_content_type(Some(blob.content_type.as_str()))
            .with_last_modified(Some(blob.modified));
        EntryMeta::blob(key, meta)
    }

    fn upload_fails(&self, key: &str) -> bool {
        self.failing_uploads.lock().map(|failing| failing.contains(key)).unwrap_or(false)
    }

    fn run_download_hook(&self, key: &str) {
        if let Ok(hooks) = self.download_hooks.lock()
            && let Some(hook) = hooks.get(key)
        {
            hook();
        }
    }
}
impl Default for MockBucket {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBucket for MockBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(&self, query: &ListQuery, token: Option<&str>) -> Result<ListPage> {
        if self.fail_next_listing.swap(false, Ordering::AcqRel) {
            exn::bail!(ErrorKind::Listing);
        }
        let prefix = query.prefix();
        let mut entries = Vec::new();
        {
            let guard = self.storage.read().await;
            let mut directories = BTreeSet::new();
            let matching = guard.range(prefix.to_string()..).take_while(|(key, _)| key.starts_with(prefix));
            for (key, blob) in matching {
                let rest = &key[prefix.len()..];
                match (query.is_hierarchical(), rest.find(DELIMITER)) {
                    // Marker for the listed directory itself.
                    (_, _) if rest.is_empty() && key.ends_with(DELIMITER) => {},
                    (true, Some(index)) => {
                        directories.insert(format!("{prefix}{}", &rest[..=index]));
                    },
                    (false, _) if key.ends_with(DELIMITER) => entries.push(EntryMeta::directory(key.clone())),
                    _ => entries.push(Self::entry_meta(key, blob)),
                }
            }
            entries.extend(directories.into_iter().map(EntryMeta::directory));
        }
        sort_entries(&mut entries);

        let mut remaining = entries.into_iter().filter(|entry| token.is_none_or(|after| entry.key.as_str() > after));
        let page: Vec<EntryMeta> = remaining.by_ref().take(query.page_size()).collect();
        let next_token = match remaining.next() {
            Some(_) => page.last().map(|entry| entry.key.clone()),
            None => None,
        };
        Ok(ListPage { entries: page, next_token })
    }

    async fn upload_blob(
        &self,
        mut upload: BlobUpload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        if self.upload_fails(&upload.key) {
            exn::bail!(ErrorKind::Upload(upload.key));
        }
        let mut data = Vec::with_capacity(upload.length as usize);
        let mut chunk = vec![0; self.chunk_size];
        progress.report(0);
        loop {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            let read = upload.body.read(&mut chunk).await.map_err(|err| exn::Exn::from(ErrorKind::Io(err)))?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            progress.report(data.len() as u64);
        }
        let blob = StoredBlob { data, content_type: upload.content_type, modified: OffsetDateTime::now_utc() };
        self.storage.write().await.insert(upload.key.clone(), blob);
        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(upload.key);
        }
        Ok(())
    }

    async fn download_blob(
        &self,
        key: &str,
        target: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.run_download_hook(key);
        let data = self.contents(key).await.ok_or_else(|| exn::Exn::from(ErrorKind::Download(key.to_string())))?;
        let mut written = 0;
        progress.report(0);
        for chunk in data.chunks(self.chunk_size) {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            target.write_all(chunk).await.map_err(|err| exn::Exn::from(ErrorKind::Io(err)))?;
            written += chunk.len() as u64;
            progress.report(written);
        }
        target.flush().await.map_err(|err| exn::Exn::from(ErrorKind::Io(err)))?;
        Ok(written)
    }

    async fn delete_blobs(&self, keys: &[String], cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        if self.fail_deletes.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Delete);
        }
        if let Ok(mut calls) = self.delete_calls.lock() {
            calls.push(keys.to_vec());
        }
        let mut guard = self.storage.write().await;
        for key in keys {
            // Missing keys are fine.
            guard.remove(key);
        }
        Ok(())
    }

    async fn blob_link(&self, key: &str, lifetime: Duration) -> Result<String> {
        if !self.storage.read().await.contains_key(key) {
            exn::bail!(ErrorKind::Link(key.to_string()));
        }
        Ok(format!("memory://{}/{key}?expires_in={}", self.name, lifetime.as_secs()))
    }
}

/// In-memory account holding a fixed set of mock buckets.
pub struct MockAccount {
    name: String,
    buckets: Vec<Arc<MockBucket>>,
    fail_connection: AtomicBool,
}
impl MockAccount {
    pub fn new(name: impl Into<String>, buckets: impl IntoIterator<Item = Arc<MockBucket>>) -> Self {
        Self {
            name: name.into(),
            buckets: buckets.into_iter().collect(),
            fail_connection: AtomicBool::new(false),
        }
    }

    /// Make every `list_buckets` call fail with [`Connection`](ErrorKind::Connection).
    pub fn fail_connection(&self) {
        self.fail_connection.store(true, Ordering::Release);
    }
}

#[async_trait]
impl StorageAccount for MockAccount {
    fn kind(&self) -> AccountKind {
        AccountKind::Memory
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_buckets(&self) -> Result<Vec<BucketHandle>> {
        if self.fail_connection.load(Ordering::Acquire) {
            exn::bail!(ErrorKind::Connection);
        }
        Ok(self.buckets.iter().map(|bucket| bucket.clone() as BucketHandle).collect())
    }
}
