//! Azure Blob Storage and Google Cloud Storage backends.
//!
//! Both providers are reached through the `object_store` crate, so a single
//! adapter serves them: [`ObjectStoreBucket`] wraps any
//! [`ObjectStore`](object_store::ObjectStore) (plus an optional
//! [`Signer`](object_store::signer::Signer) for links).
//!
//! # Pagination
//!
//! `object_store` has no continuation tokens of its own. The token handed out
//! here is the last key of the previous page, and the next page starts
//! strictly after it: flat pages via `list_with_offset`, hierarchical pages
//! by filtering a delimited listing.
//!
//! Pages come in the store's own order, which is lexical by path for both
//! providers; entries within a page are then sorted into the shared order.
//!
//! # Keys
//!
//! `object_store` percent-encodes characters such as `%`, `#` or `[` inside a
//! [`Path`]. Keys handed in are encoded with `Path::from`, and listed paths
//! are decoded segment by segment, so a listed key can be passed straight
//! back to any other call.
//!
//! # Prefixes
//!
//! `object_store` matches prefixes by whole path segments, whereas listings
//! here match raw string prefixes (`photos/ca` finds `photos/cat.jpg`). The
//! adapter lists the prefix's parent directory and filters.

use super::{AccountKind, BlobUpload, ListPage, StorageAccount, StorageBucket, sort_entries};
use crate::entry::{BlobMeta, EntryMeta};
use crate::error::{ErrorKind, Result};
use crate::key::DELIMITER;
use crate::progress::{Monotonic, ProgressSink};
use crate::query::ListQuery;
use crate::BucketHandle;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::{StreamExt, TryStreamExt, stream};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectMeta, ObjectStore, PutMultipartOptions, PutOptions, PutPayload,
    WriteMultipart,
};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Blobs larger than this are uploaded in parts of this size.
const DEFAULT_PART_SIZE: usize = 8 * 1024 * 1024;
/// Parts in flight at once during a multipart upload.
const MAX_CONCURRENT_PARTS: usize = 4;

/// Bucket (container) reached through an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStoreBucket {
    name: String,
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    part_size: usize,
}

impl ObjectStoreBucket {
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            store,
            signer: None,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Signer used for [`blob_link()`](StorageBucket::blob_link). Without one
    /// link generation fails.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Part size for multipart uploads, also the single-put threshold.
    pub fn with_part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size.max(1);
        self
    }

    /// Fetch the first listing page to check that the bucket is reachable
    /// with the configured credentials.
    async fn probe(&self) -> Result<()> {
        let mut listing = self.store.list(None);
        match listing.next().await {
            Some(Err(err)) => Err(err).or_raise(|| ErrorKind::Connection),
            _ => Ok(()),
        }
    }

    fn entry_meta(meta: &ObjectMeta) -> EntryMeta {
        let key = object_key(&meta.location);
        let last_modified = meta
            .last_modified
            .timestamp_nanos_opt()
            .and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).ok());
        let blob = BlobMeta::inferred(&key, meta.size).with_last_modified(last_modified);
        EntryMeta::blob(key, blob)
    }

    async fn list_flat(&self, query: &ListQuery, token: Option<&str>) -> Result<ListPage> {
        let prefix = query.prefix();
        let parent = listing_parent(prefix);
        let mut stream = match token {
            Some(token) => self.store.list_with_offset(parent.as_ref(), &Path::from(token)),
            None => self.store.list(parent.as_ref()),
        };
        // The store yields paths in lexical order, so the page boundary is the
        // last key taken in that order, before the page itself is sorted.
        let mut entries = Vec::with_capacity(query.page_size());
        let mut last_key = None;
        let mut has_more = false;
        while let Some(meta) = stream.try_next().await.or_raise(|| ErrorKind::Listing)? {
            let entry = Self::entry_meta(&meta);
            if !entry.key.starts_with(prefix) {
                continue;
            }
            if entries.len() == query.page_size() {
                has_more = true;
                break;
            }
            last_key = Some(entry.key.clone());
            entries.push(entry);
        }
        sort_entries(&mut entries);
        let next_token = match has_more {
            true => last_key,
            false => None,
        };
        Ok(ListPage { entries, next_token })
    }

    async fn list_hierarchical(&self, query: &ListQuery, token: Option<&str>) -> Result<ListPage> {
        let prefix = query.prefix();
        let parent = listing_parent(prefix);
        let listing = self.store.list_with_delimiter(parent.as_ref()).await.or_raise(|| ErrorKind::Listing)?;
        let directories = listing
            .common_prefixes
            .iter()
            .map(|path| EntryMeta::directory(format!("{}{DELIMITER}", object_key(path))));
        let blobs = listing.objects.iter().map(Self::entry_meta);
        let mut entries: Vec<EntryMeta> = directories
            .chain(blobs)
            .filter(|entry| entry.key.starts_with(prefix) && entry.key != prefix)
            .collect();
        sort_entries(&mut entries);
        Ok(paginate(entries, token, query.page_size()))
    }

    async fn upload_single(
        &self,
        path: &Path,
        upload: &mut BlobUpload,
        attributes: Attributes,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut data = Vec::with_capacity(upload.length as usize);
        upload.body.read_to_end(&mut data).await.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
        let options = PutOptions { attributes, ..Default::default() };
        let put = self.store.put_opts(path, PutPayload::from(data), options);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            result = put => {
                result.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
            },
        }
        progress.report(upload.length);
        Ok(())
    }

    async fn upload_multipart(
        &self,
        path: &Path,
        upload: &mut BlobUpload,
        attributes: Attributes,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let options = PutMultipartOptions { attributes, ..Default::default() };
        let multipart =
            self.store.put_multipart_opts(path, options).await.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
        let mut writer = WriteMultipart::new_with_chunk_size(multipart, self.part_size);
        let mut buffer = vec![0; self.part_size];
        let mut sent = 0;
        let result: Result<()> = async {
            loop {
                if cancel.is_cancelled() {
                    exn::bail!(ErrorKind::Cancelled);
                }
                let read = read_chunk(&mut upload.body, &mut buffer)
                    .await
                    .or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
                if read == 0 {
                    return Ok(());
                }
                writer
                    .wait_for_capacity(MAX_CONCURRENT_PARTS)
                    .await
                    .or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
                writer.write(&buffer[..read]);
                sent += read as u64;
                progress.report(sent);
            }
        }
        .await;
        match result {
            Ok(()) => {
                writer.finish().await.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
                Ok(())
            },
            Err(err) => {
                if let Err(abort) = writer.abort().await {
                    tracing::warn!(key = %upload.key, error = %abort, "failed to abort multipart upload");
                }
                Err(err)
            },
        }
    }
}

#[async_trait]
impl StorageBucket for ObjectStoreBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(&self, query: &ListQuery, token: Option<&str>) -> Result<ListPage> {
        match query.is_hierarchical() {
            true => self.list_hierarchical(query, token).await,
            false => self.list_flat(query, token).await,
        }
    }

    async fn upload_blob(
        &self,
        mut upload: BlobUpload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = Path::from(upload.key.as_str());
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, AttributeValue::from(upload.content_type.clone()));
        let progress = Monotonic::new(progress);
        progress.report(0);
        tracing::debug!(bucket = %self.name, key = %upload.key, length = upload.length, "uploading blob");
        match upload.length as usize <= self.part_size {
            true => self.upload_single(&path, &mut upload, attributes, &progress, cancel).await,
            false => self.upload_multipart(&path, &mut upload, attributes, &progress, cancel).await,
        }
    }

    async fn download_blob(
        &self,
        key: &str,
        target: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let path = Path::from(key);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            result = self.store.get(&path) => result.or_raise(|| ErrorKind::Download(key.to_string()))?,
        };
        let mut stream = result.into_stream();
        let mut written = 0;
        progress.report(0);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
                chunk = stream.try_next() => chunk.or_raise(|| ErrorKind::Download(key.to_string()))?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            target.write_all(&chunk).await.or_raise(|| ErrorKind::Download(key.to_string()))?;
            written += chunk.len() as u64;
            progress.report(written);
        }
        target.flush().await.or_raise(|| ErrorKind::Download(key.to_string()))?;
        Ok(written)
    }

    async fn delete_blobs(&self, keys: &[String], cancel: &CancellationToken) -> Result<()> {
        let locations = stream::iter(keys.iter().map(|key| Ok(Path::from(key.as_str())))).boxed();
        let mut results = self.store.delete_stream(locations);
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
                result = results.next() => result,
            };
            match result {
                None => break,
                Some(Ok(_)) | Some(Err(object_store::Error::NotFound { .. })) => {},
                Some(Err(err)) => return Err(err).or_raise(|| ErrorKind::Delete),
            }
        }
        Ok(())
    }

    async fn blob_link(&self, key: &str, lifetime: Duration) -> Result<String> {
        let signer = self.signer.as_ref().ok_or_raise(|| ErrorKind::Link(key.to_string()))?;
        let url = signer
            .signed_url(http::Method::GET, &Path::from(key), lifetime)
            .await
            .or_raise(|| ErrorKind::Link(key.to_string()))?;
        Ok(url.to_string())
    }
}

/// Account holding a fixed list of object-store buckets.
///
/// Containers can't be enumerated through `object_store`, so the list comes
/// from the credential. [`list_buckets()`](StorageAccount::list_buckets)
/// still reaches out to every one of them, so bad credentials or an
/// unreachable endpoint fail there.
pub struct ObjectStoreAccount {
    name: String,
    kind: AccountKind,
    buckets: Vec<Arc<ObjectStoreBucket>>,
}

impl ObjectStoreAccount {
    pub fn new(name: impl Into<String>, kind: AccountKind, buckets: Vec<ObjectStoreBucket>) -> Self {
        Self { name: name.into(), kind, buckets: buckets.into_iter().map(Arc::new).collect() }
    }

    /// Azure storage account exposing `containers`.
    #[cfg(feature = "azure")]
    pub fn azure(
        name: impl Into<String>,
        connection: &crate::credential::AzureConnection,
        containers: &[String],
    ) -> Result<Self> {
        use object_store::azure::MicrosoftAzureBuilder;

        let mut buckets = Vec::with_capacity(containers.len());
        for container in containers {
            let mut builder = MicrosoftAzureBuilder::new()
                .with_container_name(container)
                .with_allow_http(connection.allow_http);
            builder = match connection.use_emulator {
                true => builder.with_use_emulator(true),
                false => builder.with_account(&connection.account_name).with_access_key(&connection.account_key),
            };
            if let Some(endpoint) = &connection.blob_endpoint {
                builder = builder.with_endpoint(endpoint.clone());
            }
            let store = Arc::new(builder.build().or_raise(|| {
                ErrorKind::InvalidCredential(format!("cannot configure Azure container '{container}'"))
            })?);
            buckets.push(ObjectStoreBucket::new(container, store.clone()).with_signer(store));
        }
        Ok(Self::new(name, AccountKind::AzureBlobStorage, buckets))
    }

    /// Google Cloud account exposing `buckets`.
    #[cfg(feature = "gcs")]
    pub fn gcs(name: impl Into<String>, service_account: &str, buckets: &[String]) -> Result<Self> {
        use object_store::gcp::GoogleCloudStorageBuilder;

        let mut handles = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let store = GoogleCloudStorageBuilder::new()
                .with_service_account_key(service_account)
                .with_bucket_name(bucket)
                .build()
                .or_raise(|| ErrorKind::InvalidCredential(format!("cannot configure GCS bucket '{bucket}'")))?;
            let store = Arc::new(store);
            handles.push(ObjectStoreBucket::new(bucket, store.clone()).with_signer(store));
        }
        Ok(Self::new(name, AccountKind::GoogleCloudStorage, handles))
    }
}

#[async_trait]
impl StorageAccount for ObjectStoreAccount {
    fn kind(&self) -> AccountKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_buckets(&self) -> Result<Vec<BucketHandle>> {
        let mut buckets: Vec<BucketHandle> = Vec::with_capacity(self.buckets.len());
        for bucket in &self.buckets {
            tracing::debug!(account = %self.name, bucket = %bucket.name, "checking bucket");
            bucket.probe().await?;
            buckets.push(bucket.clone());
        }
        Ok(buckets)
    }
}

/// Directory to hand to `object_store` for a raw string prefix: the prefix
/// itself when it ends in the delimiter, else its parent. `None` is the root.
fn listing_parent(prefix: &str) -> Option<Path> {
    let directory = match prefix.ends_with(DELIMITER) {
        true => prefix,
        false => prefix.rfind(DELIMITER).map(|index| &prefix[..=index]).unwrap_or_default(),
    };
    match directory.trim_matches(DELIMITER) {
        "" => None,
        directory => Some(Path::from(directory)),
    }
}

/// Raw key of a listed path, undoing the store's per-segment encoding.
fn object_key(location: &Path) -> String {
    let mut key = String::with_capacity(location.as_ref().len());
    for (index, part) in location.parts().enumerate() {
        if index > 0 {
            key.push(DELIMITER);
        }
        let part = part.as_ref();
        key.push_str(&urlencoding::decode(part).unwrap_or(Cow::Borrowed(part)));
    }
    key
}

/// Slice an ordered listing into the page that starts after `token`.
fn paginate(entries: Vec<EntryMeta>, token: Option<&str>, page_size: usize) -> ListPage {
    let mut remaining = entries.into_iter().filter(|entry| token.is_none_or(|after| entry.key.as_str() > after));
    let page: Vec<EntryMeta> = remaining.by_ref().take(page_size).collect();
    let next_token = match remaining.next() {
        Some(_) => page.last().map(|entry| entry.key.clone()),
        None => None,
    };
    ListPage { entries: page, next_token }
}

/// Fill `buffer` from `reader`, stopping early only at end of input.
async fn read_chunk(reader: &mut (dyn AsyncRead + Send + Unpin), buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use futures::stream::BoxStream;
    use object_store::memory::InMemory;
    use object_store::{GetOptions, GetResult, ListResult, MultipartUpload, PutResult};
    use rstest::rstest;
    use std::sync::Mutex;

    /// Store whose every call fails, like one behind a dead endpoint.
    #[derive(Debug)]
    struct Unreachable;

    impl std::fmt::Display for Unreachable {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "Unreachable")
        }
    }

    fn refused() -> object_store::Error {
        object_store::Error::Generic { store: "Unreachable", source: "connection refused".into() }
    }

    #[async_trait]
    impl ObjectStore for Unreachable {
        async fn put_opts(&self, _: &Path, _: PutPayload, _: PutOptions) -> object_store::Result<PutResult> {
            Err(refused())
        }

        async fn put_multipart_opts(
            &self,
            _: &Path,
            _: PutMultipartOptions,
        ) -> object_store::Result<Box<dyn MultipartUpload>> {
            Err(refused())
        }

        async fn get_opts(&self, _: &Path, _: GetOptions) -> object_store::Result<GetResult> {
            Err(refused())
        }

        async fn delete(&self, _: &Path) -> object_store::Result<()> {
            Err(refused())
        }

        fn list(&self, _: Option<&Path>) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
            stream::once(async { Err(refused()) }).boxed()
        }

        async fn list_with_delimiter(&self, _: Option<&Path>) -> object_store::Result<ListResult> {
            Err(refused())
        }

        async fn copy(&self, _: &Path, _: &Path) -> object_store::Result<()> {
            Err(refused())
        }

        async fn copy_if_not_exists(&self, _: &Path, _: &Path) -> object_store::Result<()> {
            Err(refused())
        }
    }

    async fn bucket(keys: &[&str]) -> ObjectStoreBucket {
        let store = Arc::new(InMemory::new());
        for key in keys {
            store.put(&Path::from(*key), PutPayload::from(key.as_bytes().to_vec())).await.unwrap();
        }
        ObjectStoreBucket::new("memory", store)
    }

    fn query(prefix: &str, hierarchical: bool, page_size: usize) -> ListQuery {
        ListQuery::new(prefix).hierarchical(hierarchical).with_page_size(page_size).unwrap()
    }

    fn keys(page: &ListPage) -> Vec<&str> {
        page.entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    #[rstest]
    #[case("", None)]
    #[case("photos/", Some("photos"))]
    #[case("photos/ca", Some("photos"))]
    #[case("photos/2024/", Some("photos/2024"))]
    #[case("cat", None)]
    fn test_listing_parent(#[case] prefix: &str, #[case] expected: Option<&str>) {
        assert_eq!(listing_parent(prefix), expected.map(Path::from));
    }

    #[tokio::test]
    async fn test_hierarchical_listing() {
        let bucket = bucket(&["a/1.txt", "a/2.txt", "b.txt", "c.txt", "d.txt"]).await;
        let first = bucket.list_page(&query("", true, 2), None).await.unwrap();
        assert_eq!(keys(&first), ["a/", "b.txt"]);
        assert!(first.entries[0].is_directory());
        assert_eq!(first.next_token.as_deref(), Some("b.txt"));
        let second = bucket.list_page(&query("", true, 2), first.next_token.as_deref()).await.unwrap();
        assert_eq!(keys(&second), ["c.txt", "d.txt"]);
        assert_eq!(second.next_token, None);
    }

    #[tokio::test]
    async fn test_flat_listing_pages() {
        let bucket = bucket(&["x/1.txt", "x/2.txt", "x/y/3.txt", "z.txt"]).await;
        let first = bucket.list_page(&query("x/", false, 2), None).await.unwrap();
        assert_eq!(keys(&first), ["x/1.txt", "x/2.txt"]);
        let second = bucket.list_page(&query("x/", false, 2), first.next_token.as_deref()).await.unwrap();
        assert_eq!(keys(&second), ["x/y/3.txt"]);
        assert_eq!(second.next_token, None);
    }

    #[tokio::test]
    async fn test_partial_segment_prefix() {
        let bucket = bucket(&["photos/cat.jpg", "photos/car.jpg", "photos/dog.jpg"]).await;
        let page = bucket.list_page(&query("photos/ca", false, 10), None).await.unwrap();
        assert_eq!(keys(&page), ["photos/car.jpg", "photos/cat.jpg"]);
        let page = bucket.list_page(&query("photos/ca", true, 10), None).await.unwrap();
        assert_eq!(keys(&page), ["photos/car.jpg", "photos/cat.jpg"]);
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let bucket = bucket(&[]).await;
        let upload = BlobUpload::from_bytes("up/a.txt", b"hello".to_vec());
        bucket.upload_blob(upload, &NoProgress, &CancellationToken::new()).await.unwrap();

        let seen = Mutex::new(Vec::new());
        let sink = |bytes: u64| seen.lock().unwrap().push(bytes);
        let mut target = Vec::new();
        let written = bucket.download_blob("up/a.txt", &mut target, &sink, &CancellationToken::new()).await.unwrap();
        assert_eq!(written, 5);
        assert_eq!(target, b"hello");
        assert_eq!(seen.lock().unwrap().last(), Some(&5));

        let page = bucket.list_page(&query("up/", false, 10), None).await.unwrap();
        assert_eq!(page.entries[0].length(), 5);
        assert_eq!(page.entries[0].blob_meta().unwrap().content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_multipart_upload_progress() {
        let bucket = bucket(&[]).await.with_part_size(4);
        let seen = Mutex::new(Vec::new());
        let sink = |bytes: u64| seen.lock().unwrap().push(bytes);
        let upload = BlobUpload::from_bytes("big.bin", b"0123456789".to_vec());
        bucket.upload_blob(upload, &sink, &CancellationToken::new()).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 4, 8, 10]);

        let mut target = Vec::new();
        bucket.download_blob("big.bin", &mut target, &NoProgress, &CancellationToken::new()).await.unwrap();
        assert_eq!(target, b"0123456789");
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_keys() {
        let bucket = bucket(&["a.txt", "b.txt"]).await;
        let keys = vec!["a.txt".to_string(), "gone.txt".to_string()];
        bucket.delete_blobs(&keys, &CancellationToken::new()).await.unwrap();
        bucket.delete_blobs(&keys, &CancellationToken::new()).await.unwrap();
        let page = bucket.list_page(&query("", false, 10), None).await.unwrap();
        assert_eq!(self::keys(&page), ["b.txt"]);
    }

    #[tokio::test]
    async fn test_cancelled_download() {
        let bucket = bucket(&["a.txt"]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut target = Vec::new();
        let err = bucket.download_blob("a.txt", &mut target, &NoProgress, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn test_link_without_signer() {
        let bucket = bucket(&["a.txt"]).await;
        let err = bucket.blob_link("a.txt", Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Link(key) if key == "a.txt"));
    }

    #[tokio::test]
    async fn test_listed_keys_round_trip() {
        let bucket = bucket(&[]).await;
        let key = "dir/100%[draft] #2.txt";
        for (key, data) in [(key, "draft"), ("a%b/c.txt", "c")] {
            let upload = BlobUpload::from_bytes(key, data.as_bytes().to_vec());
            bucket.upload_blob(upload, &NoProgress, &CancellationToken::new()).await.unwrap();
        }

        let page = bucket.list_page(&query("dir/", true, 10), None).await.unwrap();
        assert_eq!(keys(&page), [key]);
        let page = bucket.list_page(&query("dir/100%", false, 10), None).await.unwrap();
        assert_eq!(keys(&page), [key]);
        let page = bucket.list_page(&query("", true, 10), None).await.unwrap();
        assert_eq!(keys(&page), ["a%b/", "dir/"]);

        let directory = page.entries[1].key.clone();
        let page = bucket.list_page(&query(&directory, true, 10), None).await.unwrap();
        let listed = page.entries[0].key.clone();
        let mut target = Vec::new();
        bucket.download_blob(&listed, &mut target, &NoProgress, &CancellationToken::new()).await.unwrap();
        assert_eq!(target, b"draft");

        bucket.delete_blobs(&[listed], &CancellationToken::new()).await.unwrap();
        let page = bucket.list_page(&query("dir/", false, 10), None).await.unwrap();
        assert!(page.entries.is_empty());
    }

    #[tokio::test]
    async fn test_list_buckets_checks_each_bucket() {
        let reachable = bucket(&["a.txt"]).await;
        let account = ObjectStoreAccount::new("test", AccountKind::AzureBlobStorage, vec![reachable.clone()]);
        let buckets = account.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name(), "memory");

        let dead = ObjectStoreBucket::new("dead", Arc::new(Unreachable));
        let account = ObjectStoreAccount::new("test", AccountKind::AzureBlobStorage, vec![reachable, dead]);
        let err = account.list_buckets().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Connection));
    }
}
