//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for AWS S3 and
//! S3-compatible services (MinIO, Backblaze B2, Tigris, ...).
//!
//! # Credentials
//!
//! Credentials are provided explicitly by the stored account: one access key
//! and secret per account. A custom endpoint switches to path-style
//! addressing, which every S3-compatible service understands.
//!
//! TODO: support `credentials: "profile:name"` to use the AWS SDK credential
//! providers (~/.aws/credentials profiles) instead of explicit keys.

use super::{AccountKind, BlobUpload, ListPage, StorageAccount, StorageBucket, sort_entries};
use crate::entry::{BlobMeta, EntryMeta};
use crate::error::{ErrorKind, Result};
use crate::key::DELIMITER;
use crate::progress::{Monotonic, ProgressSink};
use crate::query::ListQuery;
use crate::BucketHandle;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    operation::list_objects_v2::ListObjectsV2Output,
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime},
    types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier},
};
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Uploads up to this size go out as one `PutObject`; larger ones as
/// multipart uploads with parts of this size.
const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;
/// `DeleteObjects` accepts at most this many keys per call.
const MAX_DELETE_BATCH: usize = 1000;
/// `ListObjectsV2` returns at most this many keys per call.
const MAX_LIST_KEYS: usize = 1000;

/// S3 account: one set of credentials against one endpoint.
#[derive(Debug, Clone)]
pub struct S3Account {
    name: String,
    client: Client,
}

impl S3Account {
    /// Create a new S3 account.
    ///
    /// # Arguments
    /// * `name` - A name for this account (used in display/logging)
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    pub fn new(
        name: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "strata-account");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // Configure retry policy with exponential backoff (1 initial + 3 retries)
            .retry_config(RetryConfig::standard().with_max_attempts(4));
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
        }
    }
}

#[async_trait]
impl StorageAccount for S3Account {
    fn kind(&self) -> AccountKind {
        AccountKind::AwsS3
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_buckets(&self) -> Result<Vec<BucketHandle>> {
        let output = self.client.list_buckets().send().await.or_raise(|| ErrorKind::Connection)?;
        let buckets = output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name())
            .map(|name| Arc::new(S3Bucket { name: name.to_string(), client: self.client.clone() }) as BucketHandle)
            .collect();
        Ok(buckets)
    }
}

/// One S3 bucket.
#[derive(Debug, Clone)]
pub struct S3Bucket {
    name: String,
    client: Client,
}

impl S3Bucket {
    async fn put_single(
        &self,
        upload: &mut BlobUpload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut data = Vec::with_capacity(upload.length as usize);
        upload.body.read_to_end(&mut data).await.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
        let length = data.len() as u64;
        let request = self
            .client
            .put_object()
            .bucket(&self.name)
            .key(&upload.key)
            .content_type(&upload.content_type)
            .body(ByteStream::from(data))
            .send();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            result = request => {
                result.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
            },
        }
        progress.report(length);
        Ok(())
    }

    async fn put_multipart(
        &self,
        upload: &mut BlobUpload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.name)
            .key(&upload.key)
            .content_type(&upload.content_type)
            .send()
            .await
            .or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
        let upload_id = created.upload_id().ok_or_raise(|| ErrorKind::Upload(upload.key.clone()))?.to_string();

        let parts = match self.upload_parts(upload, &upload_id, progress, cancel).await {
            Ok(parts) => parts,
            Err(err) => {
                let abort = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.name)
                    .key(&upload.key)
                    .upload_id(&upload_id)
                    .send()
                    .await;
                if let Err(abort) = abort {
                    tracing::warn!(key = %upload.key, error = %abort, "failed to abort multipart upload");
                }
                return Err(err);
            },
        };
        let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.name)
            .key(&upload.key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
        Ok(())
    }

    async fn upload_parts(
        &self,
        upload: &mut BlobUpload,
        upload_id: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Vec<CompletedPart>> {
        let mut parts = Vec::new();
        let mut sent = 0;
        for part_number in 1.. {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            let mut buffer = vec![0; MULTIPART_PART_SIZE];
            let read =
                read_chunk(&mut upload.body, &mut buffer).await.or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
            if read == 0 {
                break;
            }
            buffer.truncate(read);
            let request = self
                .client
                .upload_part()
                .bucket(&self.name)
                .key(&upload.key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(buffer))
                .send();
            let output = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
                result = request => result.or_raise(|| ErrorKind::Upload(upload.key.clone()))?,
            };
            let e_tag = output.e_tag().ok_or_raise(|| ErrorKind::Upload(upload.key.clone()))?;
            parts.push(CompletedPart::builder().e_tag(e_tag).part_number(part_number).build());
            sent += read as u64;
            progress.report(sent);
        }
        Ok(parts)
    }
}

#[async_trait]
impl StorageBucket for S3Bucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_page(&self, query: &ListQuery, token: Option<&str>) -> Result<ListPage> {
        let max_keys = query.page_size().min(MAX_LIST_KEYS) as i32;
        let mut request = self.client.list_objects_v2().bucket(&self.name).max_keys(max_keys);
        if !query.prefix().is_empty() {
            request = request.prefix(query.prefix());
        }
        if query.is_hierarchical() {
            request = request.delimiter(DELIMITER);
        }
        if let Some(token) = token {
            request = request.continuation_token(token);
        }
        let output = request.send().await.or_raise(|| ErrorKind::Listing)?;
        Ok(page_from_output(query.prefix(), &output))
    }

    async fn upload_blob(
        &self,
        mut upload: BlobUpload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let progress = Monotonic::new(progress);
        progress.report(0);
        tracing::debug!(bucket = %self.name, key = %upload.key, length = upload.length, "uploading blob");
        match upload.length as usize <= MULTIPART_PART_SIZE {
            true => self.put_single(&mut upload, &progress, cancel).await,
            false => self.put_multipart(&mut upload, &progress, cancel).await,
        }
    }

    async fn download_blob(
        &self,
        key: &str,
        target: &mut (dyn AsyncWrite + Send + Unpin),
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let request = self.client.get_object().bucket(&self.name).key(key).send();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
            result = request => result.or_raise(|| ErrorKind::Download(key.to_string()))?,
        };
        let mut body = output.body;
        let mut written = 0;
        progress.report(0);
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => exn::bail!(ErrorKind::Cancelled),
                chunk = body.try_next() => chunk.or_raise(|| ErrorKind::Download(key.to_string()))?,
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
        for batch in keys.chunks(MAX_DELETE_BATCH) {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build().or_raise(|| ErrorKind::Delete))
                .collect::<Result<Vec<_>>>()?;
            // Quiet mode: only failures are reported back, and missing keys aren't failures.
            let delete =
                Delete::builder().set_objects(Some(objects)).quiet(true).build().or_raise(|| ErrorKind::Delete)?;
            let output = self
                .client
                .delete_objects()
                .bucket(&self.name)
                .delete(delete)
                .send()
                .await
                .or_raise(|| ErrorKind::Delete)?;
            for error in output.errors() {
                tracing::warn!(
                    bucket = %self.name,
                    key = error.key().unwrap_or_default(),
                    code = error.code().unwrap_or_default(),
                    message = error.message().unwrap_or_default(),
                    "blob not deleted"
                );
            }
        }
        Ok(())
    }

    async fn blob_link(&self, key: &str, lifetime: Duration) -> Result<String> {
        let config = PresigningConfig::expires_in(lifetime).or_raise(|| ErrorKind::Link(key.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.name)
            .key(key)
            .presigned(config)
            .await
            .or_raise(|| ErrorKind::Link(key.to_string()))?;
        Ok(request.uri().to_string())
    }
}

/// Convert one `ListObjectsV2` response into a page.
///
/// Content types are inferred from the key: S3 only reports them per object,
/// and a `HeadObject` per listed key would multiply the cost of a listing.
fn page_from_output(prefix: &str, output: &ListObjectsV2Output) -> ListPage {
    let blobs = output
        .contents()
        .iter()
        .filter_map(|object| object.key().map(|key| (key, object)))
        // Directory marker for the listed prefix itself.
        .filter(|(key, _)| *key != prefix)
        .map(|(key, object)| match key.ends_with(DELIMITER) {
            true => EntryMeta::directory(key),
            false => {
                let length = object.size().unwrap_or_default().max(0) as u64;
                let meta = BlobMeta::inferred(key, length)
                    .with_last_modified(object.last_modified().and_then(|dt| parse_datetime(dt).ok()))
                    .with_tier(object.storage_class().map(|class| class.as_str()));
                EntryMeta::blob(key, meta)
            },
        });
    let directories = output
        .common_prefixes()
        .iter()
        .filter_map(|common| common.prefix())
        .map(EntryMeta::directory);
    let mut entries: Vec<EntryMeta> = blobs.chain(directories).collect();
    sort_entries(&mut entries);
    let next_token = match output.is_truncated() {
        Some(true) => output.next_continuation_token().map(str::to_string),
        _ => None,
    };
    ListPage { entries, next_token }
}

/// Convert AWS DateTime to OffsetDateTime.
fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
        .or_raise(|| ErrorKind::Listing)
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
