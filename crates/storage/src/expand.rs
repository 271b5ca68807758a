//! Recursive expansion of listings and selections.

use crate::backend::EntryStream;
use crate::entry::Entry;
use crate::error::Result;
use crate::query::ListQuery;
use crate::BucketHandle;
use async_stream::stream;
use futures::TryStreamExt;
use std::collections::HashSet;
use std::time::Duration;

/// Page size used when draining a listing; the user never sees these pages.
const EXPANSION_PAGE_SIZE: usize = 1000;

/// Stream every entry of `query`, following continuation tokens until the
/// last page. The first failed fetch is yielded and ends the stream.
pub fn list_stream(bucket: BucketHandle, query: ListQuery) -> EntryStream<'static> {
    Box::pin(stream! {
        let mut token: Option<String> = None;
        loop {
            let page = match bucket.list_page(&query, token.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    yield Err(err);
                    break;
                },
            };
            for meta in page.entries {
                yield Ok(Entry::new(bucket.clone(), meta));
            }
            match page.next_token.filter(|next| !next.is_empty()) {
                Some(next) => token = Some(next),
                None => break,
            }
        }
    })
}

/// Every entry of a flat listing under `prefix`, in page order.
pub async fn list_all_entries(bucket: &BucketHandle, prefix: &str) -> Result<Vec<Entry>> {
    let query = ListQuery::new(prefix).with_page_size(EXPANSION_PAGE_SIZE)?;
    list_stream(bucket.clone(), query).try_collect().await
}

/// Replace every directory in `entries` with all blobs beneath it.
///
/// Blobs keep their position; each one is returned at most once even when a
/// selection contains both a directory and something inside it.
pub async fn expand_selection(entries: &[Entry]) -> Result<Vec<Entry>> {
    let mut seen = HashSet::new();
    let mut expanded = Vec::new();
    for entry in entries {
        let blobs = match entry.is_directory() {
            true => list_all_entries(entry.bucket(), &entry.key).await?,
            false => vec![entry.clone()],
        };
        for blob in blobs.into_iter().filter(|blob| !blob.is_directory()) {
            if seen.insert((blob.bucket().name().to_string(), blob.key.clone())) {
                expanded.push(blob);
            }
        }
    }
    tracing::debug!(selected = entries.len(), expanded = expanded.len(), "expanded selection");
    Ok(expanded)
}

/// A signed URL for one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLink {
    pub key: String,
    pub url: String,
}

/// Signed links for a selection, directories expanded first.
pub async fn links(entries: &[Entry], lifetime: Duration) -> Result<Vec<BlobLink>> {
    let mut links = Vec::new();
    for blob in expand_selection(entries).await? {
        let url = blob.link(lifetime).await?;
        links.push(BlobLink { key: blob.key.clone(), url });
    }
    Ok(links)
}
