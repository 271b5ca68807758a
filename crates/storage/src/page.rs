//! Paged listing cursor.
//!
//! A [`PagedResult`] is an immutable snapshot of one page. Moving forward
//! fetches a new page that points back at the one it came from, so the chain
//! of pages is a singly-linked history: going back is pointer traversal and
//! never touches the network.

use crate::entry::Entry;
use crate::error::{ErrorKind, Result};
use crate::query::ListQuery;
use crate::BucketHandle;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// One page of a listing plus its position in the chain.
///
/// Cloning is cheap: all clones share the same snapshot.
#[derive(Clone)]
pub struct PagedResult {
    inner: Arc<Page>,
}

struct Page {
    bucket: BucketHandle,
    query: ListQuery,
    /// Token this page was fetched with; `None` for the first page.
    token: Option<String>,
    next_token: Option<String>,
    page_number: usize,
    entries: Vec<Entry>,
    previous: Option<PagedResult>,
}

impl PagedResult {
    /// Fetch the first page of `query`.
    pub async fn first(bucket: BucketHandle, query: ListQuery) -> Result<Self> {
        Self::fetch(bucket, query, None, 1, None).await
    }

    async fn fetch(
        bucket: BucketHandle,
        query: ListQuery,
        token: Option<String>,
        page_number: usize,
        previous: Option<PagedResult>,
    ) -> Result<Self> {
        tracing::debug!(
            bucket = bucket.name(),
            prefix = query.prefix(),
            hierarchical = query.is_hierarchical(),
            page_number,
            "fetching page"
        );
        let page = bucket.list_page(&query, token.as_deref()).await?;
        let entries = page.entries.into_iter().map(|meta| Entry::new(bucket.clone(), meta)).collect();
        Ok(Self {
            inner: Arc::new(Page {
                bucket,
                query,
                token,
                next_token: page.next_token.filter(|token| !token.is_empty()),
                page_number,
                entries,
                previous,
            }),
        })
    }

    pub fn entries(&self) -> &[Entry] {
        &self.inner.entries
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// 1-based position of this page in its chain.
    pub fn page_number(&self) -> usize {
        self.inner.page_number
    }

    pub fn page_size(&self) -> usize {
        self.inner.query.page_size()
    }

    pub fn query(&self) -> &ListQuery {
        &self.inner.query
    }

    pub fn bucket(&self) -> &BucketHandle {
        &self.inner.bucket
    }

    /// The page this one was reached from.
    pub fn previous(&self) -> Option<&PagedResult> {
        self.inner.previous.as_ref()
    }

    pub fn has_next_page(&self) -> bool {
        self.inner.next_token.is_some()
    }

    pub fn has_previous_page(&self) -> bool {
        self.inner.previous.is_some()
    }

    /// Fetch the page after this one.
    ///
    /// Fails with [`NoNextPage`](ErrorKind::NoNextPage) on the last page, or
    /// with [`Listing`](ErrorKind::Listing) if the fetch fails. Either way
    /// `self` is untouched and can be used again.
    pub async fn next_page(&self) -> Result<Self> {
        let Some(token) = self.inner.next_token.clone() else {
            exn::bail!(ErrorKind::NoNextPage);
        };
        Self::fetch(
            self.inner.bucket.clone(),
            self.inner.query.clone(),
            Some(token),
            self.inner.page_number + 1,
            Some(self.clone()),
        )
        .await
    }

    /// Re-run the fetch that produced this page.
    ///
    /// The returned page keeps this page's number and predecessor. Pages
    /// fetched forward from the old snapshot are stale: continue from the
    /// returned page instead.
    pub async fn refresh(&self) -> Result<Self> {
        Self::fetch(
            self.inner.bucket.clone(),
            self.inner.query.clone(),
            self.inner.token.clone(),
            self.inner.page_number,
            self.inner.previous.clone(),
        )
        .await
    }

    /// Absolute position of the `index`-th entry (0-based) of this page
    /// within the whole listing.
    pub fn offset(&self, index: usize) -> usize {
        (self.inner.page_number - 1) * self.page_size() + index
    }

    /// Entries paired with their absolute position in the listing.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, &Entry)> + '_ {
        self.inner.entries.iter().enumerate().map(|(index, entry)| (self.offset(index), entry))
    }
}

impl Debug for PagedResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PagedResult")
            .field("bucket", &self.inner.bucket.name())
            .field("query", &self.inner.query)
            .field("page_number", &self.inner.page_number)
            .field("entries", &self.inner.entries.len())
            .field("has_next_page", &self.has_next_page())
            .finish()
    }
}
