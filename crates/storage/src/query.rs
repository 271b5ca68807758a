use crate::error::{ErrorKind, Result};

/// Page size used when a query doesn't specify one.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Input to a listing call.
///
/// A query is immutable once built; every page of a [`PagedResult`](crate::PagedResult)
/// chain carries the query that produced it so the page can be refreshed.
///
/// ```
/// use strata_storage::ListQuery;
///
/// let query = ListQuery::new("photos/").hierarchical(true).with_page_size(2).unwrap();
/// assert_eq!(query.prefix(), "photos/");
/// assert_eq!(query.page_size(), 2);
/// assert!(ListQuery::new("").with_page_size(0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    prefix: String,
    hierarchical: bool,
    page_size: usize,
}

impl ListQuery {
    /// Flat listing of everything under `prefix` (empty for the bucket root).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            hierarchical: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// `true` groups children sharing a delimiter segment into one directory
    /// entry; `false` lists every key under the prefix recursively.
    pub fn hierarchical(mut self, hierarchical: bool) -> Self {
        self.hierarchical = hierarchical;
        self
    }

    /// Maximum number of entries per page. Must be positive.
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            exn::bail!(ErrorKind::InvalidQuery("page size must be positive".to_string()));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchical
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
impl Default for ListQuery {
    fn default() -> Self {
        Self::new("")
    }
}
