pub mod backend;
pub mod credential;
pub mod entry;
pub mod error;
pub mod expand;
pub mod key;
mod page;
pub mod progress;
mod query;

pub use crate::backend::{BucketExt, StorageAccount, StorageBucket};
pub use crate::credential::Credential;
pub use crate::entry::{Entry, EntryMeta};
pub use crate::page::PagedResult;
pub use crate::query::{DEFAULT_PAGE_SIZE, ListQuery};
use std::sync::Arc;
pub use tokio_util::sync::CancellationToken;

pub type AccountHandle = Arc<dyn StorageAccount + Send + Sync>;
pub type BucketHandle = Arc<dyn StorageBucket + Send + Sync>;
