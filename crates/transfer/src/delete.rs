//! Delete sets: directory prefixes and literal keys removed in one batch.

use crate::error::{ErrorKind, Result, StorageResultExt};
use crate::status::Reporter;
use std::collections::HashSet;
use strata_storage::key::DELIMITER;
use strata_storage::{BucketExt, BucketHandle};
use tokio_util::sync::CancellationToken;

/// Prefixes to delete from one bucket.
///
/// A prefix ending in the delimiter is a directory and is replaced by every
/// blob beneath it; anything else is taken as a literal key. Directory keys
/// themselves are never sent to the backend.
#[derive(Debug)]
pub struct DeleteSet {
    bucket: BucketHandle,
    prefixes: Vec<String>,
}

impl DeleteSet {
    pub fn new(bucket: BucketHandle, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { bucket, prefixes: prefixes.into_iter().map(Into::into).collect() }
    }

    pub(crate) fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub(crate) fn text(&self) -> String {
        format!("Deleting {} files...", self.prefixes.len())
    }

    /// Concrete keys to delete, duplicates removed and first-seen order kept.
    async fn expand(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for prefix in &self.prefixes {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            let expanded = match prefix.ends_with(DELIMITER) {
                true => {
                    let entries = self.bucket.list_all_entries(prefix).await.or_storage()?;
                    entries.into_iter().map(|entry| entry.into_meta().key).collect()
                },
                false => vec![prefix.clone()],
            };
            for key in expanded {
                if !key.ends_with(DELIMITER) && seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    pub(crate) async fn run(self, reporter: &Reporter, cancel: &CancellationToken) -> Result<()> {
        let keys = self.expand(cancel).await?;
        reporter.set_total(keys.len(), 0);
        if keys.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        reporter.begin_item(0, format!("Deleting {} files...", keys.len()));
        tracing::debug!(bucket = self.bucket.name(), count = keys.len(), "deleting blobs");
        self.bucket.delete_blobs(&keys, cancel).await.or_storage()?;
        reporter.finish_items(keys.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TaskStatus;
    use rstest::rstest;
    use std::sync::Arc;
    use strata_storage::backend::MockBucket;
    use tokio::sync::watch;

    fn bucket() -> Arc<MockBucket> {
        Arc::new(MockBucket::with_files([
            ("x/", b"".to_vec()),
            ("x/1.txt", b"1".to_vec()),
            ("x/2.txt", b"2".to_vec()),
            ("x2.txt", b"x2".to_vec()),
            ("y.txt", b"y".to_vec()),
        ]))
    }

    async fn run(mock: &Arc<MockBucket>, prefixes: &[&str]) -> (Result<()>, TaskStatus) {
        let set = DeleteSet::new(mock.clone(), prefixes.iter().copied());
        let (tx, rx) = watch::channel(TaskStatus::starting(set.text(), set.len()));
        let reporter = Reporter::new(tx, 0);
        let result = set.run(&reporter, &CancellationToken::new()).await;
        let status = rx.borrow().clone();
        (result, status)
    }

    #[rstest]
    #[case::directory(&["x/"], &[&["x/1.txt", "x/2.txt"][..]][..])]
    #[case::literal_key(&["x"], &[&["x"][..]][..])]
    #[case::duplicates(&["x/", "x/1.txt", "y.txt", "y.txt"], &[&["x/1.txt", "x/2.txt", "y.txt"][..]][..])]
    #[case::directory_marker_only(&["x/", "x/"], &[&["x/1.txt", "x/2.txt"][..]][..])]
    #[tokio::test]
    async fn test_delete_calls(#[case] prefixes: &[&str], #[case] expected: &[&[&str]]) {
        let mock = bucket();
        let (result, status) = run(&mock, prefixes).await;
        result.unwrap();
        assert_eq!(mock.delete_calls(), expected);
        assert_eq!(status.completed, expected[0].len());
    }

    #[tokio::test]
    async fn test_delete_directory_keeps_siblings() {
        let mock = bucket();
        let (result, _) = run(&mock, &["x/"]).await;
        result.unwrap();
        assert_eq!(mock.keys().await, ["x/", "x2.txt", "y.txt"]);
    }

    #[tokio::test]
    async fn test_nothing_to_delete_makes_no_call() {
        let mock = bucket();
        let (result, status) = run(&mock, &["empty/"]).await;
        result.unwrap();
        assert!(mock.delete_calls().is_empty());
        assert_eq!(status.total, 0);
    }

    #[tokio::test]
    async fn test_deleting_missing_key_is_fine() {
        let mock = bucket();
        let (first, _) = run(&mock, &["y.txt"]).await;
        let (second, _) = run(&mock, &["y.txt"]).await;
        first.unwrap();
        second.unwrap();
        assert_eq!(mock.delete_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_backend_failure() {
        let mock = bucket();
        mock.fail_deletes();
        let (result, status) = run(&mock, &["y.txt"]).await;
        assert!(matches!(&*result.unwrap_err(), ErrorKind::Storage(_)));
        assert_eq!(status.completed, 0);
    }
}
