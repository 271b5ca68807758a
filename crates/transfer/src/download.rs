//! Download sets: blobs (and everything beneath selected directories) written
//! beneath a local root.

use crate::error::{ErrorKind, Result, StorageResultExt};
use crate::status::Reporter;
use exn::ResultExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use strata_storage::Entry;
use strata_storage::expand::expand_selection;
use strata_storage::key::local_path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Suffix of the temporary sibling a blob is written to before being moved
/// into place.
const PARTIAL_SUFFIX: &str = ".part";

/// A selection of entries downloaded one after another into `root`.
#[derive(Debug)]
pub struct DownloadSet {
    selection: Vec<Entry>,
    root: PathBuf,
}

impl DownloadSet {
    pub fn new(selection: Vec<Entry>, root: impl Into<PathBuf>) -> Self {
        Self { selection, root: root.into() }
    }

    pub(crate) fn len(&self) -> usize {
        self.selection.len()
    }

    /// Bytes known before expansion; directories count as zero.
    pub(crate) fn known_bytes(&self) -> u64 {
        self.selection.iter().map(|entry| entry.length()).sum()
    }

    pub(crate) fn text(&self) -> String {
        format!("Downloading {} files...", self.selection.len())
    }

    pub(crate) async fn run(self, reporter: &Reporter, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        reporter.set_text(format!("Listing {} selected entries...", self.selection.len()));
        let blobs = expand_selection(&self.selection).await.or_storage()?;
        let total_bytes = blobs.iter().map(|blob| blob.length()).sum();
        reporter.set_total(blobs.len(), total_bytes);

        let count = blobs.len();
        for (index, blob) in blobs.iter().enumerate() {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            let target = local_path(&self.root, &blob.key).or_storage()?;
            reporter.begin_item(
                blob.length(),
                format!("Downloading {count} files ({}: '{}')...", index + 1, blob.display_name()),
            );
            tracing::debug!(key = %blob.key, target = %target.display(), "downloading blob");
            download_one(blob, &target, reporter, cancel).await?;
            reporter.finish_item();
        }
        Ok(())
    }
}

/// Stream one blob to a temporary sibling of `target`, then rename it into
/// place. The temporary file is removed when anything goes wrong.
async fn download_one(blob: &Entry, target: &Path, reporter: &Reporter, cancel: &CancellationToken) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await.or_raise(|| io_error(parent))?;
    }
    let partial = partial_path(target);
    let result: Result<()> = async {
        let mut file = fs::File::create(&partial).await.or_raise(|| io_error(&partial))?;
        blob.download_to(&mut file, reporter, cancel).await.or_storage()?;
        file.flush().await.or_raise(|| io_error(&partial))?;
        drop(file);
        fs::rename(&partial, target).await.or_raise(|| io_error(target))?;
        Ok(())
    }
    .await;

    if result.is_err()
        && let Err(err) = fs::remove_file(&partial).await
        && err.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %partial.display(), error = %err, "failed to remove partial download");
    }
    result
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

fn io_error(path: &Path) -> ErrorKind {
    ErrorKind::Io(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TaskStatus;
    use std::sync::Arc;
    use strata_storage::backend::MockBucket;
    use strata_storage::{BucketExt, BucketHandle, ListQuery, StorageBucket};
    use tempfile::TempDir;
    use tokio::sync::watch;

    fn reporter(set: &DownloadSet) -> (Reporter, watch::Receiver<TaskStatus>) {
        let (tx, rx) = watch::channel(TaskStatus::starting(set.text(), set.len()));
        (Reporter::new(tx, set.known_bytes()), rx)
    }

    async fn root_entries(bucket: &BucketHandle) -> Vec<Entry> {
        let page = bucket.list_entries(ListQuery::new("").hierarchical(true)).await.unwrap();
        page.entries().to_vec()
    }

    #[test]
    fn test_partial_path_is_a_sibling() {
        assert_eq!(partial_path(Path::new("/tmp/x/1.txt")), Path::new("/tmp/x/1.txt.part"));
    }

    #[tokio::test]
    async fn test_download_expands_directories() {
        let bucket: BucketHandle = Arc::new(MockBucket::with_files([
            ("x/1.txt", b"one".to_vec()),
            ("x/y/2.txt", b"two!".to_vec()),
            ("z.txt", b"zed".to_vec()),
        ]));
        let dir = TempDir::new().unwrap();
        let set = DownloadSet::new(root_entries(&bucket).await, dir.path());
        let (reporter, rx) = reporter(&set);
        set.run(&reporter, &CancellationToken::new()).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("x/1.txt")).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.path().join("x/y/2.txt")).unwrap(), b"two!");
        assert_eq!(std::fs::read(dir.path().join("z.txt")).unwrap(), b"zed");
        let status = rx.borrow();
        assert_eq!((status.completed, status.total), (3, 3));
        assert_eq!(status.progress, 1.0);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let mock = Arc::new(MockBucket::with_files([("a.txt", b"new".to_vec())]));
        let bucket: BucketHandle = mock;
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"old contents").unwrap();
        let set = DownloadSet::new(root_entries(&bucket).await, dir.path());
        let (reporter, _rx) = reporter(&set);
        set.run(&reporter, &CancellationToken::new()).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_failure_leaves_no_partial_file() {
        let mock = Arc::new(MockBucket::with_files([("a.txt", b"aaaa".to_vec()), ("b.txt", b"bbbb".to_vec())]));
        let bucket: BucketHandle = mock.clone();
        let entries = root_entries(&bucket).await;
        // Gone between listing and download.
        mock.delete_blobs(&["b.txt".to_string()], &CancellationToken::new()).await.unwrap();

        let dir = TempDir::new().unwrap();
        let set = DownloadSet::new(entries, dir.path());
        let (reporter, rx) = reporter(&set);
        let err = set.run(&reporter, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage(_)));

        assert!(dir.path().join("a.txt").exists());
        assert!(!dir.path().join("b.txt").exists());
        assert!(!dir.path().join("b.txt.part").exists());
        assert_eq!(rx.borrow().completed, 1);
    }

    #[tokio::test]
    async fn test_unsafe_keys_are_refused() {
        let bucket: BucketHandle = Arc::new(MockBucket::with_files([("../escape.txt", b"x".to_vec())]));
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("downloads");
        let set = DownloadSet::new(root_entries(&bucket).await, &root);
        let (reporter, _rx) = reporter(&set);
        assert!(set.run(&reporter, &CancellationToken::new()).await.is_err());
        assert!(!dir.path().join("escape.txt").exists());
    }
}
