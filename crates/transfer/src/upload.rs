//! Upload sets: local files or in-memory buffers stored under a prefix.

use crate::error::{ErrorKind, Result, StorageResultExt};
use crate::status::Reporter;
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use strata_storage::BucketHandle;
use strata_storage::backend::BlobUpload;
use strata_storage::entry::infer_content_type;
use strata_storage::key::{DELIMITER, combine};
use tokio::fs;
use tokio_util::sync::CancellationToken;

enum Source {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// One file to upload: a name relative to the destination prefix, a length
/// known up front and a content type.
pub struct UploadItem {
    name: String,
    source: Source,
    length: u64,
    content_type: String,
}

impl UploadItem {
    /// An item for one local file, named after the file itself.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| exn::Exn::from(ErrorKind::Io(format!("{}: not a UTF-8 file name", path.display()))))?;
        Self::from_file(name.to_string(), path.to_path_buf()).await
    }

    /// An item for an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let data = data.into();
        Self {
            content_type: infer_content_type(&name),
            length: data.len() as u64,
            source: Source::Bytes(data),
            name,
        }
    }

    /// Items for every file beneath `dir`, named by their path relative to
    /// the directory's parent, so the directory itself appears in every key.
    /// Sorted by name.
    pub async fn from_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        let base = dir.parent().unwrap_or(dir).to_path_buf();
        let mut stack = vec![dir.to_path_buf()];
        let mut items = Vec::new();
        while let Some(current) = stack.pop() {
            let mut entries = fs::read_dir(&current).await.or_raise(|| io_error(&current))?;
            while let Some(entry) = entries.next_entry().await.or_raise(|| io_error(&current))? {
                let path = entry.path();
                let file_type = entry.file_type().await.or_raise(|| io_error(&path))?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file() {
                    let name = relative_name(&base, &path)?;
                    items.push(Self::from_file(name, path).await?);
                }
                // Symlinks and special files are skipped.
            }
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }

    async fn from_file(name: String, path: PathBuf) -> Result<Self> {
        let metadata = fs::metadata(&path).await.or_raise(|| io_error(&path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::Io(format!("{}: not a regular file", path.display())));
        }
        Ok(Self {
            content_type: infer_content_type(&name),
            length: metadata.len(),
            source: Source::File(path),
            name,
        })
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    async fn open(self, key: String) -> Result<BlobUpload> {
        let upload = match self.source {
            Source::File(path) => {
                let file = fs::File::open(&path).await.or_raise(|| io_error(&path))?;
                BlobUpload::new(key, file, self.length)
            },
            Source::Bytes(data) => BlobUpload::new(key, Cursor::new(data), self.length),
        };
        Ok(upload.with_content_type(self.content_type))
    }
}
impl Debug for UploadItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let source = match &self.source {
            Source::File(path) => path.display().to_string(),
            Source::Bytes(_) => "<memory>".to_string(),
        };
        f.debug_struct("UploadItem")
            .field("name", &self.name)
            .field("source", &source)
            .field("length", &self.length)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Items uploaded one after another beneath `prefix`.
#[derive(Debug)]
pub struct UploadSet {
    bucket: BucketHandle,
    prefix: String,
    items: Vec<UploadItem>,
}

impl UploadSet {
    pub fn new(bucket: BucketHandle, prefix: impl Into<String>, items: Vec<UploadItem>) -> Self {
        Self { bucket, prefix: prefix.into(), items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(UploadItem::length).sum()
    }

    pub(crate) fn text(&self) -> String {
        format!("Uploading {} files...", self.items.len())
    }

    pub(crate) async fn run(self, reporter: &Reporter, cancel: &CancellationToken) -> Result<()> {
        let count = self.items.len();
        for (index, item) in self.items.into_iter().enumerate() {
            if cancel.is_cancelled() {
                exn::bail!(ErrorKind::Cancelled);
            }
            let key = combine(&self.prefix, &item.name);
            reporter.begin_item(item.length, format!("Uploading {count} files ({}: '{}')...", index + 1, item.name));
            tracing::debug!(bucket = self.bucket.name(), key = %key, length = item.length, "uploading blob");
            let upload = item.open(key).await?;
            self.bucket.upload_blob(upload, reporter, cancel).await.or_storage()?;
            reporter.finish_item();
        }
        Ok(())
    }
}

fn relative_name(base: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).or_raise(|| io_error(path))?;
    let mut segments = Vec::new();
    for component in relative.components() {
        match component.as_os_str().to_str() {
            Some(segment) => segments.push(segment),
            None => exn::bail!(ErrorKind::Io(format!("{}: not a UTF-8 file name", path.display()))),
        }
    }
    Ok(segments.join(&DELIMITER.to_string()))
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
    use tempfile::TempDir;
    use tokio::sync::watch;

    fn reporter(set: &UploadSet) -> (Reporter, watch::Receiver<TaskStatus>) {
        let (tx, rx) = watch::channel(TaskStatus::starting(set.text(), set.len()));
        (Reporter::new(tx, set.total_bytes()), rx)
    }

    #[tokio::test]
    async fn test_items_from_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.JPG");
        std::fs::write(&path, [0u8; 12]).unwrap();
        let item = UploadItem::from_path(&path).await.unwrap();
        assert_eq!(item.name(), "photo.JPG");
        assert_eq!(item.length(), 12);
        assert_eq!(item.content_type(), "image/jpeg");

        assert!(UploadItem::from_path(dir.path().join("missing.txt")).await.is_err());
        assert!(UploadItem::from_path(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_items_from_dir_keep_relative_names() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("site");
        std::fs::create_dir_all(root.join("css")).unwrap();
        std::fs::write(root.join("index.html"), b"<html>").unwrap();
        std::fs::write(root.join("css/main.css"), b"body{}").unwrap();

        let items = UploadItem::from_dir(&root).await.unwrap();
        let names: Vec<&str> = items.iter().map(UploadItem::name).collect();
        assert_eq!(names, ["site/css/main.css", "site/index.html"]);
        assert_eq!(items[0].content_type(), "text/css");
    }

    #[tokio::test]
    async fn test_upload_under_prefix() {
        let mock = Arc::new(MockBucket::default());
        let bucket: BucketHandle = mock.clone();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let items = vec![
            UploadItem::from_path(&path).await.unwrap(),
            UploadItem::from_bytes("notes/today.txt", b"hello".to_vec()),
        ];
        let set = UploadSet::new(bucket, "up/", items);
        let (reporter, rx) = reporter(&set);
        set.run(&reporter, &CancellationToken::new()).await.unwrap();

        assert_eq!(mock.uploads(), ["up/report.pdf", "up/notes/today.txt"]);
        assert_eq!(mock.contents("up/report.pdf").await.unwrap(), b"%PDF-1.7");
        assert_eq!(mock.content_type("up/report.pdf").await.unwrap(), "application/pdf");
        assert_eq!(rx.borrow().completed, 2);
        assert_eq!(rx.borrow().text, "Uploading 2 files (2: 'notes/today.txt')...");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_item() {
        let mock = Arc::new(MockBucket::default());
        let set = UploadSet::new(mock.clone(), "", vec![UploadItem::from_bytes("a.txt", b"a".to_vec())]);
        let (reporter, _rx) = reporter(&set);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = set.run(&reporter, &cancel).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Cancelled));
        assert!(mock.uploads().is_empty());
    }
}
