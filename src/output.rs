//! Plain-text rendering of listings and task status.

use std::io::Write;
use strata_storage::Entry;
use strata_transfer::TaskStatus;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");
const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Size in the largest binary unit that keeps the number at or above one.
pub fn human_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    match unit {
        0 => format!("{bytes} B"),
        _ => format!("{size:.1} {}", UNITS[unit]),
    }
}

/// One listing row: offset, size (or `DIR`), modification time and name.
pub fn entry_row(offset: usize, entry: &Entry) -> String {
    let (size, modified) = match entry.blob_meta() {
        Some(meta) => (
            human_size(meta.length),
            meta.last_modified.and_then(|time| time.format(TIMESTAMP).ok()).unwrap_or_default(),
        ),
        None => ("DIR".to_string(), String::new()),
    };
    format!("{offset:>6}  {size:>10}  {modified:<16}  {}", entry.key)
}

/// Overwrite the current terminal line with a status snapshot.
pub fn print_status(status: &TaskStatus) {
    let mut stderr = std::io::stderr().lock();
    // Terminal output is best-effort.
    let _ = write!(stderr, "\r\x1b[2K{:>3.0}%  {}", status.progress * 100.0, status.text);
    let _ = stderr.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use strata_storage::backend::MockBucket;
    use strata_storage::entry::BlobMeta;
    use strata_storage::{BucketHandle, EntryMeta};
    use time::macros::datetime;

    #[rstest]
    #[case(0, "0 B")]
    #[case(1023, "1023 B")]
    #[case(1024, "1.0 KiB")]
    #[case(1536, "1.5 KiB")]
    #[case(5 * 1024 * 1024, "5.0 MiB")]
    #[case(u64::MAX, "16777216.0 TiB")]
    fn test_human_size(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(human_size(bytes), expected);
    }

    #[test]
    fn test_entry_rows() {
        let bucket: BucketHandle = Arc::new(MockBucket::default());
        let meta = BlobMeta::inferred("a/b.txt", 2048).with_last_modified(Some(datetime!(2024-03-01 09:30 UTC)));
        let blob = Entry::new(bucket.clone(), EntryMeta::blob("a/b.txt", meta));
        assert_eq!(entry_row(3, &blob), "     3     2.0 KiB  2024-03-01 09:30  a/b.txt");
        let dir = Entry::new(bucket, EntryMeta::directory("a/"));
        assert_eq!(entry_row(12, &dir), "    12         DIR                    a/");
    }
}
