//! Append-only CSV store.
//!
//! The file is never rewritten. New records are encoded in memory and appended
//! with a single `write_all` each. A write that fails midway is cut back to
//! the previous length, and a trailing record left incomplete by a crash is
//! truncated away on the next open, so the next run rewrites it cleanly.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::ScoredPost;
use crate::storage::{OUTPUT_FIELDS, OutputRecord, PostStore, WriteSummary};

const HIGH_PRIORITY_COLUMN: usize = 12;

/// Record counts of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub records: usize,
    pub high_priority: usize,
}

/// CSV file store deduplicating by post id.
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    known: HashSet<String>,
    high_priority: usize,
    needs_header: bool,
    needs_newline: bool,
}

impl CsvStore {
    /// Open the store at `path`, loading the ids it already holds.
    ///
    /// A missing or empty file is fine and gets a header on the first append.
    /// An existing header that differs from [`OUTPUT_FIELDS`] is rejected.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(AppError::write(&path, e)),
        };

        let mut store = Self {
            path,
            known: HashSet::new(),
            high_priority: 0,
            needs_header: bytes.is_empty(),
            needs_newline: false,
        };
        if !bytes.is_empty() {
            let kept = match store.load(&bytes)? {
                Some(complete) => {
                    log::warn!(
                        "Dropping an incomplete trailing record ({} bytes) from {}",
                        bytes.len() - complete,
                        store.path.display()
                    );
                    store.truncate(complete as u64).await?;
                    complete
                }
                None => bytes.len(),
            };
            store.needs_newline = bytes[..kept].last() != Some(&b'\n');
        }

        log::debug!(
            "Opened {} with {} known records",
            store.path.display(),
            store.known.len()
        );
        Ok(store)
    }

    /// Register the ids in `bytes`. Returns the length of the complete
    /// records when the last one is cut short.
    fn load(&mut self, bytes: &[u8]) -> Result<Option<usize>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers = reader
            .byte_headers()
            .map_err(|e| AppError::write(&self.path, e))?;
        if !headers.iter().eq(OUTPUT_FIELDS.iter().map(|f| f.as_bytes())) {
            return Err(AppError::write(
                &self.path,
                format!(
                    "header [{}] does not match the expected columns [{}]",
                    headers
                        .iter()
                        .map(String::from_utf8_lossy)
                        .collect::<Vec<_>>()
                        .join(","),
                    OUTPUT_FIELDS.join(",")
                ),
            ));
        }

        let mut complete = reader.position().byte() as usize;
        let mut record = ByteRecord::new();
        while reader
            .read_byte_record(&mut record)
            .map_err(|e| AppError::write(&self.path, e))?
        {
            let end = reader.position().byte() as usize;
            if end >= bytes.len() {
                let terminated = matches!(bytes.last(), Some(b'\n' | b'\r'));
                if !terminated || record.len() != OUTPUT_FIELDS.len() {
                    return Ok(Some(complete));
                }
            }
            complete = end;

            let Some(id) = record.get(0).filter(|id| !id.is_empty()) else {
                continue;
            };
            if self.known.insert(String::from_utf8_lossy(id).into_owned())
                && record.get(HIGH_PRIORITY_COLUMN) == Some(b"true".as_slice())
            {
                self.high_priority += 1;
            }
        }
        Ok(None)
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| AppError::write(&self.path, e))?;
        file.set_len(len)
            .await
            .map_err(|e| AppError::write(&self.path, e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            records: self.known.len(),
            high_priority: self.high_priority,
        }
    }

    /// Open the file for appending, writing the header or a missing line break first.
    async fn open_for_append(&mut self) -> Result<File> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::write(&self.path, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AppError::write(&self.path, e))?;

        let prefix = if self.needs_header {
            log::info!("Creating {}", self.path.display());
            self.encode_header()?
        } else if self.needs_newline {
            b"\n".to_vec()
        } else {
            Vec::new()
        };

        if !prefix.is_empty() {
            self.write_bytes(&mut file, &prefix).await?;
        }
        self.needs_header = false;
        self.needs_newline = false;
        Ok(file)
    }

    /// Append `bytes`, cutting the file back to its previous length when the
    /// write fails partway.
    async fn write_bytes(&self, file: &mut File, bytes: &[u8]) -> Result<()> {
        let before = file
            .metadata()
            .await
            .map_err(|e| AppError::write(&self.path, e))?
            .len();

        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(rollback) = file.set_len(before).await {
                log::error!(
                    "Could not cut {} back to {} bytes: {}",
                    self.path.display(),
                    before,
                    rollback
                );
            }
            return Err(AppError::write(&self.path, e));
        }
        Ok(())
    }

    fn encode_header(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(OUTPUT_FIELDS)
            .map_err(|e| AppError::write(&self.path, e))?;
        writer
            .into_inner()
            .map_err(|e| AppError::write(&self.path, e.error()))
    }

    fn encode_record(&self, record: &OutputRecord) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer
            .serialize(record)
            .map_err(|e| AppError::write(&self.path, e))?;
        writer
            .into_inner()
            .map_err(|e| AppError::write(&self.path, e.error()))
    }
}

#[async_trait]
impl PostStore for CsvStore {
    async fn append(&mut self, posts: &[ScoredPost]) -> Result<WriteSummary> {
        let mut summary = WriteSummary::default();
        if posts.iter().all(|p| self.known.contains(&p.post.id)) {
            summary.skipped = posts.len();
            return Ok(summary);
        }

        let mut file = self.open_for_append().await?;
        for scored in posts {
            if self.known.contains(&scored.post.id) {
                log::debug!("Skipping {}: already stored", scored.post.id);
                summary.skipped += 1;
                continue;
            }

            let bytes = self.encode_record(&OutputRecord::from(scored))?;
            self.write_bytes(&mut file, &bytes).await?;

            self.known.insert(scored.post.id.clone());
            if scored.high_priority {
                self.high_priority += 1;
            }
            summary.written += 1;
        }
        Ok(summary)
    }

    fn contains(&self, id: &str) -> bool {
        self.known.contains(id)
    }

    fn len(&self) -> usize {
        self.known.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawPost;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn scored(id: &str, title: &str, high_priority: bool) -> ScoredPost {
        ScoredPost {
            post: RawPost {
                id: id.to_string(),
                created_utc: 1_700_000_000,
                subreddit: "AlexandriaVA".to_string(),
                author: Some("neighbor".to_string()),
                title: title.to_string(),
                selftext: String::new(),
                url: format!("https://example.com/{id}"),
                permalink: format!("https://reddit.com/r/AlexandriaVA/comments/{id}/"),
                score: 5,
                num_comments: 2,
            },
            matched_keywords: BTreeSet::from(["fire".to_string()]),
            high_priority,
            eas_score: 8.25,
        }
    }

    fn ids_in(path: &Path) -> Vec<String> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_creates_file_with_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("out.csv");

        let mut store = CsvStore::open(&path).await.unwrap();
        assert!(store.is_empty());

        let summary = store
            .append(&[scored("a", "Fire", false), scored("b", "Smoke", true)])
            .await
            .unwrap();
        assert_eq!(summary, WriteSummary { written: 2, skipped: 0 });

        let content = std::fs::read_to_string(&path).unwrap();
        let first_line = content.lines().next().unwrap();
        assert_eq!(first_line, OUTPUT_FIELDS.join(","));
        assert_eq!(ids_in(&path), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_rerun_never_duplicates_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let posts = vec![scored("a", "Fire", false), scored("b", "Smoke", false)];

        let mut store = CsvStore::open(&path).await.unwrap();
        store.append(&posts).await.unwrap();
        let again = store.append(&posts).await.unwrap();
        assert_eq!(again, WriteSummary { written: 0, skipped: 2 });

        let mut reopened = CsvStore::open(&path).await.unwrap();
        assert!(reopened.contains("a"));
        let summary = reopened
            .append(&[scored("b", "Smoke", false), scored("c", "Flood", false)])
            .await
            .unwrap();
        assert_eq!(summary, WriteSummary { written: 1, skipped: 1 });

        assert_eq!(ids_in(&path), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicates_within_one_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut store = CsvStore::open(&path).await.unwrap();
        let summary = store
            .append(&[scored("a", "Fire", false), scored("a", "Fire again", false)])
            .await
            .unwrap();

        assert_eq!(summary, WriteSummary { written: 1, skipped: 1 });
        assert_eq!(ids_in(&path), vec!["a"]);
    }

    #[tokio::test]
    async fn test_rejects_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "id,title\n1,hello\n").unwrap();

        let err = CsvStore::open(&path).await.unwrap_err();
        assert!(matches!(err, AppError::Write { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_empty_file_gets_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "").unwrap();

        let mut store = CsvStore::open(&path).await.unwrap();
        store.append(&[scored("a", "Fire", false)]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("id,created_utc,created_iso,"));
        assert_eq!(ids_in(&path), vec!["a"]);
    }

    #[tokio::test]
    async fn test_unterminated_last_row_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut store = CsvStore::open(&path).await.unwrap();
        store.append(&[scored("a", "Fire", false), scored("b", "Smoke", false)]).await.unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, content.trim_end_matches('\n')).unwrap();

        let mut store = CsvStore::open(&path).await.unwrap();
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        store.append(&[scored("b", "Smoke", false)]).await.unwrap();

        assert_eq!(ids_in(&path), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_record_cut_inside_quotes_is_dropped() {
        let cut_tails = [
            "c,1700000000,2023-11-14T22:13:20+00:00,AlexandriaVA,neighbor,\"Fire on Duke",
            "c,1700000000,2023-11-14T22:13:20+00:00,AlexandriaVA,neighbor,\"Fire on Duke\n",
        ];

        for tail in cut_tails {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("out.csv");

            let mut store = CsvStore::open(&path).await.unwrap();
            store.append(&[scored("a", "Fire", false)]).await.unwrap();
            let intact = std::fs::read_to_string(&path).unwrap();
            std::fs::write(&path, format!("{intact}{tail}")).unwrap();

            let mut store = CsvStore::open(&path).await.unwrap();
            assert_eq!(store.len(), 1);
            assert!(!store.contains("c"));
            assert_eq!(std::fs::read_to_string(&path).unwrap(), intact);

            store
                .append(&[scored("b", "Smoke", false), scored("c", "Fire on Duke", true)])
                .await
                .unwrap();

            assert_eq!(ids_in(&path), vec!["a", "b", "c"]);
            let reopened = CsvStore::open(&path).await.unwrap();
            assert_eq!(reopened.stats(), StoreStats { records: 3, high_priority: 1 });
        }
    }

    #[tokio::test]
    async fn test_header_without_line_break() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, OUTPUT_FIELDS.join(",")).unwrap();

        let mut store = CsvStore::open(&path).await.unwrap();
        assert!(store.is_empty());
        store.append(&[scored("a", "Fire", false)]).await.unwrap();

        assert_eq!(ids_in(&path), vec!["a"]);
    }

    #[tokio::test]
    async fn test_quoted_fields_survive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let mut post = scored("a", "Fire, smoke\nand \"sirens\"", true);
        post.post.author = None;

        let mut store = CsvStore::open(&path).await.unwrap();
        store.append(&[post.clone()]).await.unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record: OutputRecord = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(record, OutputRecord::from(&post));
    }

    #[tokio::test]
    async fn test_stats_count_high_priority() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        let mut store = CsvStore::open(&path).await.unwrap();
        store
            .append(&[
                scored("a", "Fire", true),
                scored("b", "Smoke", false),
                scored("c", "Explosion", true),
            ])
            .await
            .unwrap();
        assert_eq!(
            store.stats(),
            StoreStats {
                records: 3,
                high_priority: 2
            }
        );

        let reopened = CsvStore::open(&path).await.unwrap();
        assert_eq!(reopened.stats(), store.stats());
    }
}
