//! Persisted download log for resumable exports.
//!
//! One JSON object per line, appended and flushed after every completed or
//! failed download. On open the file is folded into a map keyed by
//! `source:id`; later lines override earlier ones.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{ExportError, ExportResult};

/// Ledger file name inside the download directory.
pub const LEDGER_FILE: &str = "download_log.jsonl";

/// Download state of one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// `source:id` of the paper.
    pub paper_key: String,

    /// Where the PDF is (or would be) stored.
    pub local_path: PathBuf,

    /// True once the PDF was fully written and renamed into place.
    pub completed: bool,

    /// Last failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When this entry was written.
    pub updated_at: DateTime<Utc>,
}

impl DownloadRecord {
    /// Entry for a finished download.
    #[must_use]
    pub fn completed(paper_key: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            paper_key: paper_key.into(),
            local_path: local_path.into(),
            completed: true,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Entry for a failed download.
    #[must_use]
    pub fn failed(
        paper_key: impl Into<String>,
        local_path: impl Into<PathBuf>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            paper_key: paper_key.into(),
            local_path: local_path.into(),
            completed: false,
            error: Some(error.into()),
            updated_at: Utc::now(),
        }
    }
}

/// Append-only download log with an in-memory index.
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    entries: HashMap<String, DownloadRecord>,
    file: File,
}

impl DownloadLedger {
    /// Open (or create) the ledger in `dir`.
    pub async fn open(dir: &Path) -> ExportResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(LEDGER_FILE);

        let mut entries = HashMap::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                for (line_no, line) in raw.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<DownloadRecord>(line) {
                        Ok(entry) => {
                            entries.insert(entry.paper_key.clone(), entry);
                        }
                        Err(err) => {
                            tracing::warn!(path = %path.display(), line = line_no + 1, %err, "Skipping malformed ledger line");
                        }
                    }
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let file = OpenOptions::new().create(true).append(true).open(&path).await?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened download ledger");
        Ok(Self { path, entries, file })
    }

    /// Ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest entry for a paper.
    #[must_use]
    pub fn get(&self, paper_key: &str) -> Option<&DownloadRecord> {
        self.entries.get(paper_key)
    }

    /// True when the paper was downloaded and its file still exists.
    #[must_use]
    pub fn is_complete(&self, paper_key: &str) -> bool {
        self.entries.get(paper_key).is_some_and(|e| e.completed && e.local_path.is_file())
    }

    /// Number of papers with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and flush it to disk.
    pub async fn record(&mut self, entry: DownloadRecord) -> ExportResult<()> {
        let mut line = serde_json::to_string(&entry).map_err(|e| ExportError::Ledger(e.to_string()))?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await?;
        self.file.sync_data().await?;

        self.entries.insert(entry.paper_key.clone(), entry);
        Ok(())
    }
}

#[cfg(test)]
impl DownloadLedger {
    /// Ledger whose appends fail, for exercising write errors.
    pub(super) async fn open_read_only(dir: &Path) -> ExportResult<Self> {
        let path = dir.join(LEDGER_FILE);
        tokio::fs::write(&path, b"").await?;
        let file = OpenOptions::new().read(true).open(&path).await?;
        Ok(Self { path, entries: HashMap::new(), file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ledger_round_trip_last_entry_wins() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("pubmed_1.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        {
            let mut ledger = DownloadLedger::open(dir.path()).await.unwrap();
            ledger.record(DownloadRecord::failed("pubmed:1", &pdf, "timeout")).await.unwrap();
            ledger.record(DownloadRecord::completed("pubmed:1", &pdf)).await.unwrap();
            ledger.record(DownloadRecord::failed("arxiv:2", dir.path().join("x.pdf"), "404")).await.unwrap();
        }

        let ledger = DownloadLedger::open(dir.path()).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(ledger.is_complete("pubmed:1"));
        assert!(!ledger.is_complete("arxiv:2"));
        assert_eq!(ledger.get("arxiv:2").unwrap().error.as_deref(), Some("404"));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&DownloadRecord::failed("arxiv:1", "a.pdf", "x")).unwrap();
        std::fs::write(dir.path().join(LEDGER_FILE), format!("{{not json\n{good}\n\n")).unwrap();

        let ledger = DownloadLedger::open(dir.path()).await.unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_completed_entry_with_missing_file_is_not_complete() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = DownloadLedger::open(dir.path()).await.unwrap();
        ledger.record(DownloadRecord::completed("arxiv:9", dir.path().join("gone.pdf"))).await.unwrap();
        assert!(!ledger.is_complete("arxiv:9"));
    }
}
