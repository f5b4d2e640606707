//! CSV export and resumable PDF download.
//!
//! [`Exporter::run`] writes the CSV first, then fetches each record's PDF
//! with bounded concurrency. Progress is persisted in a [`DownloadLedger`]
//! so an interrupted run only fetches what is still missing.

mod csv_format;
mod download;
mod ledger;

pub use csv_format::{CSV_COLUMNS, MISSING, guard_formula, to_csv_string, write_csv, write_csv_file};
pub use download::{PdfDownloader, pdf_file_name};
pub use ledger::{DownloadLedger, DownloadRecord, LEDGER_FILE};

use std::collections::HashSet;
use std::path::PathBuf;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{ExportError, ExportResult};
use crate::models::PaperRecord;

/// Options for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Destination of the CSV file.
    pub csv_path: PathBuf,
    /// Fetch PDFs after writing the CSV.
    pub download_pdfs: bool,
    /// Directory for PDFs and the download ledger.
    pub download_dir: PathBuf,
    /// Concurrent downloads.
    pub workers: usize,
}

impl ExportOptions {
    /// Options using the configured download directory and worker count.
    #[must_use]
    pub fn from_config(config: &Config, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            download_pdfs: true,
            download_dir: config.download_dir.clone(),
            workers: config.download_workers,
        }
    }
}

/// One PDF that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDownload {
    /// `source:id` of the paper.
    pub paper_id: String,
    /// PDF URL that was requested.
    pub url: String,
    /// Why the download or its ledger entry failed.
    pub reason: String,
}

/// Outcome of an export run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Where the CSV was written.
    pub csv_path: PathBuf,
    /// PDFs fetched in this run.
    pub downloaded: usize,
    /// Records already downloaded earlier, or repeated in the input.
    pub skipped: usize,
    /// Records with no PDF URL.
    pub without_pdf: usize,
    /// Downloads that failed, one entry per paper.
    pub failed: Vec<FailedDownload>,
    /// True if the run stopped before every download was started.
    pub cancelled: bool,
}

enum Outcome {
    Downloaded,
    Failed(FailedDownload),
}

impl Outcome {
    fn failed(paper_id: &str, url: &str, reason: String) -> Self {
        Self::Failed(FailedDownload { paper_id: paper_id.to_string(), url: url.to_string(), reason })
    }
}

/// Writes CSV files and downloads PDFs.
#[derive(Debug, Clone)]
pub struct Exporter {
    downloader: PdfDownloader,
}

impl Exporter {
    /// Create an exporter with a downloader built from `config`.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self { downloader: PdfDownloader::new(config)? })
    }

    /// Write the CSV and download missing PDFs.
    ///
    /// Failed downloads are itemized in the summary and never abort the
    /// batch. Cancellation stops new downloads from starting; those already
    /// running finish and are recorded.
    pub async fn run(
        &self,
        records: &[PaperRecord],
        options: &ExportOptions,
        cancel: &CancellationToken,
    ) -> ExportResult<ExportSummary> {
        write_csv_file(records, &options.csv_path)?;

        let mut summary = ExportSummary { csv_path: options.csv_path.clone(), ..ExportSummary::default() };
        if !options.download_pdfs {
            return Ok(summary);
        }

        let ledger = DownloadLedger::open(&options.download_dir).await?;
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for record in records {
            let Some(url) = record.pdf_url.as_deref() else {
                summary.without_pdf += 1;
                continue;
            };
            // Copies of one paper share a destination file.
            let key = record.key();
            if ledger.is_complete(&key) || !seen.insert(key) {
                summary.skipped += 1;
                continue;
            }
            pending.push((record, url));
        }

        tracing::info!(
            pending = pending.len(),
            skipped = summary.skipped,
            without_pdf = summary.without_pdf,
            "Starting PDF downloads"
        );

        let ledger = Mutex::new(ledger);
        let mut outcomes = futures::stream::iter(pending)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|(record, url)| self.download_one(record, url, options, &ledger))
            .buffer_unordered(options.workers.max(1));

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Downloaded => summary.downloaded += 1,
                Outcome::Failed(failure) => summary.failed.push(failure),
            }
        }

        summary.cancelled = cancel.is_cancelled();
        tracing::info!(
            downloaded = summary.downloaded,
            failed = summary.failed.len(),
            cancelled = summary.cancelled,
            "PDF downloads finished"
        );
        Ok(summary)
    }

    async fn download_one(
        &self,
        record: &PaperRecord,
        url: &str,
        options: &ExportOptions,
        ledger: &Mutex<DownloadLedger>,
    ) -> Outcome {
        let key = record.key();
        let dest = options.download_dir.join(pdf_file_name(record));

        let (entry, error) = match self.downloader.download(url, &dest).await {
            Ok(_) => (DownloadRecord::completed(&key, &dest), None),
            Err(err) => {
                let reason = match err {
                    ExportError::Download { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::warn!(paper = %key, url, %reason, "PDF download failed");
                (DownloadRecord::failed(&key, &dest, &reason), Some(reason))
            }
        };

        if let Err(err) = ledger.lock().await.record(entry).await {
            tracing::error!(paper = %key, %err, "Could not update download ledger");
            let reason = match error {
                Some(reason) => format!("{reason}; download log not updated: {err}"),
                None => format!("download log not updated: {err}"),
            };
            return Outcome::failed(&key, url, reason);
        }

        match error {
            None => Outcome::Downloaded,
            Some(reason) => Outcome::failed(&key, url, reason),
        }
    }
}
