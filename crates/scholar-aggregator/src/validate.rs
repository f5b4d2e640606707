//! Domain validation of exported CSV files.
//!
//! Each row is judged by a [`RelevanceJudge`] and copied to either
//! `<stem>_validated.csv` or `<stem>_excluded.csv` next to the input.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::StringRecord;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{ExportError, ExportResult};
use crate::llm::RelevanceJudge;
use crate::models::{PaperRecord, SourceKind};

/// Result of validating one CSV file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// CSV of rows judged relevant, next to the input.
    pub validated_path: PathBuf,
    /// CSV of rows judged irrelevant.
    pub excluded_path: PathBuf,
    /// Data rows read from the input, header excluded.
    pub total: usize,
    /// Rows written to `validated_path`.
    pub validated: usize,
    /// Rows written to `excluded_path`.
    pub excluded: usize,
    /// Rows whose judgement errored; written to neither file.
    pub failed: usize,
    /// Set when cancellation stopped the run before every row was judged.
    pub cancelled: bool,
}

/// Column positions of the fields sent to the judge.
struct Columns {
    title: usize,
    authors: Option<usize>,
    abstract_text: Option<usize>,
    year: Option<usize>,
    venue: Option<usize>,
    source: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> ExportResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
        Ok(Self {
            title: find("title").ok_or_else(|| ExportError::MissingColumn("title".to_string()))?,
            authors: find("authors"),
            abstract_text: find("abstract"),
            year: find("year"),
            venue: find("venue"),
            source: find("source"),
        })
    }

    fn to_record(&self, index: usize, row: &StringRecord) -> PaperRecord {
        let cell = |column: Option<usize>| {
            column.and_then(|i| row.get(i)).map(str::trim).filter(|v| !v.is_empty() && *v != "N/A")
        };

        let source = cell(self.source).and_then(|s| s.parse().ok()).unwrap_or(SourceKind::SemanticScholar);
        let mut record = PaperRecord::new(source, format!("row{}", index + 1), cell(Some(self.title)).unwrap_or_default());
        record.authors = cell(self.authors)
            .map(|a| a.split(';').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();
        record.abstract_text = cell(self.abstract_text).map(str::to_string);
        record.year = cell(self.year).and_then(|y| y.parse().ok());
        record.venue = cell(self.venue).map(str::to_string);
        record
    }
}

/// Splits a CSV into in-domain and out-of-domain rows.
#[derive(Clone)]
pub struct DomainValidator {
    judge: Arc<dyn RelevanceJudge>,
    workers: usize,
}

impl DomainValidator {
    /// Create a validator issuing at most `workers` concurrent judgements.
    #[must_use]
    pub fn new(judge: Arc<dyn RelevanceJudge>, workers: usize) -> Self {
        Self { judge, workers: workers.max(1) }
    }

    /// Output paths for `input`: `<stem>_validated.csv` and `<stem>_excluded.csv`.
    #[must_use]
    pub fn output_paths(input: &Path) -> (PathBuf, PathBuf) {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        (
            input.with_file_name(format!("{stem}_validated.csv")),
            input.with_file_name(format!("{stem}_excluded.csv")),
        )
    }

    /// Judge every row of `path` against `domain` and write both output files.
    ///
    /// Output rows keep the input order. After cancellation no new rows are
    /// judged; rows never judged are left out of both files.
    pub async fn validate_csv(
        &self,
        path: &Path,
        domain: &str,
        cancel: &CancellationToken,
    ) -> ExportResult<ValidationReport> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let columns = Columns::locate(&headers)?;
        let rows = reader.records().collect::<Result<Vec<_>, _>>()?;

        let (validated_path, excluded_path) = Self::output_paths(path);
        let mut report = ValidationReport {
            validated_path,
            excluded_path,
            total: rows.len(),
            ..ValidationReport::default()
        };
        tracing::info!(path = %path.display(), rows = rows.len(), domain, "Validating CSV");

        let mut validated = csv::Writer::from_path(&report.validated_path)?;
        let mut excluded = csv::Writer::from_path(&report.excluded_path)?;
        validated.write_record(&headers)?;
        excluded.write_record(&headers)?;

        let columns = &columns;
        let mut verdicts = futures::stream::iter(rows.into_iter().enumerate())
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|(index, row)| async move {
                let record = columns.to_record(index, &row);
                let verdict = self.judge.judge(&record, domain).await;
                (index, row, verdict)
            })
            .buffered(self.workers);

        while let Some((index, row, verdict)) = verdicts.next().await {
            match verdict {
                Ok(true) => {
                    validated.write_record(&row)?;
                    report.validated += 1;
                }
                Ok(false) => {
                    excluded.write_record(&row)?;
                    report.excluded += 1;
                }
                Err(err) => {
                    tracing::warn!(row = index + 1, %err, "Judgement failed, row skipped");
                    report.failed += 1;
                }
            }
        }

        validated.flush()?;
        excluded.flush()?;
        report.cancelled = cancel.is_cancelled();

        tracing::info!(
            validated = report.validated,
            excluded = report.excluded,
            failed = report.failed,
            "Validation finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for DomainValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainValidator").field("workers", &self.workers).finish()
    }
}
