//! CSV rendering of paper records.

use std::borrow::Cow;
use std::io::Write;
use std::path::Path;

use crate::error::ExportResult;
use crate::models::PaperRecord;

/// Fixed column order of exported files.
pub const CSV_COLUMNS: [&str; 10] = [
    "title",
    "authors",
    "year",
    "venue",
    "citations",
    "impact_factor",
    "jcr_quartile",
    "cas_quartile",
    "source",
    "pdf_url",
];

/// Placeholder for metrics the journal table does not know.
pub const MISSING: &str = "N/A";

/// Prefix cells that a spreadsheet would evaluate as a formula.
#[must_use]
pub fn guard_formula(cell: &str) -> Cow<'_, str> {
    if cell.starts_with(['=', '+', '-', '@']) {
        Cow::Owned(format!("'{cell}"))
    } else {
        Cow::Borrowed(cell)
    }
}

fn row(record: &PaperRecord) -> [String; 10] {
    let metrics = &record.metrics;
    [
        record.title.clone(),
        record.author_names(),
        record.year.map(|y| y.to_string()).unwrap_or_default(),
        record.venue.clone().unwrap_or_default(),
        record.citations().to_string(),
        metrics.impact_factor.map_or_else(|| MISSING.to_string(), |v| v.to_string()),
        metrics.jcr_quartile.clone().unwrap_or_else(|| MISSING.to_string()),
        metrics.cas_quartile.clone().unwrap_or_else(|| MISSING.to_string()),
        record.source.to_string(),
        record.pdf_url.clone().unwrap_or_default(),
    ]
}

/// Write records with a header row.
pub fn write_csv<W: Write>(records: &[PaperRecord], writer: W) -> ExportResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_COLUMNS)?;
    for record in records {
        csv.write_record(row(record).iter().map(|cell| guard_formula(cell).into_owned()))?;
    }
    csv.flush()?;
    Ok(())
}

/// Render records to an in-memory CSV document.
pub fn to_csv_string(records: &[PaperRecord]) -> ExportResult<String> {
    let mut buf = Vec::new();
    write_csv(records, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write records to `path`, creating parent directories.
pub fn write_csv_file(records: &[PaperRecord], path: &Path) -> ExportResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(records, std::io::BufWriter::new(file))?;
    tracing::info!(path = %path.display(), rows = records.len(), "Wrote CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;

    #[test]
    fn test_guard_formula() {
        assert_eq!(guard_formula("=SUM(A1)"), "'=SUM(A1)");
        assert_eq!(guard_formula("-1"), "'-1");
        assert_eq!(guard_formula("@cmd"), "'@cmd");
        assert_eq!(guard_formula("plain"), "plain");
    }

    #[test]
    fn test_csv_schema_and_placeholders() {
        let mut record = PaperRecord::new(SourceKind::PubMed, "1", "Title, with comma");
        record.authors = vec!["Smith John".to_string(), "Doe Jane".to_string()];
        record.year = Some(2021);
        record.metrics.impact_factor = Some(4.5);

        let text = to_csv_string(&[record]).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("title,authors,year,venue,citations,impact_factor,jcr_quartile,cas_quartile,source,pdf_url")
        );
        assert_eq!(
            lines.next(),
            Some("\"Title, with comma\",Smith John; Doe Jane,2021,,0,4.5,N/A,N/A,pubmed,")
        );
    }

    #[test]
    fn test_formula_title_is_guarded() {
        let record = PaperRecord::new(SourceKind::Arxiv, "1", "=HYPERLINK(\"x\")");
        let text = to_csv_string(&[record]).unwrap();
        assert!(text.contains("'=HYPERLINK"));
    }
}
