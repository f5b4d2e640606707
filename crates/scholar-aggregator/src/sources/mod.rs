//! Source adapters: arXiv, PubMed and Semantic Scholar.
//!
//! Each adapter turns a query plus [`Filter`] into one or more requests
//! against its API, pushes down the filter fields the API understands, and
//! normalizes the response into [`PaperRecord`]s in API order.

pub mod arxiv;
pub mod pubmed;
pub mod semantic_scholar;

use std::sync::Arc;

pub use arxiv::ArxivSource;
pub use pubmed::PubMedSource;
pub use semantic_scholar::SemanticScholarSource;

use crate::config::Config;
use crate::error::{SourceError, SourceResult};
use crate::models::{Filter, PaperRecord, SourceKind};

/// A literature API the search service can fan out to.
#[async_trait::async_trait]
pub trait PaperSource: Send + Sync {
    /// Which source this adapter serves.
    fn kind(&self) -> SourceKind;

    /// Search with filter pushdown. Results keep the API's order.
    async fn search(&self, query: &str, filter: &Filter) -> SourceResult<Vec<PaperRecord>>;

    /// Look up one paper by its source-local id.
    async fn fetch_detail(&self, id: &str) -> SourceResult<PaperRecord>;

    /// Papers citing `id`, at most `limit`.
    ///
    /// Sources without a citation graph return no records.
    async fn citations(&self, id: &str, limit: usize) -> SourceResult<Vec<PaperRecord>> {
        tracing::debug!(source = %self.kind(), id, limit, "Citation graph not available");
        Ok(Vec::new())
    }

    /// Papers referenced by `id`, at most `limit`.
    ///
    /// Sources without a citation graph return no records.
    async fn references(&self, id: &str, limit: usize) -> SourceResult<Vec<PaperRecord>> {
        tracing::debug!(source = %self.kind(), id, limit, "Citation graph not available");
        Ok(Vec::new())
    }
}

/// Build every source adapter from the configuration.
///
/// # Errors
///
/// Returns error if an HTTP client cannot be created or an API key is not a
/// valid header value.
pub fn register_all_sources(config: &Config) -> anyhow::Result<Vec<Arc<dyn PaperSource>>> {
    Ok(vec![
        Arc::new(ArxivSource::new(config)?),
        Arc::new(PubMedSource::new(config)?),
        Arc::new(SemanticScholarSource::new(config)?),
    ])
}

/// Collapse runs of whitespace into single spaces and trim.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Leading four-digit year of a date string (`2021-03-04`, `2021 Mar`).
pub(crate) fn leading_year(text: &str) -> Option<i32> {
    let digits: String = text.trim().chars().take(4).collect();
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Map a quick-xml error of any flavour into a parse error.
pub(crate) fn xml_error(err: impl std::fmt::Display) -> SourceError {
    SourceError::parse(format!("XML: {err}"))
}

fn non_empty(text: String) -> Option<String> {
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}
