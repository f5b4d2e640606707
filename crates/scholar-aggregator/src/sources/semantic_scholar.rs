//! Semantic Scholar Graph API adapter.

use std::collections::HashMap;

use serde::Deserialize;

use super::{PaperSource, non_empty};
use crate::client::{SourceClient, api_key_headers};
use crate::config::{Config, api, fields};
use crate::error::{SourceError, SourceResult};
use crate::models::{Filter, PaperRecord, SourceKind};

/// Semantic Scholar search adapter.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: SourceClient,
    base_url: String,
}

/// `/paper/search` response page.
#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<S2Paper>,
}

/// Paper as returned by the Graph API with our field set.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct S2Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    citation_count: Option<u32>,
    #[serde(default)]
    authors: Vec<S2Author>,
    venue: Option<String>,
    publication_venue: Option<S2Venue>,
    open_access_pdf: Option<S2Pdf>,
    #[serde(default)]
    external_ids: Option<HashMap<String, serde_json::Value>>,
    url: Option<String>,
}

/// `/paper/{id}/citations` or `/paper/{id}/references` response page.
#[derive(Debug, Deserialize)]
struct CitationPage {
    #[serde(default)]
    data: Vec<CitationEdge>,
}

/// One edge of the citation graph; the paper on the other end.
#[derive(Debug, Deserialize)]
struct CitationEdge {
    #[serde(alias = "citingPaper", alias = "citedPaper")]
    paper: Option<S2Paper>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Venue {
    name: Option<String>,
    issn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2Pdf {
    url: Option<String>,
}

impl S2Paper {
    fn into_record(self) -> Option<PaperRecord> {
        let id = self.paper_id.filter(|id| !id.is_empty())?;
        let mut record = PaperRecord::new(
            SourceKind::SemanticScholar,
            id,
            non_empty(self.title.unwrap_or_default()).unwrap_or_default(),
        );

        record.authors = self.authors.into_iter().filter_map(|a| a.name.and_then(non_empty)).collect();
        record.year = self.year;
        record.abstract_text = self.abstract_text.and_then(non_empty);
        record.citation_count = self.citation_count;

        let (venue_name, issn) = self
            .publication_venue
            .map_or((None, None), |v| (v.name.and_then(non_empty), v.issn.and_then(non_empty)));
        record.venue = self.venue.and_then(non_empty).or(venue_name);
        record.issn = issn;

        record.doi = self
            .external_ids
            .as_ref()
            .and_then(|ids| ids.get("DOI"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        record.pdf_url = self.open_access_pdf.and_then(|pdf| pdf.url).and_then(non_empty);
        record.url = self.url;
        Some(record)
    }
}

impl SemanticScholarSource {
    /// Create the adapter; the API key is sent as `x-api-key` when set.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let settings = &config.semantic_scholar;
        let headers = api_key_headers("x-api-key", settings.api_key.as_deref())?;
        Ok(Self {
            client: SourceClient::with_headers("semanticscholar", settings, config, headers)?,
            base_url: settings.base_url.clone(),
        })
    }
}

impl SemanticScholarSource {
    async fn citation_graph(&self, id: &str, edge: &str, limit: usize) -> SourceResult<Vec<PaperRecord>> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SourceError::not_found("Semantic Scholar id is empty"));
        }

        let url = format!("{}/paper/{}/{}", self.base_url, id, edge);
        let params = [
            ("fields", fields::SEMANTIC_SCHOLAR.join(",")),
            ("limit", limit.clamp(1, api::MAX_CITATION_LIMIT).to_string()),
        ];
        let page: CitationPage = self.client.get_json(&url, &params).await?;
        let records: Vec<PaperRecord> =
            page.data.into_iter().filter_map(|e| e.paper.and_then(S2Paper::into_record)).collect();

        tracing::debug!(id, edge, count = records.len(), "Fetched citation graph");
        Ok(records)
    }
}

/// Query parameters for `/paper/search` with filter pushdown.
#[must_use]
pub fn search_params(query: &str, filter: &Filter) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("query", query.trim().to_string()),
        ("fields", fields::SEMANTIC_SCHOLAR.join(",")),
        ("limit", filter.per_source_limit().to_string()),
    ];
    if let Some(range) = filter.year_range {
        params.push(("year", format!("{}-{}", range.start, range.end)));
    }
    if let Some(min) = filter.min_citations {
        params.push(("minCitationCount", min.to_string()));
    }
    params
}

#[async_trait::async_trait]
impl PaperSource for SemanticScholarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SemanticScholar
    }

    async fn search(&self, query: &str, filter: &Filter) -> SourceResult<Vec<PaperRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/paper/search", self.base_url);
        let page: SearchPage = self.client.get_json(&url, &search_params(query, filter)).await?;
        Ok(page.data.into_iter().filter_map(S2Paper::into_record).collect())
    }

    async fn fetch_detail(&self, id: &str) -> SourceResult<PaperRecord> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SourceError::not_found("Semantic Scholar id is empty"));
        }

        let url = format!("{}/paper/{}", self.base_url, id);
        let params = [("fields", fields::SEMANTIC_SCHOLAR.join(","))];
        let paper: S2Paper = self.client.get_json(&url, &params).await?;
        paper
            .into_record()
            .ok_or_else(|| SourceError::not_found(format!("Semantic Scholar paper {id}")))
    }

    async fn citations(&self, id: &str, limit: usize) -> SourceResult<Vec<PaperRecord>> {
        self.citation_graph(id, "citations", limit).await
    }

    async fn references(&self, id: &str, limit: usize) -> SourceResult<Vec<PaperRecord>> {
        self.citation_graph(id, "references", limit).await
    }
}
