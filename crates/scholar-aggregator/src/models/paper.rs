//! Normalized paper record shared by every source.

use serde::{Deserialize, Serialize};

use super::SourceKind;

/// A research paper normalized from one source's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Identifier within the source (arXiv id, PMID, S2 paper id).
    pub id: String,

    /// Source the record was parsed from.
    pub source: SourceKind,

    /// Paper title.
    #[serde(default)]
    pub title: String,

    /// Author display names in source order.
    #[serde(default)]
    pub authors: Vec<String>,

    /// Publication year.
    #[serde(default)]
    pub year: Option<i32>,

    /// Paper abstract.
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    /// Journal or conference name.
    #[serde(default)]
    pub venue: Option<String>,

    /// Print or electronic ISSN of the venue, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issn: Option<String>,

    /// Digital Object Identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// Landing page on the source's site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Number of citations (only Semantic Scholar reports this).
    #[serde(default)]
    pub citation_count: Option<u32>,

    /// Direct PDF link.
    #[serde(default)]
    pub pdf_url: Option<String>,

    /// Journal metrics from the static reference table.
    #[serde(default)]
    pub metrics: JournalMetrics,
}

impl PaperRecord {
    /// Create a record with only identity and title set.
    #[must_use]
    pub fn new(source: SourceKind, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            title: title.into(),
            authors: Vec::new(),
            year: None,
            abstract_text: None,
            venue: None,
            issn: None,
            doi: None,
            url: None,
            citation_count: None,
            pdf_url: None,
            metrics: JournalMetrics::default(),
        }
    }

    /// Global identity: `source:id`.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }

    /// Citation count or 0 if not available.
    #[must_use]
    pub fn citations(&self) -> u32 {
        self.citation_count.unwrap_or(0)
    }

    /// Author names joined with `"; "`.
    #[must_use]
    pub fn author_names(&self) -> String {
        self.authors.join("; ")
    }

    /// Number of populated optional fields, used to pick the richer duplicate.
    #[must_use]
    pub fn populated_fields(&self) -> usize {
        [
            !self.authors.is_empty(),
            self.year.is_some(),
            self.abstract_text.as_deref().is_some_and(|s| !s.is_empty()),
            self.venue.is_some(),
            self.issn.is_some(),
            self.doi.is_some(),
            self.url.is_some(),
            self.citation_count.is_some(),
            self.pdf_url.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// Fill empty fields from another record describing the same paper.
    pub fn absorb(&mut self, other: Self) {
        if self.authors.is_empty() {
            self.authors = other.authors;
        }
        if self.abstract_text.as_deref().is_none_or(str::is_empty) {
            self.abstract_text = other.abstract_text.or(self.abstract_text.take());
        }
        self.year = self.year.or(other.year);
        self.venue = self.venue.take().or(other.venue);
        self.issn = self.issn.take().or(other.issn);
        self.doi = self.doi.take().or(other.doi);
        self.url = self.url.take().or(other.url);
        self.citation_count = self.citation_count.or(other.citation_count);
        self.pdf_url = self.pdf_url.take().or(other.pdf_url);
        if self.metrics.is_empty() {
            self.metrics = other.metrics;
        }
    }
}

/// Journal ranking metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalMetrics {
    /// Journal impact factor.
    #[serde(default)]
    pub impact_factor: Option<f64>,

    /// JCR quartile (`Q1`..`Q4`).
    #[serde(default)]
    pub jcr_quartile: Option<String>,

    /// CAS division (`B1`..`B4`).
    #[serde(default)]
    pub cas_quartile: Option<String>,
}

impl JournalMetrics {
    /// True when no metric is known.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.impact_factor.is_none() && self.jcr_quartile.is_none() && self.cas_quartile.is_none()
    }
}
