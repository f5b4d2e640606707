//! PubMed E-utilities adapter.
//!
//! Endpoints used:
//!   esearch: `{base}/esearch.fcgi` (JSON id list)
//!   efetch:  `{base}/efetch.fcgi`  (PubmedArticleSet XML)

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

use super::{PaperSource, collapse_whitespace, leading_year, non_empty, xml_error};
use crate::client::SourceClient;
use crate::config::Config;
use crate::error::{SourceError, SourceResult};
use crate::models::{Filter, PaperRecord, SourceKind};

/// PubMed search adapter.
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: SourceClient,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(default, rename = "ERROR")]
    error: Option<String>,
}

impl PubMedSource {
    /// Create the adapter.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client: SourceClient::new("pubmed", &config.pubmed, config)?,
            base_url: config.pubmed.base_url.clone(),
            api_key: config.pubmed.api_key.clone(),
        })
    }

    fn params(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    /// Search PubMed and return PMIDs in relevance order.
    async fn esearch(&self, term: &str, max: usize) -> SourceResult<Vec<String>> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let params = self.params(vec![
            ("db", "pubmed".to_string()),
            ("term", term.to_string()),
            ("retmax", max.to_string()),
            ("retmode", "json".to_string()),
        ]);

        let response: ESearchResponse = self.client.get_json(&url, &params).await?;
        if let Some(error) = response.esearchresult.error {
            return Err(SourceError::bad_request(error));
        }

        tracing::debug!(count = response.esearchresult.idlist.len(), "PubMed esearch returned PMIDs");
        Ok(response.esearchresult.idlist)
    }

    /// Fetch article XML for PMIDs and parse it.
    async fn efetch(&self, pmids: &[String]) -> SourceResult<Vec<PaperRecord>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/efetch.fcgi", self.base_url);
        let params = self.params(vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ]);

        let xml = self.client.get_text(&url, &params).await?;
        parse_article_set(&xml)
    }
}

#[async_trait::async_trait]
impl PaperSource for PubMedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::PubMed
    }

    async fn search(&self, query: &str, filter: &Filter) -> SourceResult<Vec<PaperRecord>> {
        let Some(term) = build_term(query, filter) else {
            return Ok(Vec::new());
        };

        let pmids = self.esearch(&term, filter.per_source_limit()).await?;
        let mut records = self.efetch(&pmids).await?;

        // Keep esearch's relevance order.
        let rank: HashMap<&str, usize> =
            pmids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        records.sort_by_key(|r| rank.get(r.id.as_str()).copied().unwrap_or(usize::MAX));
        Ok(records)
    }

    async fn fetch_detail(&self, id: &str) -> SourceResult<PaperRecord> {
        let id = id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(SourceError::not_found(format!("PubMed id '{id}' is not a PMID")));
        }

        self.efetch(&[id.to_string()])
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| SourceError::not_found(format!("PubMed article {id}")))
    }
}

/// Build the esearch term with the year range pushed down.
#[must_use]
pub fn build_term(query: &str, filter: &Filter) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }
    Some(match filter.year_range {
        Some(range) => format!("{query} AND {}:{}[dp]", range.start, range.end),
        None => query.to_string(),
    })
}

#[derive(Default)]
struct Article {
    pmid: String,
    title: String,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    last_name: String,
    fore_name: String,
    collective_name: String,
    journal: String,
    issn: String,
    year: String,
    medline_date: String,
    doi: String,
    pmcid: String,
}

impl Article {
    fn push_text(&mut self, path: &[String], id_type: Option<&str>, text: &str) {
        let target = if path.iter().any(|n| n == "ArticleTitle") {
            &mut self.title
        } else if path.iter().any(|n| n == "AbstractText") {
            match self.abstract_parts.last_mut() {
                Some(part) => part,
                None => return,
            }
        } else if ends_with(path, &["MedlineCitation", "PMID"]) {
            if !self.pmid.is_empty() {
                return;
            }
            &mut self.pmid
        } else if ends_with(path, &["Author", "LastName"]) {
            &mut self.last_name
        } else if ends_with(path, &["Author", "ForeName"]) {
            &mut self.fore_name
        } else if ends_with(path, &["Author", "CollectiveName"]) {
            &mut self.collective_name
        } else if ends_with(path, &["Journal", "Title"]) {
            &mut self.journal
        } else if ends_with(path, &["Journal", "ISSN"]) {
            &mut self.issn
        } else if ends_with(path, &["PubDate", "Year"]) {
            &mut self.year
        } else if ends_with(path, &["PubDate", "MedlineDate"]) {
            &mut self.medline_date
        } else if ends_with(path, &["PubmedData", "ArticleIdList", "ArticleId"]) {
            match id_type {
                Some("doi") => &mut self.doi,
                Some("pmc") => &mut self.pmcid,
                _ => return,
            }
        } else {
            return;
        };
        target.push_str(text);
    }

    fn finish_author(&mut self) {
        let last = collapse_whitespace(&std::mem::take(&mut self.last_name));
        let fore = collapse_whitespace(&std::mem::take(&mut self.fore_name));
        let collective = collapse_whitespace(&std::mem::take(&mut self.collective_name));

        let name = match (last.is_empty(), fore.is_empty()) {
            (false, false) => format!("{last} {fore}"),
            (false, true) => last,
            _ => collective,
        };
        if !name.is_empty() {
            self.authors.push(name);
        }
    }

    fn into_record(self) -> Option<PaperRecord> {
        let pmid = self.pmid.trim().to_string();
        if pmid.is_empty() {
            return None;
        }

        let mut record = PaperRecord::new(SourceKind::PubMed, pmid.clone(), collapse_whitespace(&self.title));
        record.url = Some(format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"));
        record.authors = self.authors;

        let parts: Vec<String> = self
            .abstract_parts
            .iter()
            .map(|p| collapse_whitespace(p))
            .filter(|p| !p.is_empty())
            .collect();
        record.abstract_text = (!parts.is_empty()).then(|| parts.join(" "));

        record.venue = non_empty(self.journal);
        record.issn = non_empty(self.issn);
        record.year = leading_year(&self.year).or_else(|| leading_year(&self.medline_date));
        record.doi = non_empty(self.doi);
        record.pdf_url = non_empty(self.pmcid)
            .map(|pmcid| format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{pmcid}/pdf/"));
        Some(record)
    }
}

fn ends_with(path: &[String], tail: &[&str]) -> bool {
    path.len() >= tail.len() && path[path.len() - tail.len()..].iter().zip(tail).all(|(a, b)| a == b)
}

/// Parse an efetch `PubmedArticleSet` document.
pub fn parse_article_set(xml: &str) -> SourceResult<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut article: Option<Article> = None;
    let mut id_type: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "PubmedArticle" => article = Some(Article::default()),
                    "AbstractText" => {
                        if let Some(current) = article.as_mut() {
                            current.abstract_parts.push(String::new());
                        }
                    }
                    "ArticleId" => {
                        id_type = None;
                        for attr in e.attributes() {
                            let attr = attr.map_err(xml_error)?;
                            if attr.key.local_name().as_ref() == b"IdType" {
                                id_type = Some(attr.unescape_value().map_err(xml_error)?.into_owned());
                            }
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Text(t) => {
                if let Some(current) = article.as_mut() {
                    current.push_text(&path, id_type.as_deref(), &t.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(t) => {
                if let Some(current) = article.as_mut() {
                    current.push_text(&path, id_type.as_deref(), &String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(_) => match path.pop().as_deref() {
                Some("Author") => {
                    if let Some(current) = article.as_mut() {
                        current.finish_author();
                    }
                }
                Some("ArticleId") => id_type = None,
                Some("PubmedArticle") => {
                    if let Some(done) = article.take() {
                        match done.into_record() {
                            Some(record) => records.push(record),
                            None => tracing::warn!("Skipping PubMed article without PMID"),
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}
