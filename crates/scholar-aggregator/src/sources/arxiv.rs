//! arXiv Atom feed adapter.
//!
//! Endpoint: `GET {base}?search_query=..&start=0&max_results=..&sortBy=submittedDate&sortOrder=descending`
//! for search and `GET {base}?id_list=..` for detail lookups. The feed is
//! parsed with quick-xml's event reader.

use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use super::{PaperSource, collapse_whitespace, leading_year, non_empty, xml_error};
use crate::client::SourceClient;
use crate::config::Config;
use crate::error::{SourceError, SourceResult};
use crate::models::{Filter, PaperRecord, SourceKind};

/// Field prefixes that mark a query as already using arXiv syntax.
const FIELD_PREFIXES: [&str; 4] = ["ti:", "abs:", "au:", "cat:"];

static BOOLEAN_OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(AND|OR|ANDNOT)\b").expect("valid regex"));

/// arXiv search adapter.
#[derive(Debug, Clone)]
pub struct ArxivSource {
    client: SourceClient,
    base_url: String,
}

impl ArxivSource {
    /// Create the adapter.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client: SourceClient::new("arxiv", &config.arxiv, config)?,
            base_url: config.arxiv.base_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl PaperSource for ArxivSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    async fn search(&self, query: &str, filter: &Filter) -> SourceResult<Vec<PaperRecord>> {
        let Some(search_query) = build_search_query(query, filter) else {
            return Ok(Vec::new());
        };

        tracing::debug!(%search_query, "arXiv search");
        let params = [
            ("search_query", search_query),
            ("start", "0".to_string()),
            ("max_results", filter.per_source_limit().to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];

        let body = self.client.get_text(&self.base_url, &params).await?;
        parse_feed(&body)
    }

    async fn fetch_detail(&self, id: &str) -> SourceResult<PaperRecord> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SourceError::not_found("arXiv id is empty"));
        }

        let params = [("id_list", id.to_string()), ("max_results", "1".to_string())];
        let body = self.client.get_text(&self.base_url, &params).await?;

        match parse_feed(&body) {
            Ok(records) => records
                .into_iter()
                .next()
                .ok_or_else(|| SourceError::not_found(format!("arXiv paper {id}"))),
            // arXiv answers malformed ids with an error entry.
            Err(SourceError::BadRequest { message }) => {
                Err(SourceError::not_found(format!("arXiv paper {id}: {message}")))
            }
            Err(err) => Err(err),
        }
    }
}

/// Build the `search_query` value, or `None` for an empty query.
#[must_use]
pub fn build_search_query(query: &str, filter: &Filter) -> Option<String> {
    let query = query.trim();
    if query.is_empty() {
        return None;
    }

    let advanced = uses_arxiv_syntax(query);
    let mut search_query = if advanced {
        query.replace(" andnot ", " ANDNOT ").replace(" and ", " AND ").replace(" or ", " OR ")
    } else {
        let terms: Vec<&str> = query.split_whitespace().collect();
        if let [term] = terms.as_slice() {
            format!("(ti:{term} OR abs:{term})")
        } else {
            let phrase = terms.join(" ");
            format!("(ti:\"{phrase}\" OR abs:\"{phrase}\")")
        }
    };

    if let Some(range) = filter.year_range {
        // The date clause must bind to the whole user expression.
        if advanced {
            search_query = format!("({search_query})");
        }
        search_query.push_str(&format!(
            " AND submittedDate:[{}01010000 TO {}12312359]",
            range.start, range.end
        ));
    }

    Some(search_query)
}

fn uses_arxiv_syntax(query: &str) -> bool {
    FIELD_PREFIXES.iter().any(|prefix| query.contains(prefix)) || BOOLEAN_OPERATOR.is_match(query)
}

#[derive(Clone, Copy)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
    Doi,
    JournalRef,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"id" => Some(Self::Id),
            b"title" => Some(Self::Title),
            b"summary" => Some(Self::Summary),
            b"published" => Some(Self::Published),
            b"name" => Some(Self::AuthorName),
            b"doi" => Some(Self::Doi),
            b"journal_ref" => Some(Self::JournalRef),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Entry {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    author_name: String,
    pdf_url: Option<String>,
    doi: String,
    journal_ref: String,
}

impl Entry {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Id => &mut self.id,
            Field::Title => &mut self.title,
            Field::Summary => &mut self.summary,
            Field::Published => &mut self.published,
            Field::AuthorName => &mut self.author_name,
            Field::Doi => &mut self.doi,
            Field::JournalRef => &mut self.journal_ref,
        };
        target.push_str(text);
    }

    fn finish_author(&mut self) {
        let name = collapse_whitespace(&std::mem::take(&mut self.author_name));
        if !name.is_empty() {
            self.authors.push(name);
        }
    }

    fn read_link(&mut self, element: &BytesStart<'_>) -> SourceResult<()> {
        let mut href = None;
        let mut is_pdf = false;
        for attr in element.attributes() {
            let attr = attr.map_err(xml_error)?;
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(attr.unescape_value().map_err(xml_error)?.into_owned()),
                b"title" => is_pdf = attr.unescape_value().map_err(xml_error)? == "pdf",
                _ => {}
            }
        }
        if is_pdf && self.pdf_url.is_none() {
            self.pdf_url = href;
        }
        Ok(())
    }

    fn into_record(self) -> SourceResult<Option<PaperRecord>> {
        let raw_id = self.id.trim();
        if raw_id.contains("/api/errors") {
            let message = collapse_whitespace(&self.summary);
            return Err(SourceError::bad_request(if message.is_empty() { raw_id.to_string() } else { message }));
        }

        let id = raw_id.rsplit_once("abs/").map_or(raw_id, |(_, id)| id).to_string();
        if id.is_empty() {
            return Ok(None);
        }

        let mut record = PaperRecord::new(SourceKind::Arxiv, id, collapse_whitespace(&self.title));
        record.url = Some(raw_id.to_string());
        record.authors = self.authors;
        record.year = leading_year(&self.published);
        record.abstract_text = non_empty(self.summary);
        record.doi = non_empty(self.doi);
        record.venue = Some(non_empty(self.journal_ref).unwrap_or_else(|| "arXiv".to_string()));
        record.pdf_url = self.pdf_url;
        Ok(Some(record))
    }
}

/// Parse an Atom feed into records, in feed order.
pub fn parse_feed(xml: &str) -> SourceResult<Vec<PaperRecord>> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut entry: Option<Entry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                let tag = e.local_name();
                if tag.as_ref() == b"entry" {
                    entry = Some(Entry::default());
                } else if let Some(current) = entry.as_mut() {
                    if tag.as_ref() == b"link" {
                        current.read_link(&e)?;
                    } else {
                        field = Field::from_tag(tag.as_ref());
                    }
                }
            }
            Event::Empty(e) => {
                if let (b"link", Some(current)) = (e.local_name().as_ref(), entry.as_mut()) {
                    current.read_link(&e)?;
                }
            }
            Event::Text(t) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    current.push(f, &t.unescape().map_err(xml_error)?);
                }
            }
            Event::CData(t) => {
                if let (Some(current), Some(f)) = (entry.as_mut(), field) {
                    current.push(f, &String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Event::End(e) => {
                field = None;
                match e.local_name().as_ref() {
                    b"entry" => {
                        if let Some(done) = entry.take() {
                            records.extend(done.into_record()?);
                        }
                    }
                    b"author" => {
                        if let Some(current) = entry.as_mut() {
                            current.finish_author();
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    tracing::debug!(count = records.len(), "parsed arXiv feed");
    Ok(records)
}
