//! Multi-source search service.
//!
//! Splits a query into sentences, fans each sentence out to every enabled
//! source concurrently, enriches the union with journal metrics and merges
//! it. A failing source is reported next to the results of the others.

pub mod merge;

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use moka::future::Cache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{SearchError, SearchResult};
use crate::metrics::JournalMetricsTable;
use crate::models::{Filter, PaperRecord, SourceKind};
use crate::sources::{PaperSource, register_all_sources};

static SENTENCE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[.?!;](?:\s+|$)|[。？！；]|\r?\n)+").expect("valid regex")
});

/// A search invocation: free text plus filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query; may contain several sentences.
    pub query: String,

    /// Filters and enabled sources.
    #[serde(default, alias = "filter")]
    pub filters: Filter,
}

impl SearchRequest {
    /// Create a request.
    #[must_use]
    pub fn new(query: impl Into<String>, filters: Filter) -> Self {
        Self { query: query.into(), filters }
    }
}

/// What happened to one source for one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    /// Source answered with `count` records.
    Success {
        /// Records returned before merging.
        count: usize,
    },
    /// Source failed after retries, or is not available.
    Failed {
        /// Failure description.
        reason: String,
    },
}

/// Per-source annotation for one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOutcome {
    /// Source the outcome belongs to.
    pub source: SourceKind,

    /// Success or failure.
    #[serde(flatten)]
    pub status: SourceStatus,
}

impl SourceOutcome {
    /// True for a failed source.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, SourceStatus::Failed { .. })
    }
}

/// Results of one query sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceResult {
    /// The sentence as sent to the sources.
    pub sentence: String,

    /// Merged, filtered, ordered records.
    pub papers: Vec<PaperRecord>,

    /// One outcome per enabled source.
    pub sources: Vec<SourceOutcome>,
}

/// Per-source totals across all sentences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    /// Sentences the source answered.
    pub succeeded: usize,
    /// Sentences the source failed.
    pub failed: usize,
    /// Records returned before merging.
    pub records: usize,
    /// Most recent failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Outcome of [`SearchService::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Query as submitted.
    pub query: String,

    /// Per-sentence results, in query order.
    pub sentences: Vec<SentenceResult>,

    /// Concatenated results, deduplicated across sentences (first wins).
    pub papers: Vec<PaperRecord>,

    /// Aggregated annotations keyed by source.
    pub sources: BTreeMap<SourceKind, SourceSummary>,

    /// True if cancellation stopped the search before every sentence ran.
    pub cancelled: bool,
}

impl SearchResponse {
    /// Sources that failed at least once.
    #[must_use]
    pub fn failed_sources(&self) -> Vec<SourceKind> {
        self.sources.iter().filter(|(_, s)| s.failed > 0).map(|(k, _)| *k).collect()
    }
}

/// Incremental progress notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A sentence is about to be fanned out.
    SentenceStarted {
        /// 0-based sentence index.
        index: usize,
        /// Number of sentences.
        total: usize,
        /// Sentence text.
        sentence: String,
    },
    /// A source answered.
    SourceCompleted {
        /// 0-based sentence index.
        index: usize,
        /// Source.
        source: SourceKind,
        /// Records returned.
        count: usize,
    },
    /// A source failed.
    SourceFailed {
        /// 0-based sentence index.
        index: usize,
        /// Source.
        source: SourceKind,
        /// Failure reason.
        reason: String,
    },
    /// A sentence was merged.
    SentenceFinished {
        /// 0-based sentence index.
        index: usize,
        /// Records kept after merging.
        kept: usize,
    },
}

/// Progress sink; send errors (receiver gone) are ignored.
pub type ProgressSender = UnboundedSender<ProgressEvent>;

fn emit(progress: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

/// Split a query on newlines and sentence terminators (ASCII and CJK).
#[must_use]
pub fn split_sentences(query: &str) -> Vec<String> {
    SENTENCE_BREAK
        .split(query)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fan-out coordinator over the registered sources.
#[derive(Clone)]
pub struct SearchService {
    sources: BTreeMap<SourceKind, Arc<dyn PaperSource>>,
    metrics: Arc<JournalMetricsTable>,
    cache: Cache<String, PaperRecord>,
}

impl SearchService {
    /// Create a service over the given adapters.
    #[must_use]
    pub fn new(
        sources: Vec<Arc<dyn PaperSource>>,
        metrics: Arc<JournalMetricsTable>,
        cache_ttl: Duration,
        cache_max_size: u64,
    ) -> Self {
        let sources = sources.into_iter().map(|s| (s.kind(), s)).collect();
        let cache = Cache::builder().max_capacity(cache_max_size).time_to_live(cache_ttl).build();
        Self { sources, metrics, cache }
    }

    /// Build every adapter and load the metrics table named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built or the metrics file
    /// cannot be loaded.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let metrics = match &config.journal_metrics_path {
            Some(path) => JournalMetricsTable::load(path)?,
            None => {
                tracing::warn!("JOURNAL_METRICS_PATH not set; impact factor and quartile filters will reject every record");
                JournalMetricsTable::empty()
            }
        };
        Ok(Self::new(
            register_all_sources(config)?,
            Arc::new(metrics),
            config.cache_ttl,
            config.cache_max_size,
        ))
    }

    /// Registered sources.
    pub fn source_kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.sources.keys().copied()
    }

    /// The journal metrics table.
    #[must_use]
    pub fn metrics(&self) -> &JournalMetricsTable {
        &self.metrics
    }

    /// Run a search.
    ///
    /// Fails before any request if the filter is invalid or the query has no
    /// sentences. Source failures never fail the search; they are reported
    /// in the response.
    pub async fn search(
        &self,
        request: &SearchRequest,
        progress: Option<&ProgressSender>,
        cancel: &CancellationToken,
    ) -> SearchResult<SearchResponse> {
        let filter = &request.filters;
        filter.validate()?;

        let sentences = split_sentences(&request.query);
        if sentences.is_empty() {
            return Err(SearchError::InvalidQuery("query is empty".to_string()));
        }

        let enabled = filter.enabled_sources();
        tracing::info!(sentences = sentences.len(), sources = ?enabled, "Starting search");

        let mut response = SearchResponse {
            query: request.query.clone(),
            sentences: Vec::with_capacity(sentences.len()),
            papers: Vec::new(),
            sources: enabled.iter().map(|k| (*k, SourceSummary::default())).collect(),
            cancelled: false,
        };
        let mut seen = HashSet::new();
        let total = sentences.len();

        for (index, sentence) in sentences.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(completed = index, total, "Search cancelled");
                response.cancelled = true;
                break;
            }

            emit(progress, ProgressEvent::SentenceStarted { index, total, sentence: sentence.clone() });
            let result = self.search_sentence(index, sentence, &enabled, filter, progress).await;

            for outcome in &result.sources {
                let summary = response.sources.entry(outcome.source).or_default();
                match &outcome.status {
                    SourceStatus::Success { count } => {
                        summary.succeeded += 1;
                        summary.records += count;
                    }
                    SourceStatus::Failed { reason } => {
                        summary.failed += 1;
                        summary.last_error = Some(reason.clone());
                    }
                }
            }

            for paper in &result.papers {
                if seen.insert(merge::dedup_key(paper)) {
                    response.papers.push(paper.clone());
                }
            }

            emit(progress, ProgressEvent::SentenceFinished { index, kept: result.papers.len() });
            response.sentences.push(result);
        }

        tracing::info!(
            papers = response.papers.len(),
            failed = ?response.failed_sources(),
            cancelled = response.cancelled,
            "Search finished"
        );
        Ok(response)
    }

    async fn search_sentence(
        &self,
        index: usize,
        sentence: String,
        enabled: &[SourceKind],
        filter: &Filter,
        progress: Option<&ProgressSender>,
    ) -> SentenceResult {
        let mut outcomes = Vec::with_capacity(enabled.len());
        let mut by_source: BTreeMap<SourceKind, Vec<PaperRecord>> = BTreeMap::new();
        let mut pending = FuturesUnordered::new();

        for kind in enabled {
            match self.sources.get(kind) {
                Some(source) => {
                    let source = Arc::clone(source);
                    let query = sentence.as_str();
                    pending.push(async move { (source.kind(), source.search(query, filter).await) });
                }
                None => {
                    let reason = SearchError::unavailable(*kind, "source is not registered").to_string();
                    emit(progress, ProgressEvent::SourceFailed { index, source: *kind, reason: reason.clone() });
                    outcomes.push(SourceOutcome { source: *kind, status: SourceStatus::Failed { reason } });
                }
            }
        }

        while let Some((kind, result)) = pending.next().await {
            match result {
                Ok(records) => {
                    let count = records.len();
                    tracing::debug!(source = %kind, count, "source answered");
                    emit(progress, ProgressEvent::SourceCompleted { index, source: kind, count });
                    outcomes.push(SourceOutcome { source: kind, status: SourceStatus::Success { count } });
                    by_source.insert(kind, records);
                }
                Err(error) => {
                    tracing::warn!(source = %kind, %error, "source failed");
                    let reason = error.to_string();
                    emit(progress, ProgressEvent::SourceFailed { index, source: kind, reason: reason.clone() });
                    outcomes.push(SourceOutcome { source: kind, status: SourceStatus::Failed { reason } });
                }
            }
        }
        drop(pending);

        outcomes.sort_by_key(|o| o.source);

        let mut union: Vec<PaperRecord> = by_source.into_values().flatten().collect();
        for record in &mut union {
            self.metrics.enrich(record);
        }

        SentenceResult { papers: merge::merge(union, filter), sources: outcomes, sentence }
    }

    /// Look up one paper, enriched with journal metrics. Cached by `source:id`.
    pub async fn fetch_detail(&self, kind: SourceKind, id: &str) -> SearchResult<PaperRecord> {
        let key = format!("{kind}:{}", id.trim());
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let source = self
            .sources
            .get(&kind)
            .ok_or_else(|| SearchError::unavailable(kind, "source is not registered"))?;

        let mut record = source.fetch_detail(id).await?;
        self.metrics.enrich(&mut record);
        self.cache.insert(key, record.clone()).await;
        Ok(record)
    }

    /// Papers citing, or referenced by, one paper, enriched with journal metrics.
    ///
    /// Records keep the source's order. Sources without a citation graph
    /// answer with an empty list.
    pub async fn citation_graph(
        &self,
        kind: SourceKind,
        id: &str,
        direction: CitationDirection,
        limit: usize,
    ) -> SearchResult<Vec<PaperRecord>> {
        let source = self
            .sources
            .get(&kind)
            .ok_or_else(|| SearchError::unavailable(kind, "source is not registered"))?;

        let mut records = match direction {
            CitationDirection::Citations => source.citations(id, limit).await?,
            CitationDirection::References => source.references(id, limit).await?,
        };
        for record in &mut records {
            self.metrics.enrich(record);
        }

        tracing::info!(source = %kind, id, %direction, count = records.len(), "Fetched citation graph");
        Ok(records)
    }
}

/// Which side of the citation graph to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationDirection {
    /// Papers that cite the given paper.
    Citations,
    /// Papers the given paper cites.
    References,
}

impl std::fmt::Display for CitationDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Citations => "citations",
            Self::References => "references",
        })
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("journals", &self.metrics.len())
            .finish()
    }
}
