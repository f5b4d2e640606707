//! Configuration for the literature aggregator.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::models::SourceKind;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// arXiv Atom query endpoint.
    pub const ARXIV_API: &str = "http://export.arxiv.org/api/query";

    /// NCBI E-utilities base URL.
    pub const PUBMED_EUTILS: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

    /// Semantic Scholar Graph API endpoint.
    pub const SEMANTIC_SCHOLAR_GRAPH_API: &str = "https://api.semanticscholar.org/graph/v1";

    /// OpenAI-compatible chat completions base URL.
    pub const LLM_API: &str = "https://api.deepseek.com/v1";

    /// Default chat model.
    pub const LLM_MODEL: &str = "deepseek-chat";

    /// arXiv asks clients to stay at or below one request per second.
    pub const ARXIV_RATE_LIMIT: u32 = 1;

    /// PubMed allows 3 req/s without an API key.
    pub const PUBMED_RATE_LIMIT: u32 = 3;

    /// Semantic Scholar shared pool limit.
    pub const SEMANTIC_SCHOLAR_RATE_LIMIT: u32 = 5;

    /// Chat completions request rate.
    pub const LLM_RATE_LIMIT: u32 = 5;

    /// Per-request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Chat completions can take much longer than search requests.
    pub const LLM_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Attempts per request, including the first one.
    pub const RETRY_MAX_ATTEMPTS: u32 = 3;

    /// First backoff delay.
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Backoff cap.
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

    /// Detail cache TTL (5 minutes).
    pub const CACHE_TTL: Duration = Duration::from_secs(300);

    /// Maximum cache size.
    pub const CACHE_MAX_SIZE: u64 = 1000;

    /// Maximum keepalive connections.
    pub const MAX_KEEPALIVE: usize = 10;

    /// Keepalive expiry.
    pub const KEEPALIVE_EXPIRY: Duration = Duration::from_secs(30);

    /// Concurrent PDF downloads.
    pub const DOWNLOAD_WORKERS: usize = 4;

    /// Concurrent domain validation calls.
    pub const VALIDATE_WORKERS: usize = 4;

    /// Concurrent HTTP requests served.
    pub const SERVER_CONCURRENCY: usize = 64;

    /// Largest page the Graph API serves for citations and references.
    pub const MAX_CITATION_LIMIT: usize = 1000;

    /// Default number of citing or referenced papers returned.
    pub const DEFAULT_CITATION_LIMIT: usize = 100;
}

/// Semantic Scholar field set requested for search and detail lookups.
pub mod fields {
    /// Fields needed to build a `PaperRecord`.
    pub const SEMANTIC_SCHOLAR: &[&str] = &[
        "paperId",
        "title",
        "abstract",
        "year",
        "citationCount",
        "authors",
        "venue",
        "publicationVenue",
        "openAccessPdf",
        "externalIds",
        "url",
    ];
}

/// Endpoint, rate and credentials for one HTTP API.
#[derive(Clone)]
pub struct SourceSettings {
    /// Base URL (overridden in tests with a mock server).
    pub base_url: String,

    /// Maximum requests per second.
    pub requests_per_second: u32,

    /// API key (optional).
    pub api_key: Option<String>,
}

impl SourceSettings {
    fn new(base_url: &str, requests_per_second: u32) -> Self {
        Self { base_url: base_url.to_string(), requests_per_second, api_key: None }
    }

    /// Minimum spacing between two requests.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(1) / self.requests_per_second.max(1)
    }
}

impl std::fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSettings")
            .field("base_url", &self.base_url)
            .field("requests_per_second", &self.requests_per_second)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

/// Chat completions settings for the query assistant.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// Endpoint, rate and key.
    pub endpoint: SourceSettings,

    /// Model name sent with each completion request.
    pub model: String,
}

/// Aggregator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// arXiv endpoint settings.
    pub arxiv: SourceSettings,

    /// PubMed endpoint settings.
    pub pubmed: SourceSettings,

    /// Semantic Scholar endpoint settings.
    pub semantic_scholar: SourceSettings,

    /// Query assistant settings.
    pub llm: LlmSettings,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Request timeout for chat completions.
    pub llm_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Attempts per request, including the first.
    pub max_attempts: u32,

    /// First retry delay.
    pub retry_base_delay: Duration,

    /// Retry delay cap.
    pub retry_max_delay: Duration,

    /// Detail cache TTL.
    pub cache_ttl: Duration,

    /// Maximum cache size.
    pub cache_max_size: u64,

    /// Journal metrics reference table (JSON).
    pub journal_metrics_path: Option<PathBuf>,

    /// Directory for exported CSVs and PDFs.
    pub download_dir: PathBuf,

    /// Concurrent PDF downloads.
    pub download_workers: usize,

    /// Concurrent domain validation calls.
    pub validate_workers: usize,
}

impl Config {
    /// Create a configuration with production endpoints and default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arxiv: SourceSettings::new(api::ARXIV_API, api::ARXIV_RATE_LIMIT),
            pubmed: SourceSettings::new(api::PUBMED_EUTILS, api::PUBMED_RATE_LIMIT),
            semantic_scholar: SourceSettings::new(
                api::SEMANTIC_SCHOLAR_GRAPH_API,
                api::SEMANTIC_SCHOLAR_RATE_LIMIT,
            ),
            llm: LlmSettings {
                endpoint: SourceSettings::new(api::LLM_API, api::LLM_RATE_LIMIT),
                model: api::LLM_MODEL.to_string(),
            },
            request_timeout: api::REQUEST_TIMEOUT,
            llm_timeout: api::LLM_TIMEOUT,
            connect_timeout: api::CONNECT_TIMEOUT,
            max_attempts: api::RETRY_MAX_ATTEMPTS,
            retry_base_delay: api::RETRY_BASE_DELAY,
            retry_max_delay: api::RETRY_MAX_DELAY,
            cache_ttl: api::CACHE_TTL,
            cache_max_size: api::CACHE_MAX_SIZE,
            journal_metrics_path: None,
            download_dir: PathBuf::from("downloads"),
            download_workers: api::DOWNLOAD_WORKERS,
            validate_workers: api::VALIDATE_WORKERS,
        }
    }

    /// Create a test configuration with every endpoint pointing at one mock server.
    ///
    /// Paths: `/arxiv/api/query`, `/pubmed/...`, `/graph/v1/...`, `/llm/v1/...`.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        let fast = |url: String| SourceSettings { base_url: url, requests_per_second: 1000, api_key: None };
        Self {
            arxiv: fast(format!("{base_url}/arxiv/api/query")),
            pubmed: fast(format!("{base_url}/pubmed")),
            semantic_scholar: fast(format!("{base_url}/graph/v1")),
            llm: LlmSettings {
                endpoint: SourceSettings {
                    api_key: Some("test-llm-key".to_string()),
                    ..fast(format!("{base_url}/llm/v1"))
                },
                model: "test-model".to_string(),
            },
            request_timeout: Duration::from_secs(5),
            llm_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            max_attempts: api::RETRY_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(50),
            cache_ttl: Duration::from_secs(0), // No caching in tests
            cache_max_size: 0,
            journal_metrics_path: None,
            download_dir: PathBuf::from("downloads"),
            download_workers: 2,
            validate_workers: 2,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if a numeric variable cannot be parsed.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        config.semantic_scholar.api_key = get("SEMANTIC_SCHOLAR_API_KEY");
        config.pubmed.api_key = get("NCBI_API_KEY");
        config.llm.endpoint.api_key = get("LLM_API_KEY").or_else(|| get("DEEPSEEK_API_KEY"));

        if let Some(url) = get("LLM_BASE_URL") {
            config.llm.endpoint.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("LLM_MODEL") {
            config.llm.model = model;
        }

        if let Some(rate) = parse_var::<u32>(&get, "ARXIV_RATE_LIMIT")? {
            config.arxiv.requests_per_second = rate.max(1);
        }
        if let Some(rate) = parse_var::<u32>(&get, "PUBMED_RATE_LIMIT")? {
            config.pubmed.requests_per_second = rate.max(1);
        }
        if let Some(rate) = parse_var::<u32>(&get, "SEMANTIC_SCHOLAR_RATE_LIMIT")? {
            config.semantic_scholar.requests_per_second = rate.max(1);
        }
        if let Some(attempts) = parse_var::<u32>(&get, "RETRY_MAX_ATTEMPTS")? {
            config.max_attempts = attempts.max(1);
        }
        if let Some(secs) = parse_var::<u64>(&get, "REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(workers) = parse_var::<usize>(&get, "DOWNLOAD_WORKERS")? {
            config.download_workers = workers.max(1);
        }
        if let Some(workers) = parse_var::<usize>(&get, "VALIDATE_WORKERS")? {
            config.validate_workers = workers.max(1);
        }

        config.journal_metrics_path = get("JOURNAL_METRICS_PATH").map(PathBuf::from);
        if let Some(dir) = get("DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Endpoint settings for a source.
    #[must_use]
    pub const fn source(&self, kind: SourceKind) -> &SourceSettings {
        match kind {
            SourceKind::Arxiv => &self.arxiv,
            SourceKind::PubMed => &self.pubmed,
            SourceKind::SemanticScholar => &self.semantic_scholar,
        }
    }

    /// Check if the query assistant has credentials.
    #[must_use]
    pub const fn has_llm(&self) -> bool {
        self.llm.endpoint.api_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid value for {key}: {raw}")))
        .transpose()
}
