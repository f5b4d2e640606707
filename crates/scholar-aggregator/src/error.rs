//! Error types for the literature aggregator.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.

use std::time::Duration;

use crate::models::SourceKind;

/// Errors from a single outbound request to a source API.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// Connection, DNS, TLS, timeout or body transfer failure.
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// Rate limited by the source API (429 response)
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested wait time before retry, from the `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// Resource not found (404 response or empty lookup)
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource
        resource: String,
    },

    /// Invalid request parameters (400 response or malformed query)
    #[error("Bad request: {message}")]
    BadRequest {
        /// Error message from API
        message: String,
    },

    /// Rejected credentials (401/403 response)
    #[error("Authentication failed ({status}), check the API key")]
    Unauthorized {
        /// HTTP status code
        status: u16,
    },

    /// Response body could not be parsed
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Server error (5xx response)
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },

    /// Unexpected HTTP status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },
}

impl SourceError {
    /// Create a rate limited error with an optional retry-after in seconds.
    #[must_use]
    pub fn rate_limited(seconds: Option<u64>) -> Self {
        Self::RateLimited { retry_after: seconds.map(Duration::from_secs) }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Create a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::RateLimited { .. } | Self::Server { .. })
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else if err.is_builder() {
            Self::BadRequest { message: err.to_string() }
        } else {
            Self::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(format!("JSON: {err}"))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Parse(format!("XML: {err}"))
    }
}

/// Errors from the search service.
#[derive(thiserror::Error, Debug)]
pub enum SearchError {
    /// Filter validation failed before any request was issued
    #[error("Invalid filter '{field}': {message}")]
    InvalidFilter {
        /// Filter field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// Query text is empty or unusable
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A source is disabled, unregistered or failed for this query
    #[error("Source {source_kind} unavailable: {reason}")]
    SourceUnavailable {
        /// Source that could not serve the request
        source_kind: SourceKind,
        /// Why it could not
        reason: String,
    },

    /// Error from a source request
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Internal pipeline error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Create an invalid filter error.
    #[must_use]
    pub fn invalid_filter(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFilter { field: field.into(), message: message.into() }
    }

    /// Create a source unavailable error.
    #[must_use]
    pub fn unavailable(source_kind: SourceKind, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable { source_kind, reason: reason.into() }
    }

    /// Returns true when the failure is a missing paper.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Source(err) if err.is_not_found())
    }

    /// Convert to a user-facing status message.
    #[must_use]
    pub fn to_user_message(&self) -> String {
        match self {
            Self::Source(SourceError::RateLimited { .. }) => {
                "Rate limited by the source API after retries. Please wait and try again.".to_string()
            }
            Self::Source(SourceError::NotFound { resource }) => {
                format!("Not found: {resource}. Please check the ID is correct.")
            }
            Self::InvalidFilter { field, message } => {
                format!("Invalid filter '{field}': {message}")
            }
            Self::SourceUnavailable { source_kind, reason } => {
                format!("{} failed: {reason}", source_kind.display_name())
            }
            _ => self.to_string(),
        }
    }
}

/// Errors from CSV export and PDF download.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// PDF download failed
    #[error("Download of {url} failed: {reason}")]
    Download {
        /// PDF URL
        url: String,
        /// Failure reason
        reason: String,
    },

    /// Download log could not be written
    #[error("Download log error: {0}")]
    Ledger(String),

    /// Input CSV lacks a required column
    #[error("CSV file has no '{0}' column")]
    MissingColumn(String),
}

impl ExportError {
    /// Create a download error.
    #[must_use]
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Download { url: url.into(), reason: reason.into() }
    }
}

/// Errors from the LLM query assistant.
#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    /// No API key or endpoint configured
    #[error("LLM assistant is not configured (set LLM_API_KEY)")]
    NotConfigured,

    /// Request to the chat completions endpoint failed
    #[error("LLM request failed: {0}")]
    Request(#[from] SourceError),

    /// Completion contained no text
    #[error("LLM returned an empty response")]
    EmptyResponse,

    /// Nothing to send
    #[error("input text is empty")]
    EmptyInput,
}

/// Result type alias for source requests.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type alias for search operations.
pub type SearchResult<T> = Result<T, SearchError>;

/// Result type alias for export operations.
pub type ExportResult<T> = Result<T, ExportError>;
