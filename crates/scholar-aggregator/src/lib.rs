//! Scholar Aggregator
//!
//! Searches arXiv, PubMed and Semantic Scholar concurrently, merges the
//! results into one deduplicated, filtered and ranked list, and exports it
//! as CSV with optional resumable PDF download.
//!
//! # Features
//!
//! - **Fan-out search**: every sentence of a query goes to every enabled source at once
//! - **Rate-limited**: a per-source request gate plus retry with exponential backoff
//! - **Partial results**: a failing source is annotated, never fatal
//! - **Journal metrics**: impact factor and JCR/CAS quartiles from a local table
//! - **Query assistant**: LLM-generated search strategies and domain validation
//!
//! # Example
//!
//! ```no_run
//! use scholar_aggregator::{Config, SearchRequest, SearchService};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let service = SearchService::from_config(&config)?;
//!
//!     let request = SearchRequest::new("graph neural networks", Default::default());
//!     let response = service.search(&request, None, &CancellationToken::new()).await?;
//!     println!("{} papers", response.papers.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod search;
pub mod server;
pub mod sources;
pub mod validate;

pub use config::Config;
pub use error::{ExportError, LlmError, SearchError, SourceError};
pub use export::{ExportOptions, ExportSummary, Exporter};
pub use llm::{LlmClient, RelevanceJudge, SearchStrategy};
pub use metrics::JournalMetricsTable;
pub use models::{Filter, JournalMetrics, PaperRecord, SourceKind, YearRange};
pub use search::{SearchRequest, SearchResponse, SearchService};
pub use validate::{DomainValidator, ValidationReport};
