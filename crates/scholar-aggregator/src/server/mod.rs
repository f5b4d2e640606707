//! HTTP API over the search service.
//!
//! Routes:
//! - `GET /health`
//! - `POST /api/search`
//! - `GET /api/paper/{id}?source=`
//! - `GET /api/citations/{id}?source=&limit=`
//! - `GET /api/references/{id}?source=&limit=`
//! - `POST /api/export/csv`
//! - `POST /api/strategy`
//! - `POST /api/analyze`

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::llm::LlmClient;
use crate::search::SearchService;

pub use routes::{ApiError, create_router};

/// Shared state for HTTP handlers.
pub struct AppState {
    pub search: SearchService,
    pub llm: Option<LlmClient>,
    /// Cancelled on shutdown; in-flight searches stop between sentences.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create state from an existing service.
    #[must_use]
    pub fn new(search: SearchService, llm: Option<LlmClient>) -> Self {
        Self { search, llm, shutdown: CancellationToken::new() }
    }
}

/// Search API server.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Build the search service and the optional LLM client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if a client cannot be built or the metrics file cannot be loaded.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let search = SearchService::from_config(config)?;
        let llm = LlmClient::from_config(config)?;
        Ok(Self::new(AppState::new(search, llm)))
    }

    /// Wrap prepared state.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self { state: Arc::new(state) }
    }

    /// Serve HTTP on `addr` until Ctrl-C or `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the listener cannot bind or the server fails.
    pub async fn run_http(self, addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
        let router = create_router(Arc::clone(&self.state));
        tracing::info!("HTTP server listening on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let state = Arc::clone(&self.state);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                state.shutdown.cancel();
                tracing::info!("Received shutdown signal");
            })
            .await?;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("search", &self.state.search)
            .field("llm", &self.state.llm.is_some())
            .finish()
    }
}
