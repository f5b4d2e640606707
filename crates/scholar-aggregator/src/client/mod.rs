//! Rate-limited, retrying HTTP client shared by every source adapter.
//!
//! Provides:
//! - Connection pooling via reqwest
//! - A per-source GCRA request gate (`governor`)
//! - An explicit [`RetryPolicy`] with exponential backoff
//! - Uniform status code mapping into [`SourceError`]

mod rate_limit;
mod retry;

pub use rate_limit::RateLimiter;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryPolicy};

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{Config, SourceSettings, api};
use crate::error::{SourceError, SourceResult};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("scholar-aggregator/", env!("CARGO_PKG_VERSION"));

/// Build a pooled reqwest client with the configured timeouts.
///
/// # Errors
///
/// Returns error if the TLS backend cannot be initialized.
pub fn http_client(config: &Config, headers: HeaderMap) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .pool_max_idle_per_host(api::MAX_KEEPALIVE)
        .pool_idle_timeout(api::KEEPALIVE_EXPIRY)
        .gzip(true)
        .build()?)
}

/// HTTP client for one upstream API.
#[derive(Clone)]
pub struct SourceClient {
    name: &'static str,
    client: Client,
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl SourceClient {
    /// Create a client for the given endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(name: &'static str, settings: &SourceSettings, config: &Config) -> anyhow::Result<Self> {
        Self::with_headers(name, settings, config, HeaderMap::new())
    }

    /// Create a client that sends extra default headers (API keys).
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn with_headers(
        name: &'static str,
        settings: &SourceSettings,
        config: &Config,
        headers: HeaderMap,
    ) -> anyhow::Result<Self> {
        let client = http_client(config, headers)?;
        Ok(Self {
            name,
            client,
            limiter: RateLimiter::per_second(name, settings.requests_per_second),
            policy: RetryPolicy::from_config(config),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Source name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Retry policy in use.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET a URL and return the response body as text.
    pub async fn get_text<P>(&self, url: &str, params: &P) -> SourceResult<String>
    where
        P: Serialize + ?Sized,
    {
        self.execute(|| self.client.get(url).query(params)).await
    }

    /// GET a URL and decode a JSON body.
    pub async fn get_json<T, P>(&self, url: &str, params: &P) -> SourceResult<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let body = self.get_text(url, params).await?;
        serde_json::from_str(&body).map_err(SourceError::from)
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, T>(&self, url: &str, body: &B, bearer: Option<&str>) -> SourceResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self
            .execute(|| {
                let request = self.client.post(url).json(body);
                match bearer {
                    Some(token) => request.bearer_auth(token),
                    None => request,
                }
            })
            .await?;
        serde_json::from_str(&text).map_err(SourceError::from)
    }

    /// Run a request through the gate and the retry loop.
    async fn execute<F>(&self, build: F) -> SourceResult<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            self.limiter.acquire().await;

            let error = match self.send_once(build()).await {
                Ok(body) => return Ok(body),
                Err(error) => error,
            };

            match self.policy.decide(&error, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    warn!(source = self.name, attempt, %error, delay_ms = delay.as_millis() as u64, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp => {
                    debug!(source = self.name, attempt, %error, "request failed");
                    return Err(error);
                }
            }
        }
    }

    async fn send_once(&self, request: RequestBuilder) -> SourceResult<String> {
        let response = request.send().await?;
        let response = handle_response(response).await?;
        Ok(response.text().await?)
    }
}

/// Map API response status codes into [`SourceError`].
pub(crate) async fn handle_response(response: reqwest::Response) -> SourceResult<reqwest::Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());

            Err(SourceError::rate_limited(retry_after))
        }
        401 | 403 => Err(SourceError::Unauthorized { status: status.as_u16() }),
        404 => {
            let text = response.text().await.unwrap_or_default();
            Err(SourceError::not_found(text))
        }
        400 => {
            let text = response.text().await.unwrap_or_default();
            Err(SourceError::bad_request(text))
        }
        500..=599 => {
            let text = response.text().await.unwrap_or_default();
            Err(SourceError::server(status.as_u16(), text))
        }
        _ => {
            let text = response.text().await.unwrap_or_default();
            Err(SourceError::UnexpectedStatus { status: status.as_u16(), message: text })
        }
    }
}

/// Header map carrying one API key header, skipped when the key is unset.
///
/// # Errors
///
/// Returns error if the key is not a valid header value.
pub fn api_key_headers(name: &'static str, key: Option<&str>) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(key) = key {
        let mut value = HeaderValue::from_str(key)?;
        value.set_sensitive(true);
        headers.insert(name, value);
    }
    Ok(headers)
}

impl std::fmt::Debug for SourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceClient")
            .field("name", &self.name)
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_headers() {
        let headers = api_key_headers("x-api-key", Some("secret")).unwrap();
        assert!(headers.get("x-api-key").unwrap().is_sensitive());

        let empty = api_key_headers("x-api-key", None).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_debug_lists_policy() {
        let config = Config::for_testing("http://localhost:1");
        let client = SourceClient::new("arxiv", &config.arxiv, &config).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("arxiv"));
        assert!(debug.contains("RetryPolicy"));
    }
}
