//! Streaming PDF downloads with transient-error retries.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use url::Url;

use crate::client::USER_AGENT;
use crate::config::Config;
use crate::error::{ExportError, ExportResult};
use crate::models::PaperRecord;

/// Suffix of in-flight download files.
const PART_SUFFIX: &str = "part";

/// HTTP client for fetching PDFs into the download directory.
#[derive(Debug, Clone)]
pub struct PdfDownloader {
    client: ClientWithMiddleware,
}

impl PdfDownloader {
    /// Create a downloader using the configured timeouts and retry bounds.
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.request_timeout)
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(config.retry_base_delay, config.retry_max_delay)
            .build_with_max_retries(config.max_attempts.saturating_sub(1));

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client })
    }

    /// Download `url` into `dest`.
    ///
    /// The body is streamed into `dest.part` and renamed once complete, so
    /// `dest` only ever holds a full file. Returns the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> ExportResult<u64> {
        let parsed = Url::parse(url).map_err(|e| ExportError::download(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExportError::download(url, format!("unsupported scheme '{}'", parsed.scheme())));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| ExportError::download(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExportError::download(url, format!("HTTP {}", status.as_u16())));
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(dest);

        let written = match stream_to_file(response, &part).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(match err {
                    StreamError::Io(e) => ExportError::Io(e),
                    StreamError::Body(reason) => ExportError::download(url, reason),
                });
            }
        };

        tokio::fs::rename(&part, dest).await?;
        tracing::info!(url, path = %dest.display(), bytes = written, "download complete");
        Ok(written)
    }
}

enum StreamError {
    Io(std::io::Error),
    Body(String),
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> Result<u64, StreamError> {
    let file = File::create(path).await.map_err(StreamError::Io)?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| StreamError::Body(e.to_string()))?;
        writer.write_all(&chunk).await.map_err(StreamError::Io)?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(StreamError::Io)?;
    if written == 0 {
        return Err(StreamError::Body("empty response body".to_string()));
    }
    Ok(written)
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PART_SUFFIX);
    dest.with_file_name(name)
}

/// File name for a record's PDF: `{source}_{id}.pdf` with unsafe characters replaced.
#[must_use]
pub fn pdf_file_name(record: &PaperRecord) -> String {
    let id: String = record
        .id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let id = id.trim_matches('.');
    format!("{}_{}.pdf", record.source.as_str(), if id.is_empty() { "paper" } else { id })
}
