//! HTTP retrieval of remote tracks and clips.
//!
//! [`HttpFetcher`] downloads a [`SourceRef::Remote`] into the job temp
//! directory and registers the file for cleanup. Local sources are passed
//! through unchanged.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, CACHE_CONTROL, CONTENT_TYPE, ETAG, EXPIRES};
use reqwest::Client;
use splice_av::{JobScope, TempResources};
use splice_core::config::FetchConfig;
use splice_core::{Error, Result, SourceRef};
use splice_pipeline::{LocalResolver, Resolved, SourceResolver, SourceStamp};
use tokio::io::AsyncWriteExt;

/// Base delay between retries; doubled on every attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    pub etag: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub bytes: u64,
}

/// [`SourceResolver`] that downloads remote sources over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    default_expiry: chrono::Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("splicer/{}", env!("CARGO_PKG_VERSION")));
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let hours = i64::try_from(config.default_expiry_hours).unwrap_or(i64::MAX);
        Ok(Self {
            client,
            retries: config.retries,
            default_expiry: chrono::Duration::try_hours(hours).unwrap_or(chrono::Duration::hours(6)),
        })
    }

    /// Download `url` into the job temp directory.
    ///
    /// Connect errors and timeouts are retried up to the configured count.
    /// HTTP error statuses are not retried.
    pub async fn download(
        &self,
        url: &str,
        scope: &JobScope,
        resources: &TempResources,
    ) -> Result<Download> {
        let mut response = self.send(url).await?;

        let headers = response.headers();
        let ext = extension_for_content_type(
            headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
        );
        let etag = etag_from_headers(headers);
        let expires_at = expiry_from_headers(headers, Utc::now(), self.default_expiry);

        tokio::fs::create_dir_all(&scope.temp_dir).await?;
        let name = format!("src-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let path = scope.file(&name, ext);
        resources.register(&path);

        let mut file = tokio::fs::File::create(&path).await?;
        let mut bytes = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::fetch(url, format!("body read failed: {e}")))?
        {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!(url, path = %path.display(), bytes, etag = ?etag, "downloaded");
        Ok(Download {
            path,
            etag,
            expires_at,
            bytes,
        })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    return response
                        .error_for_status()
                        .map_err(|e| Error::fetch(url, e.to_string()));
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < self.retries => {
                    let delay = RETRY_BACKOFF * 2u32.saturating_pow(attempt);
                    tracing::warn!(url, attempt, error = %e, ?delay, "fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(Error::fetch(url, e.to_string())),
            }
        }
    }
}

#[async_trait]
impl SourceResolver for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn resolve(
        &self,
        source: &SourceRef,
        scope: &JobScope,
        resources: &TempResources,
    ) -> Result<Resolved> {
        match source {
            SourceRef::Local(_) => LocalResolver.resolve(source, scope, resources).await,
            SourceRef::Remote(url) => {
                let download = self.download(url, scope, resources).await?;
                Ok(Resolved {
                    path: download.path,
                    stamp: Some(SourceStamp {
                        location: url.clone(),
                        etag: download.etag,
                        expires_at: download.expires_at,
                    }),
                })
            }
        }
    }
}

/// File extension for a `Content-Type` value. Anything unknown is treated
/// as MP3, and so is `audio/mpeg`, which some tables map to `mp2`.
pub fn extension_for_content_type(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match mime.as_str() {
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/aac" | "audio/x-aac" => "aac",
        "audio/ogg" | "application/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/flac" | "audio/x-flac" => "flac",
        _ => "mp3",
    }
}

/// The entity tag without surrounding quotes.
pub fn etag_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("W/").trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// When a downloaded copy stops being fresh: `Cache-Control: max-age`,
/// else `Expires`, else `now + default`.
pub fn expiry_from_headers(
    headers: &HeaderMap,
    now: DateTime<Utc>,
    default: chrono::Duration,
) -> DateTime<Utc> {
    let max_age = headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(',')
                .filter_map(|d| d.trim().strip_prefix("max-age="))
                .find_map(|secs| secs.trim_matches('"').parse::<i64>().ok())
        });
    if let Some(delta) = max_age.and_then(chrono::Duration::try_seconds) {
        return now + delta;
    }

    let expires = headers
        .get(EXPIRES)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok());
    match expires {
        Some(at) => at.with_timezone(&Utc),
        None => now + default,
    }
}
