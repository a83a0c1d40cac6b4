//! HTTP client with adaptive rate limiting and transient-failure retry.

mod error;
mod response;
mod retry;
mod user_agent;

pub use error::HttpError;
pub use response::HttpResponse;
pub use retry::{parse_retry_after, RetryPolicy};
pub use user_agent::{resolve_user_agent, BOT_USER_AGENT, USER_AGENT};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::rate_limiter::{QuotaSignals, RateLimiter};
use crate::utils::is_text_like;

/// Construction options for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// `None` for the default browser agent, `"bot"`, or a custom string.
    pub user_agent: Option<String>,
    pub timeout: Duration,
    /// Optional HTTP or SOCKS proxy for every request.
    pub proxy_url: Option<String>,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: Duration::from_secs(30),
            proxy_url: None,
        }
    }
}

/// HTTP client shared by the collectors and the download stage.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a new HTTP client with its own rate limiter.
    pub fn new(options: &HttpClientOptions) -> Result<Self, HttpError> {
        let user_agent = resolve_user_agent(options.user_agent.as_deref());
        let mut builder = Client::builder()
            .user_agent(&user_agent)
            .timeout(options.timeout)
            .gzip(true)
            .brotli(true);

        if let Some(proxy_url) = options.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url).map_err(HttpError::Build)?);
        }

        Ok(Self {
            client: builder.build().map_err(HttpError::Build)?,
            rate_limiter: RateLimiter::new(),
            retry: RetryPolicy::default(),
        })
    }

    /// Share a rate limiter with other clients.
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Override the retry schedule.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Make a single GET request, waiting on the rate limiter first.
    ///
    /// Non-success statuses are returned as [`HttpError::Status`].
    async fn send_once(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let domain = self.rate_limiter.acquire(url).await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| HttpError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let status_code = status.as_u16();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(name.as_str().to_lowercase(), v.to_string());
            }
        }
        debug!("GET {} -> {}", url, status_code);

        if let Some(ref domain) = domain {
            if RateLimiter::is_rate_limit(status_code) {
                self.rate_limiter
                    .report_rate_limit(domain, status_code)
                    .await;
            } else if status.is_server_error() {
                self.rate_limiter.report_server_error(domain).await;
            } else if status.is_success() {
                self.rate_limiter.report_success(domain).await;
                if let Some(signals) = QuotaSignals::from_headers(&headers) {
                    self.rate_limiter.report_quota(domain, signals).await;
                }
            }
        }

        if !status.is_success() {
            return Err(HttpError::Status {
                status: status_code,
                url: url.to_string(),
                retry_after: headers
                    .get("retry-after")
                    .and_then(|v| parse_retry_after(v)),
            });
        }

        Ok(HttpResponse {
            status,
            url: response.url().to_string(),
            headers,
            response,
        })
    }

    /// GET with retries on transient failures.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mut attempt = 1;
        loop {
            match self.send_once(url).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let wait = self.retry.delay_for(attempt, e.retry_after());
                    warn!(
                        "{} (attempt {}/{}), retrying in {:?}",
                        e, attempt, self.retry.max_attempts, wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// GET and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HttpError> {
        self.get(url).await?.json().await
    }

    /// GET and decode a JSON body, keeping the response headers.
    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, HashMap<String, String>), HttpError> {
        let response = self.get(url).await?;
        let headers = response.headers.clone();
        Ok((response.json().await?, headers))
    }

    /// Get page content as text.
    pub async fn get_text(&self, url: &str) -> Result<String, HttpError> {
        self.get(url).await?.text().await
    }
}

/// A downloaded page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub content_type: Option<String>,
    /// Empty when the content type is not text-like.
    pub body: Vec<u8>,
}

/// Anything that can download a page for the fetch stage.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, HttpError>;
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, HttpError> {
        let response = self.get(url).await?;
        let content_type = response.content_type().map(|s| s.to_string());
        let final_url = response.url.clone();

        let body = if is_text_like(content_type.as_deref()) {
            response.bytes().await?
        } else {
            Vec::new()
        };

        Ok(FetchedPage {
            url: final_url,
            content_type,
            body,
        })
    }
}
