//! HTTP client for the static fetch tier.
//!
//! The target site serves different markup to naive clients, so requests
//! carry a realistic browser User-Agent and Accept-Language. Requests are
//! rate limited and transport errors are retried within a small budget;
//! HTTP error statuses are not retried.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{direct::NotKeyed, InMemoryState},
    Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use scraper::Html;
use tracing::{debug, warn};

use crate::error::ScrapeError;
use crate::infrastructure::config::HttpClientConfig;

const HTML_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";

pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|_| ScrapeError::Config("invalid user agent".to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(HTML_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|_| ScrapeError::Config("invalid accept-language".to_string()))?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ScrapeError::Config(format!("failed to build HTTP client: {e}")))?;

        let requests_per_second = NonZeroU32::new(config.max_requests_per_second.max(1))
            .ok_or_else(|| ScrapeError::Config("rate limit must be positive".to_string()))?;
        let quota = Quota::per_second(requests_per_second);

        Ok(Self {
            client,
            rate_limiter: RateLimiter::direct(quota),
            config,
        })
    }

    /// GET a URL and return the response body as text.
    pub async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
        let response = self.get_with_retry(url, None).await?;
        response.text().await.map_err(|source| ScrapeError::Network {
            url: url.to_string(),
            source,
        })
    }

    /// GET a URL and parse the body into a queryable document.
    pub async fn fetch_document(&self, url: &str) -> Result<Html, ScrapeError> {
        let body = self.get_text(url).await?;
        Ok(Html::parse_document(&body))
    }

    /// Download image bytes, with a Referer so the CDN serves product
    /// assets, bounded by `max_bytes`.
    pub async fn fetch_image(
        &self,
        url: &str,
        referer: Option<&str>,
        max_bytes: usize,
    ) -> Result<Vec<u8>, ScrapeError> {
        let response = self.get_with_retry(url, referer).await?;

        if let Some(length) = response.content_length() {
            if length as usize > max_bytes {
                return Err(ScrapeError::invalid_image(format!(
                    "image too large: {length} bytes"
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ScrapeError::Network {
                url: url.to_string(),
                source,
            })?;
        if bytes.len() > max_bytes {
            return Err(ScrapeError::invalid_image(format!(
                "image too large: {} bytes",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }

    async fn get_with_retry(
        &self,
        url: &str,
        referer: Option<&str>,
    ) -> Result<reqwest::Response, ScrapeError> {
        let mut attempt = 0u32;
        loop {
            self.rate_limiter.until_ready().await;
            debug!(url, attempt, "fetching");

            let mut request = self.client.get(url);
            if let Some(referer) = referer {
                request = request
                    .header(REFERER, referer)
                    .header(ACCEPT, IMAGE_ACCEPT);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        return Err(ScrapeError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    return Ok(response);
                }
                Err(source) if attempt < self.config.retry_count && is_transient(&source) => {
                    attempt += 1;
                    warn!(url, attempt, error = %source, "transient network error, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_delay_ms * u64::from(attempt),
                    ))
                    .await;
                }
                Err(source) => {
                    return Err(ScrapeError::Network {
                        url: url.to_string(),
                        source,
                    });
                }
            }
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
