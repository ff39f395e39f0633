//! Application configuration.
//!
//! Nested serde sections with complete defaults; a missing config file means
//! "run with defaults". The AI token is read from the environment, never
//! from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub http: HttpClientConfig,
    pub browser: BrowserConfig,
    pub extraction: ExtractionConfig,
    pub images: ImageConfig,
    pub ai: AiConfig,
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

/// Target site identity and URL layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Catalog store key; one row namespace per site.
    pub id: String,
    pub base_url: String,
    /// Path of the search endpoint, relative to `base_url`.
    pub search_path: String,
    /// Substring a product-image URL must contain to belong to the site.
    pub domain_marker: String,
    pub currency: String,
    pub country: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            id: "nissei".to_string(),
            base_url: "https://nissei.com".to_string(),
            search_path: "/py/catalogsearch/result/".to_string(),
            domain_marker: "nissei.com".to_string(),
            currency: "Gs.".to_string(),
            country: "Paraguay".to_string(),
        }
    }
}

/// HTTP client configuration for the static fetch tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub user_agent: String,
    pub accept_language: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
    /// Retries for transport errors only; HTTP 4xx/5xx are not retried.
    pub retry_count: u32,
    pub retry_delay_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "es-419,es;q=0.9,en;q=0.8,pt;q=0.7".to_string(),
            timeout_seconds: 30,
            max_requests_per_second: 2,
            retry_count: 2,
            retry_delay_ms: 500,
        }
    }
}

/// Headless browser configuration for the rendered tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub enabled: bool,
    pub headless: bool,
    pub page_load_timeout_seconds: u64,
    /// Budget for the content-ready wait after the body appears.
    pub content_wait_seconds: u64,
    /// Settle delay after navigation, for gallery JS to initialize.
    pub settle_delay_ms: u64,
    /// Settle delay after each carousel click, for the transition animation.
    pub click_settle_ms: u64,
    /// How many detail tabs to try activating at most.
    pub max_tab_clicks: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            page_load_timeout_seconds: 30,
            content_wait_seconds: 8,
            settle_delay_ms: 3000,
            click_settle_ms: 2000,
            max_tab_clicks: 3,
        }
    }
}

/// Extraction cascade tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Mandatory pause between products, rate limiting against the site.
    pub delay_between_products_ms: u64,
    pub description_max_len: usize,
    /// Click budget for the carousel navigation loop.
    pub carousel_click_budget: u32,
    /// Minimum rendered size (px) for a carousel frame to count as the
    /// large image rather than a thumbnail.
    pub carousel_min_image_px: u32,
    /// Character budget for HTML shipped to the AI tier.
    pub ai_html_budget: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            delay_between_products_ms: 2000,
            description_max_len: 2000,
            carousel_click_budget: 8,
            carousel_min_image_px: 200,
            ai_html_budget: 8000,
        }
    }
}

/// Image download and transcoding bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub max_per_product: usize,
    pub min_bytes: usize,
    pub max_bytes: usize,
    /// Anything smaller on either side is assumed to be an icon or sprite.
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    /// Concurrent downloads per product.
    pub download_workers: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_per_product: 8,
            min_bytes: 1024,
            max_bytes: 10 * 1024 * 1024,
            min_dimension: 50,
            max_dimension: 1500,
            jpeg_quality: 85,
            download_workers: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    None,
    Anthropic,
    Openai,
}

/// AI capability configuration. The pipeline only depends on
/// "send prompt, get text back"; provider and model are external details.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
    /// Environment variable holding the API token.
    pub token_env: String,
    /// Endpoint override, mainly for tests; empty means the provider default.
    pub endpoint: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::None,
            model: String::new(),
            max_tokens: 1000,
            temperature: 0.1,
            timeout_seconds: 30,
            token_env: "NISSEI_AI_TOKEN".to_string(),
            endpoint: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://nissei_catalog.db".to_string(),
        }
    }
}
