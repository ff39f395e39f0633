//! Batch pipeline orchestration.
//!
//! One run per search query: listing discovery, optional AI relevance
//! filtering, detail extraction for a bounded subset, image download and
//! transcoding, idempotent upserts, and listing-only stubs for the
//! remainder. Per-product failures are recorded and the batch continues;
//! the browser session is torn down no matter how the product loop ends.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use scraper::Html;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::product::{CandidateProduct, ExtractedProduct};
use crate::domain::repositories::CatalogStore;
use crate::error::ScrapeError;
use crate::extraction::cascade::{self, CascadeContext};
use crate::extraction::{downloader, listing, relevance};
use crate::infrastructure::ai_client::AiClient;
use crate::infrastructure::browser_driver::BrowserSession;
use crate::infrastructure::config::{AppConfig, ImageConfig};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::image_processor::ImageProcessor;

/// Inbound trigger parameters for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub query: String,
    /// Bounds listing discovery.
    pub max_results: usize,
    /// Bounds how many candidates get full-tier extraction; the remainder
    /// are persisted as listing-only stubs.
    pub max_detailed: usize,
    /// Bounds the carousel output and the download fan-out.
    pub max_images_per_product: usize,
}

/// Outward result of a run. Never an exception under normal operating
/// failures: counts plus human-readable per-product errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub query: String,
    pub found: usize,
    pub processed: usize,
    pub saved: usize,
    pub errors: usize,
    pub error_messages: Vec<String>,
}

impl RunReport {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            ..Self::default()
        }
    }

    fn record_error(&mut self, message: String) {
        warn!(message, "pipeline error recorded");
        self.errors += 1;
        self.error_messages.push(message);
    }
}

pub struct Pipeline {
    config: AppConfig,
    http: HttpClient,
    processor: ImageProcessor,
    ai: Option<AiClient>,
    store: Arc<dyn CatalogStore>,
}

impl Pipeline {
    pub fn new(config: AppConfig, store: Arc<dyn CatalogStore>) -> Result<Self, ScrapeError> {
        let http = HttpClient::new(config.http.clone())?;
        let processor = ImageProcessor::new(config.images.clone());
        let ai = AiClient::from_config(&config.ai);
        Ok(Self {
            config,
            http,
            processor,
            ai,
            store,
        })
    }

    /// Run the full pipeline for one query.
    ///
    /// Only batch-level problems return an error: an invalid configuration,
    /// or a browser that cannot be launched when the rendered tier is
    /// enabled (no rendered-tier work could proceed).
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, ScrapeError> {
        let mut report = RunReport::new(&request.query);
        let site = &self.config.site;

        info!(
            query = %request.query,
            max_results = request.max_results,
            max_detailed = request.max_detailed,
            "pipeline run starting"
        );

        let search_url = listing::search_url(&site.base_url, &site.search_path, &request.query)?;
        let candidates = match self.http.get_text(&search_url).await {
            Ok(html) => {
                let doc = Html::parse_document(&html);
                listing::extract_candidates(&doc, &request.query, &site.base_url, request.max_results)
            }
            Err(e) => {
                report.record_error(format!("listing discovery failed: {e}"));
                return Ok(report);
            }
        };
        report.found = candidates.len();
        if candidates.is_empty() {
            info!(query = %request.query, "no products found");
            return Ok(report);
        }

        let mut to_detail = candidates.clone();
        if let Some(ai) = &self.ai {
            to_detail = relevance::filter_candidates(ai, to_detail, &request.query).await;
        }
        to_detail.truncate(request.max_detailed);

        let browser = if self.config.browser.enabled && !to_detail.is_empty() {
            Some(BrowserSession::launch(&self.config.browser, &self.config.http.user_agent).await?)
        } else {
            None
        };

        // The product loop never short-circuits; the session is released
        // regardless of what happened inside.
        self.process_detailed(&to_detail, browser.as_ref(), request, &mut report)
            .await;
        if let Some(session) = browser {
            session.close().await;
        }

        let detailed_urls: HashSet<&str> = to_detail.iter().map(|c| c.url.as_str()).collect();
        for candidate in candidates
            .iter()
            .filter(|c| !detailed_urls.contains(c.url.as_str()))
        {
            let stub = ExtractedProduct::listing_stub(candidate);
            match self.store.upsert(&site.id, &stub, &[]).await {
                Ok(_) => report.saved += 1,
                Err(e) => report.record_error(format!("{}: {e}", candidate.url)),
            }
        }

        info!(
            query = %request.query,
            found = report.found,
            processed = report.processed,
            saved = report.saved,
            errors = report.errors,
            "pipeline run finished"
        );
        Ok(report)
    }

    async fn process_detailed(
        &self,
        candidates: &[CandidateProduct],
        browser: Option<&BrowserSession>,
        request: &RunRequest,
        report: &mut RunReport,
    ) {
        let images_config = ImageConfig {
            max_per_product: request.max_images_per_product.max(1),
            ..self.config.images.clone()
        };
        let ctx = CascadeContext {
            http: &self.http,
            browser,
            ai: self.ai.as_ref(),
            config: &self.config,
            max_images: images_config.max_per_product,
        };
        let delay = Duration::from_millis(self.config.extraction.delay_between_products_ms);

        for (index, candidate) in candidates.iter().enumerate() {
            info!(
                product = index + 1,
                total = candidates.len(),
                url = %candidate.url,
                "extracting product details"
            );

            let product = cascade::extract_product(&ctx, candidate).await;
            report.processed += 1;

            let images = downloader::download_product_images(
                &self.http,
                &self.processor,
                &product,
                &images_config,
            )
            .await;

            match self.store.upsert(&self.config.site.id, &product, &images).await {
                Ok(entry) => {
                    report.saved += 1;
                    debug!(entry_id = entry.id, url = %candidate.url, "product persisted");
                }
                Err(e) => report.record_error(format!("{}: {e}", candidate.url)),
            }

            // Mandatory pause between products, rate limiting against the
            // target site.
            if index + 1 < candidates.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}
