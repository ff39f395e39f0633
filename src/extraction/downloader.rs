//! Image download fan-out.
//!
//! Downloads for one product run on a small bounded worker pool; results
//! are assembled in original index order, not completion order, so "which
//! image is main" stays deterministic. Individual failures skip the image
//! without failing the product.

use futures::stream::{self, StreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::domain::normalize::slugify;
use crate::domain::product::{ExtractedProduct, ProcessedImage};
use crate::infrastructure::config::ImageConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::image_processor::ImageProcessor;

/// Download and transcode a product's images, capped by the per-product
/// limit. The first successfully processed image becomes the principal one.
pub async fn download_product_images(
    http: &HttpClient,
    processor: &ImageProcessor,
    product: &ExtractedProduct,
    config: &ImageConfig,
) -> Vec<ProcessedImage> {
    let urls: Vec<String> = product
        .image_urls
        .iter()
        .take(config.max_per_product)
        .cloned()
        .collect();
    if urls.is_empty() {
        return Vec::new();
    }

    let referer = product.url.clone();
    let max_bytes = config.max_bytes;

    // `buffered` (not `buffer_unordered`) keeps completion results in input
    // order, which decides the principal image.
    let downloads: Vec<(usize, String, Option<Vec<u8>>)> = stream::iter(
        urls.into_iter().enumerate().map(|(index, url)| {
            let referer = referer.clone();
            async move {
                let bytes = http
                    .fetch_image(&url, Some(&referer), max_bytes)
                    .await
                    .map_err(|e| {
                        debug!(url = %url, error = %e, "image download failed");
                        e
                    })
                    .ok();
                (index, url, bytes)
            }
        }),
    )
    .buffered(config.download_workers.max(1))
    .collect()
    .await;

    let name_slug = slugify(&product.name, 30);
    let mut processed = Vec::new();
    for (index, url, bytes) in downloads {
        let Some(bytes) = bytes else { continue };
        match processor.process(&bytes, &url) {
            Ok(mut image) => {
                let position = processed.len() as u32;
                image.order = position;
                image.is_main = position == 0;
                image.filename = format!(
                    "{}_{}_{}.jpg",
                    name_slug,
                    index + 1,
                    &Uuid::new_v4().simple().to_string()[..8]
                );
                processed.push(image);
            }
            Err(e) => {
                debug!(url = %url, error = %e, "image failed validation, skipping");
            }
        }
    }

    debug!(
        product = %product.url,
        downloaded = processed.len(),
        "image fan-out finished"
    );
    processed
}
