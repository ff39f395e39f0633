//! Repository trait for the catalog store.
//!
//! The pipeline treats persistence as an external capability; tests swap in
//! an in-memory SQLite implementation.

use async_trait::async_trait;

use crate::domain::product::{CatalogEntry, ExtractedProduct, ProcessedImage};
use crate::error::ScrapeError;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Look up an entry by its natural key.
    async fn find_by_url(
        &self,
        site_id: &str,
        url: &str,
    ) -> Result<Option<CatalogEntry>, ScrapeError>;

    /// Create or update the entry keyed by `(site_id, product.url)`.
    ///
    /// Detail-bearing fields (description, brand, availability,
    /// specifications, categories, SKU) are only overwritten when the
    /// incoming record has `details_extracted` set, so a degraded re-run
    /// never clobbers previously captured rich data. A non-empty image set
    /// replaces the stored gallery transactionally, with the first image as
    /// principal; an empty set leaves the stored gallery alone.
    async fn upsert(
        &self,
        site_id: &str,
        product: &ExtractedProduct,
        images: &[ProcessedImage],
    ) -> Result<CatalogEntry, ScrapeError>;
}
