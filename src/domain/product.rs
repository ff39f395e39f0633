//! Catalog entities.
//!
//! `CandidateProduct` is what listing discovery yields. The extraction
//! cascade grows a candidate into an `ExtractedProduct` by absorbing
//! per-tier partial results under an explicit merge policy. `ProcessedImage`
//! carries a transcoded image between download and persistence.
//! `CatalogEntry` / `CatalogImage` mirror the persisted rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product discovered on a search-result page.
///
/// Never mutated after creation; the cascade copies it into an
/// [`ExtractedProduct`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProduct {
    pub name: String,
    pub url: String,
    pub search_query: String,
}

/// Which cascade tier produced the final record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Listing-level data only; no detail page was visited.
    ListingOnly,
    Static,
    Rendered,
    Ai,
}

impl ExtractionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListingOnly => "listing_only",
            Self::Static => "static",
            Self::Rendered => "rendered",
            Self::Ai => "ai",
        }
    }

    pub fn from_str_lossy(value: &str) -> Self {
        match value {
            "static" => Self::Static,
            "rendered" => Self::Rendered,
            "ai" => Self::Ai,
            _ => Self::ListingOnly,
        }
    }

    /// True for tiers that visited the product detail page.
    pub fn is_detailed(self) -> bool {
        !matches!(self, Self::ListingOnly)
    }
}

/// Partial result produced by a single extraction tier.
///
/// Every field is optional; the merge policy lives in
/// [`ExtractedProduct::absorb`].
#[derive(Debug, Clone, Default)]
pub struct ProductFields {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub sku_code: Option<String>,
    pub brand: Option<String>,
    pub availability: Option<String>,
    pub categories: Vec<String>,
    pub specifications: Vec<(String, String)>,
    pub image_urls: Vec<String>,
}

impl ProductFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.price.is_none()
            && self.original_price.is_none()
            && self.description.is_none()
            && self.short_description.is_none()
            && self.sku_code.is_none()
            && self.brand.is_none()
            && self.availability.is_none()
            && self.categories.is_empty()
            && self.specifications.is_empty()
            && self.image_urls.is_empty()
    }
}

/// The accumulating result of the extraction cascade for one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedProduct {
    pub name: String,
    pub url: String,
    pub search_query: String,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub sku_code: Option<String>,
    pub brand: Option<String>,
    pub availability: Option<String>,
    pub categories: Vec<String>,
    /// Ordered key/value pairs; insertion order is display order.
    pub specifications: Vec<(String, String)>,
    /// Absolute URLs, deduplicated, in display order.
    pub image_urls: Vec<String>,
    pub extraction_method: ExtractionMethod,
    pub details_extracted: bool,
}

/// Minimum name length for a record to count as sufficiently identified.
const MIN_NAME_LEN: usize = 5;
/// Minimum description length for the sufficiency predicate.
const MIN_DESCRIPTION_LEN: usize = 30;

impl ExtractedProduct {
    pub fn from_candidate(candidate: &CandidateProduct) -> Self {
        Self {
            name: candidate.name.clone(),
            url: candidate.url.clone(),
            search_query: candidate.search_query.clone(),
            price: None,
            original_price: None,
            description: None,
            short_description: None,
            sku_code: None,
            brand: None,
            availability: None,
            categories: Vec::new(),
            specifications: Vec::new(),
            image_urls: Vec::new(),
            extraction_method: ExtractionMethod::ListingOnly,
            details_extracted: false,
        }
    }

    /// A listing-only stub for candidates beyond the detail budget.
    pub fn listing_stub(candidate: &CandidateProduct) -> Self {
        Self::from_candidate(candidate)
    }

    /// Merge a tier's partial result into the record.
    ///
    /// Later tiers overwrite earlier values field by field, but a tier that
    /// found nothing for a field never erases what an earlier tier found.
    /// Images follow a replace-if-richer rule: a non-empty set replaces the
    /// previous set wholesale, an empty set is ignored.
    pub fn absorb(&mut self, fields: ProductFields) {
        if let Some(name) = fields.name.filter(|n| !n.trim().is_empty()) {
            self.name = name;
        }
        if fields.price.is_some() {
            self.price = fields.price;
        }
        if fields.original_price.is_some() {
            self.original_price = fields.original_price;
        }
        if fields.description.is_some() {
            self.description = fields.description;
        }
        if fields.short_description.is_some() {
            self.short_description = fields.short_description;
        }
        if fields.sku_code.is_some() {
            self.sku_code = fields.sku_code;
        }
        if fields.brand.is_some() {
            self.brand = fields.brand;
        }
        if fields.availability.is_some() {
            self.availability = fields.availability;
        }
        if !fields.categories.is_empty() {
            self.categories = fields.categories;
        }
        if !fields.specifications.is_empty() {
            self.specifications = fields.specifications;
        }
        if !fields.image_urls.is_empty() {
            self.replace_images_if_richer(fields.image_urls);
        }
    }

    /// Replace the image set only when the incoming set is non-empty.
    pub fn replace_images_if_richer(&mut self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        let mut deduped = Vec::with_capacity(urls.len());
        for url in urls {
            if !deduped.contains(&url) {
                deduped.push(url);
            }
        }
        self.image_urls = deduped;
    }

    /// The rule deciding whether extracted data is complete enough to stop
    /// escalating tiers: a non-trivial name, a price, and either a
    /// reasonable description or at least one image. SKU raises confidence
    /// but is not required.
    pub fn is_sufficient(&self) -> bool {
        let has_name = self.name.trim().len() > MIN_NAME_LEN;
        let has_price = self.price.is_some();
        let has_description = self
            .description
            .as_deref()
            .map(|d| d.trim().len() >= MIN_DESCRIPTION_LEN)
            .unwrap_or(false);
        let has_images = !self.image_urls.is_empty();
        has_name && has_price && (has_description || has_images)
    }
}

/// An in-memory intermediate between image download and persistence.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Re-encoded JPEG bytes.
    pub content: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_url: String,
    pub filename: String,
    /// Exactly one per product; assigned to the first successfully
    /// processed image.
    pub is_main: bool,
    /// Zero-based position within the product's gallery.
    pub order: u32,
}

/// A persisted catalog row, keyed by `(site_id, url)`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub site_id: String,
    pub url: String,
    pub name: String,
    pub search_query: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub sku_code: Option<String>,
    pub brand: Option<String>,
    pub availability: Option<String>,
    pub categories: Vec<String>,
    pub specifications: Vec<(String, String)>,
    pub extraction_method: ExtractionMethod,
    pub details_extracted: bool,
    /// Filename of the principal image, mirrored from the image set.
    pub main_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted product image row.
#[derive(Debug, Clone)]
pub struct CatalogImage {
    pub id: i64,
    pub product_id: i64,
    pub filename: String,
    pub content: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub original_url: String,
    pub alt_text: Option<String>,
    pub is_main: bool,
    pub position: u32,
}
