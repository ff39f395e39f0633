//! Data-driven selector tables.
//!
//! The target site's markup is inconsistent across product templates
//! (different carousel library versions, occasional custom markup), so every
//! field is extracted through an ordered battery of selectors consumed by
//! one generic matcher instead of per-selector helper methods. Order matters:
//! most specific first.

/// A selector battery row: where to look and which attributes to prefer.
/// An empty attribute list means "take the text content".
#[derive(Debug, Clone, Copy)]
pub struct SelectorRow {
    pub selector: &'static str,
    pub attrs: &'static [&'static str],
}

pub const fn text(selector: &'static str) -> SelectorRow {
    SelectorRow {
        selector,
        attrs: &[],
    }
}

// ---------------------------------------------------------------------------
// Listing page
// ---------------------------------------------------------------------------

pub const LISTING_ITEM: &str = ".product-item";
pub const LISTING_NAME: &[&str] = &[".product-item-name a", ".product-name a", "h3 a"];
pub const LISTING_LINK: &str = "a[href]";

// ---------------------------------------------------------------------------
// Detail page text fields
// ---------------------------------------------------------------------------

pub const NAME: &[&str] = &[
    "h1.page-title span",
    "h1.page-title",
    ".product-info-main h1",
    "h1[itemprop=\"name\"]",
    ".product-name h1",
    "h1.product-title",
    "h1",
];

pub const PRICE: &[&str] = &[
    ".product-info-price .price-wrapper .price",
    ".product-info-main .price .price",
    ".price-box .special-price .price",
    "[data-price-type=\"finalPrice\"] .price",
    ".product-price .price",
    "span[itemprop=\"price\"]",
    ".price-wrapper .price",
    ".current-price",
    ".price",
];

pub const ORIGINAL_PRICE: &[&str] = &[
    ".price-box .old-price .price",
    "[data-price-type=\"oldPrice\"] .price",
    ".regular-price .price",
    ".was-price",
];

/// Extended-information section ("Más Información"): the structured spec
/// table is the highest-priority description source and is used exclusively
/// when present.
pub const DESCRIPTION_EXTENDED: &[&str] = &[
    "#additional #product-attribute-specs-table",
    "#additional table#product-attribute-specs-table",
    ".additional-attributes-wrapper table",
    "#additional",
];

/// "Detalles" section, tried only when the extended section is absent.
pub const DESCRIPTION_DETAILS: &[&str] = &[
    "#product-description-content",
    ".product-info-detailed .product.attribute.description .value",
    ".product.attribute.description .value",
    ".product-description .value",
    "[itemprop=\"description\"]",
];

/// Generic best-effort blocks, the last resort.
pub const DESCRIPTION_GENERIC: &[&str] = &[
    ".product.attribute.description",
    ".product-description",
    ".description .std",
    ".product-collateral .std",
    ".tab-content .description",
];

pub const SHORT_DESCRIPTION: &[&str] = &[
    ".product.attribute.overview",
    ".short-description",
    ".product-info-main .overview",
];

pub const SKU: &[SelectorRow] = &[
    text("[itemprop=\"sku\"]"),
    text(".product.attribute.sku .value"),
    SelectorRow {
        selector: "[data-sku]",
        attrs: &["data-sku"],
    },
    SelectorRow {
        selector: "[data-product-sku]",
        attrs: &["data-product-sku"],
    },
    text(".sku"),
];

/// Elements likely to carry a label-prefixed SKU in their text.
pub const SKU_LABEL_SCOPES: &[&str] = &[".product-info-stock-sku", ".product-info-main", ".sku"];

pub const BRAND: &[&str] = &[
    ".product-info-main .product-brand",
    "[itemprop=\"brand\"]",
    ".product.attribute.manufacturer .value",
    ".product-brand",
    ".manufacturer",
    ".brand-name",
];

pub const AVAILABILITY: &[&str] = &[
    ".product-info-stock-sku .stock span",
    ".stock.available span",
    "[itemprop=\"availability\"]",
    ".availability",
    ".in-stock",
    ".product-availability",
];

pub const SPEC_TABLES: &[&str] = &[
    "#additional .data.table tbody tr",
    ".additional-attributes-wrapper .data.table tr",
    ".additional-attributes table tr",
    ".product-specifications tbody tr",
    ".product-attributes tr",
    ".data.table.additional-attributes tr",
    ".spec-table tr",
];

pub const SPEC_LISTS: &[&str] = &[
    ".product-specs li",
    ".specifications li",
    ".product-features li",
    ".features li",
];

pub const BREADCRUMBS: &[&str] = &[
    ".breadcrumbs li a",
    ".breadcrumb-item a",
    ".breadcrumb a",
    ".navigation .crumb a",
    ".page-header .breadcrumbs a",
    ".toolbar-breadcrumbs a",
];

/// Breadcrumb entries that are navigation, not categories.
pub const BREADCRUMB_NOISE: &[&str] = &["home", "inicio", "principal"];

// ---------------------------------------------------------------------------
// Static gallery (no-browser tier)
// ---------------------------------------------------------------------------

/// Image source attributes from highest resolution to plain `src`.
pub const IMAGE_SOURCE_ATTRS: &[&str] = &[
    "data-zoom-image",
    "data-large-image",
    "data-full",
    "data-large",
    "data-src",
    "src",
    "data-original",
    "data-lazy",
];

pub const STATIC_GALLERY: &[&str] = &[
    ".fotorama__stage img",
    "[data-gallery-role=\"gallery\"] img",
    ".fotorama img",
    ".gallery-placeholder img",
    ".product-image-gallery img",
    ".product-media-gallery img",
    ".slick-slide img",
    ".swiper-slide img",
    "img[data-zoom-image]",
    "img[data-full]",
    "img[data-large]",
    ".product.media img",
    ".product-image-main img",
    ".product-image-photo",
    ".more-views img",
    ".product-gallery img",
];

/// URL substrings that mark obvious non-product assets in the generic
/// whole-page fallback scan.
pub const IMAGE_NEGATIVE_MARKERS: &[&str] = &[
    "logo", "icon", "sprite", "badge", "button", "arrow", "star", "cart", "menu", "banner",
    "footer", "header", "thumb", "small", "loading", "placeholder", "watermark", "overlay",
];

pub const IMAGE_POSITIVE_MARKERS: &[&str] = &["product", "catalog", "media", "gallery", "image"];

// ---------------------------------------------------------------------------
// Carousel (rendered tier)
// ---------------------------------------------------------------------------

/// Current large image, most specific first: active Fotorama frame, then
/// generic gallery/stage images, then product-tagged images.
pub const CAROUSEL_STAGE: &[&str] = &[
    ".fotorama__stage__frame.fotorama__active img",
    ".fotorama__img",
    ".fotorama__stage img",
    ".product-image-main img",
    ".main-image img",
    ".product-gallery img",
    "img[src*=\"catalog\"]",
];

/// "Next" controls across carousel libraries. Candidates whose class or
/// aria-label carries a prev/back token are excluded after matching.
pub const CAROUSEL_NEXT: &[&str] = &[
    ".fotorama__arr--next",
    ".fotorama__arr[data-side=\"next\"]",
    ".carousel-control-next",
    ".slick-next",
    ".swiper-button-next",
    "button[class*=\"next\"]",
    "button[aria-label*=\"next\"]",
    "button[title*=\"next\"]",
];

pub const CAROUSEL_PREV_TOKENS: &[&str] = &["prev", "previous", "back"];

/// Gallery containers whose presence means the carousel JS has initialized.
pub const CAROUSEL_CONTAINERS: &[&str] = &[
    ".fotorama__stage",
    ".fotorama__nav",
    "[data-fotorama]",
    ".fotorama",
    "[data-gallery-role=\"gallery\"]",
    ".gallery-placeholder",
];

/// Image file extensions accepted by the product-image URL heuristic.
pub const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// Path markers a catalog asset URL must contain.
pub const PRODUCT_PATH_MARKERS: &[&str] = &["catalog", "media", "product"];
