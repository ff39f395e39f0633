//! Carousel image extraction.
//!
//! The gallery only reveals additional images through simulated navigation:
//! capture the currently displayed large image, find a "next" control,
//! click, wait for the transition, recapture. The selector redundancy and
//! the layered click fallback are load-bearing: the site mixes carousel
//! library versions across product templates, and a single brittle strategy
//! silently yields only the first image.
//!
//! Without a browser session the extractor degrades to a static scan of the
//! already-fetched document (Magento gallery JSON plus gallery selectors),
//! yielding at most the images present in the initial markup.

use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::domain::normalize::{canonicalize_image_url, resolve_url};
use crate::extraction::selectors;
use crate::infrastructure::browser_driver::RenderedPage;
use crate::infrastructure::config::AppConfig;

/// How long to wait for a gallery container to appear before concluding the
/// page has no carousel.
const CONTAINER_WAIT_MS: u64 = 8000;

/// Consecutive unproductive clicks before the carousel counts as exhausted.
const MAX_STALLS: u32 = 2;

#[derive(Debug, Clone)]
pub struct CarouselParams {
    pub base_url: String,
    pub domain_marker: String,
    pub click_budget: u32,
    pub min_image_px: u32,
    pub settle_ms: u64,
    pub click_settle_ms: u64,
    pub max_images: usize,
}

impl CarouselParams {
    pub fn from_config(config: &AppConfig, max_images: usize) -> Self {
        Self {
            base_url: config.site.base_url.clone(),
            domain_marker: config.site.domain_marker.clone(),
            click_budget: config.extraction.carousel_click_budget,
            min_image_px: config.extraction.carousel_min_image_px,
            settle_ms: config.browser.settle_delay_ms,
            click_settle_ms: config.browser.click_settle_ms,
            max_images: max_images.max(1),
        }
    }
}

/// Accept only URLs that look like catalog product photos: an image
/// extension, the site's domain, and a catalog/media/product path marker.
/// Filters out logos, icons and unrelated assets sharing the gallery DOM.
pub fn is_product_image_url(url: &str, domain_marker: &str) -> bool {
    if url.len() < 10 {
        return false;
    }
    let lower = url.to_lowercase();
    if !selectors::IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
        return false;
    }
    if !domain_marker.is_empty() && !lower.contains(&domain_marker.to_lowercase()) {
        return false;
    }
    selectors::PRODUCT_PATH_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Resolve, canonicalize and validate a raw attribute value from the page.
fn accept_candidate(raw: &str, params: &CarouselParams) -> Option<String> {
    let resolved = resolve_url(&params.base_url, raw)?;
    let canonical = canonicalize_image_url(&resolved);
    is_product_image_url(&canonical, &params.domain_marker).then_some(canonical)
}

/// What the click loop should do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Continue,
    Stop,
}

/// The navigation state machine, kept free of browser I/O so the
/// stall/dedup rules are directly testable.
#[derive(Debug)]
struct CarouselState {
    collected: Vec<String>,
    current: Option<String>,
    stalls: u32,
    cap: usize,
}

impl CarouselState {
    fn new(cap: usize) -> Self {
        Self {
            collected: Vec::new(),
            current: None,
            stalls: 0,
            cap,
        }
    }

    fn seed(&mut self, url: String) {
        self.current = Some(url.clone());
        self.collected.push(url);
    }

    /// Feed the image captured after a click. A genuinely new image is
    /// appended; an unchanged or already-collected capture is a stall, and
    /// two consecutive stalls mean the gallery is exhausted.
    fn observe(&mut self, captured: Option<String>) -> LoopControl {
        match captured {
            Some(url) if self.current.as_deref() != Some(url.as_str()) => {
                if self.collected.contains(&url) {
                    // Wrapped around to an image we already have.
                    self.current = Some(url);
                    self.stalls += 1;
                } else {
                    self.collected.push(url.clone());
                    self.current = Some(url);
                    self.stalls = 0;
                }
            }
            _ => {
                self.stalls += 1;
            }
        }
        if self.stalls >= MAX_STALLS || self.collected.len() >= self.cap {
            LoopControl::Stop
        } else {
            LoopControl::Continue
        }
    }

    fn into_urls(mut self) -> Vec<String> {
        self.collected.truncate(self.cap);
        self.collected
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NextControl {
    selector: String,
    x: i64,
    y: i64,
}

/// Drop controls that occupy the same screen position: two selectors often
/// match the same physical arrow button.
fn dedupe_by_position(controls: Vec<NextControl>) -> Vec<NextControl> {
    let mut unique: Vec<NextControl> = Vec::new();
    for control in controls {
        if !unique.iter().any(|c| c.x == control.x && c.y == control.y) {
            unique.push(control);
        }
    }
    unique
}

/// Extract the full image set from a JS carousel by simulated navigation.
pub async fn extract_carousel_images(page: &RenderedPage, params: &CarouselParams) -> Vec<String> {
    if !wait_for_gallery(page).await {
        debug!("no gallery container detected");
        return Vec::new();
    }
    tokio::time::sleep(std::time::Duration::from_millis(params.settle_ms)).await;

    let mut state = CarouselState::new(params.max_images);
    if let Some(initial) = capture_current_image(page, params).await {
        debug!(url = %initial, "captured initial carousel image");
        state.seed(initial);
    }

    let controls = dedupe_by_position(find_next_controls(page).await);
    let Some(control) = controls.into_iter().next() else {
        // A carousel may legitimately have a single image and no arrows.
        return state.into_urls();
    };

    for click in 0..params.click_budget {
        if !control_still_active(page, &control.selector).await {
            debug!(click, "next control disabled, stopping");
            break;
        }
        scroll_control_into_view(page, &control.selector).await;
        if !page.click_with_fallbacks(&control.selector).await {
            // A failed click is not retried.
            debug!(click, "click failed, stopping navigation");
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(params.click_settle_ms)).await;

        let captured = capture_current_image(page, params).await;
        if state.observe(captured) == LoopControl::Stop {
            break;
        }
    }

    state.into_urls()
}

async fn wait_for_gallery(page: &RenderedPage) -> bool {
    let containers = match serde_json::to_string(selectors::CAROUSEL_CONTAINERS) {
        Ok(json) => json,
        Err(_) => return false,
    };
    let script = format!(
        r#"(() => {{
    const selectors = {containers};
    for (const sel of selectors) {{
        try {{ if (document.querySelector(sel)) return true; }} catch (_) {{}}
    }}
    return false;
}})()"#
    );
    let deadline =
        tokio::time::Instant::now() + std::time::Duration::from_millis(CONTAINER_WAIT_MS);
    loop {
        if let Ok(value) = page.evaluate_value(&script).await {
            if value.as_bool().unwrap_or(false) {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    }
}

/// Capture the currently displayed large image: first visible element above
/// the thumbnail size gate, preferring zoom/large attributes over `src`.
async fn capture_current_image(page: &RenderedPage, params: &CarouselParams) -> Option<String> {
    let stage = serde_json::to_string(selectors::CAROUSEL_STAGE).ok()?;
    let attrs = serde_json::to_string(selectors::IMAGE_SOURCE_ATTRS).ok()?;
    let min = params.min_image_px;
    let script = format!(
        r#"(() => {{
    const selectors = {stage};
    const attrs = {attrs};
    const out = [];
    for (const sel of selectors) {{
        let els;
        try {{ els = document.querySelectorAll(sel); }} catch (_) {{ continue; }}
        for (const el of els) {{
            const rect = el.getBoundingClientRect();
            if (rect.width < {min} || rect.height < {min}) continue;
            for (const attr of attrs) {{
                const value = el.getAttribute(attr);
                if (value) {{ out.push(value); break; }}
            }}
            if (out.length >= 10) return out;
        }}
    }}
    return out;
}})()"#
    );
    let value = page.evaluate_value(&script).await.ok()?;
    let candidates: Vec<String> = serde_json::from_value(value).ok()?;
    candidates
        .iter()
        .find_map(|raw| accept_candidate(raw, params))
}

async fn find_next_controls(page: &RenderedPage) -> Vec<NextControl> {
    let next = match serde_json::to_string(selectors::CAROUSEL_NEXT) {
        Ok(json) => json,
        Err(_) => return Vec::new(),
    };
    let tokens = match serde_json::to_string(selectors::CAROUSEL_PREV_TOKENS) {
        Ok(json) => json,
        Err(_) => return Vec::new(),
    };
    let script = format!(
        r#"(() => {{
    const selectors = {next};
    const prevTokens = {tokens};
    const out = [];
    for (const sel of selectors) {{
        let els;
        try {{ els = document.querySelectorAll(sel); }} catch (_) {{ continue; }}
        for (const el of els) {{
            const rect = el.getBoundingClientRect();
            if (rect.width === 0 || rect.height === 0) continue;
            if (el.disabled) continue;
            const label = ((el.getAttribute('class') || '') + ' '
                + (el.getAttribute('aria-label') || '')).toLowerCase();
            if (prevTokens.some(t => label.includes(t))) continue;
            out.push({{ selector: sel, x: Math.round(rect.left), y: Math.round(rect.top) }});
            break;
        }}
    }}
    return out;
}})()"#
    );
    match page.evaluate_value(&script).await {
        Ok(value) => serde_json::from_value(value).unwrap_or_default(),
        Err(_) => Vec::new(),
    }
}

/// The button may disable or hide itself at the gallery's end.
async fn control_still_active(page: &RenderedPage, selector: &str) -> bool {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let script = format!(
        r#"(() => {{
    const el = document.querySelector({quoted});
    if (!el || el.disabled) return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
}})()"#
    );
    matches!(page.evaluate_value(&script).await, Ok(value) if value.as_bool().unwrap_or(false))
}

async fn scroll_control_into_view(page: &RenderedPage, selector: &str) {
    let quoted = serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string());
    let script = format!(
        "(() => {{ const el = document.querySelector({quoted}); \
         if (el) el.scrollIntoView({{ block: 'center' }}); return true; }})()"
    );
    let _ = page.evaluate_value(&script).await;
}

// ---------------------------------------------------------------------------
// Static degradation (no browser session)
// ---------------------------------------------------------------------------

/// Scan an already-fetched document for gallery images without any
/// interaction: Magento gallery JSON first, then gallery selectors, then a
/// scored whole-page fallback.
pub fn static_gallery_images(doc: &Html, params: &CarouselParams) -> Vec<String> {
    let mut urls = magento_gallery_urls(doc, params);

    if urls.is_empty() {
        urls = gallery_selector_images(doc, params);
    }
    if urls.is_empty() {
        urls = scored_page_images(doc, params);
    }

    urls.truncate(params.max_images);
    urls
}

/// Magento injects the gallery data as JSON in `text/x-magento-init`
/// scripts; this is the richest interaction-free source.
fn magento_gallery_urls(doc: &Html, params: &CarouselParams) -> Vec<String> {
    let selector = match Selector::parse(r#"script[type="text/x-magento-init"]"#) {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };
    let mut urls = Vec::new();
    for script in doc.select(&selector) {
        let raw: String = script.text().collect();
        if !raw.contains("mage/gallery/gallery") {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let Some(object) = value.as_object() else {
            continue;
        };
        for entry in object.values() {
            let Some(data) = entry
                .get("mage/gallery/gallery")
                .and_then(|gallery| gallery.get("data"))
                .and_then(Value::as_array)
            else {
                continue;
            };
            for item in data {
                let raw_url = item
                    .get("full")
                    .and_then(Value::as_str)
                    .or_else(|| item.get("img").and_then(Value::as_str));
                if let Some(accepted) = raw_url.and_then(|u| accept_candidate(u, params)) {
                    if !urls.contains(&accepted) {
                        urls.push(accepted);
                    }
                }
            }
        }
    }
    urls
}

fn gallery_selector_images(doc: &Html, params: &CarouselParams) -> Vec<String> {
    let mut urls = Vec::new();
    for selector in selectors::STATIC_GALLERY {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        for element in doc.select(&parsed) {
            let raw = selectors::IMAGE_SOURCE_ATTRS
                .iter()
                .find_map(|attr| element.value().attr(attr))
                .map(str::trim);
            let Some(raw) = raw.filter(|r| !r.is_empty()) else {
                continue;
            };
            if let Some(accepted) = accept_candidate(raw, params) {
                if !urls.contains(&accepted) {
                    urls.push(accepted);
                }
            }
        }
    }
    urls
}

/// Last resort: any page image that looks product-related by URL markers
/// and declared dimensions.
fn scored_page_images(doc: &Html, params: &CarouselParams) -> Vec<String> {
    let parsed = match Selector::parse("img") {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };
    let mut urls = Vec::new();
    for element in doc.select(&parsed) {
        let raw = element
            .value()
            .attr("src")
            .or_else(|| element.value().attr("data-src"));
        let Some(raw) = raw else { continue };

        let declared_tiny = ["width", "height"].iter().any(|attr| {
            element
                .value()
                .attr(attr)
                .and_then(|v| v.parse::<u32>().ok())
                .is_some_and(|size| size < 100)
        });
        if declared_tiny {
            continue;
        }

        let Some(resolved) = resolve_url(&params.base_url, raw) else {
            continue;
        };
        let canonical = canonicalize_image_url(&resolved);
        let lower = canonical.to_lowercase();
        let has_positive = selectors::IMAGE_POSITIVE_MARKERS
            .iter()
            .any(|marker| lower.contains(marker));
        let has_negative = selectors::IMAGE_NEGATIVE_MARKERS
            .iter()
            .any(|marker| lower.contains(marker));
        if has_positive
            && !has_negative
            && is_product_image_url(&canonical, &params.domain_marker)
            && !urls.contains(&canonical)
        {
            urls.push(canonical);
        }
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CarouselParams {
        CarouselParams {
            base_url: "https://nissei.com".to_string(),
            domain_marker: "nissei.com".to_string(),
            click_budget: 8,
            min_image_px: 200,
            settle_ms: 0,
            click_settle_ms: 0,
            max_images: 8,
        }
    }

    #[test]
    fn url_heuristic_requires_extension_domain_and_marker() {
        let marker = "nissei.com";
        assert!(is_product_image_url(
            "https://nissei.com/media/catalog/product/2/e/2e3f.jpg",
            marker
        ));
        assert!(!is_product_image_url(
            "https://nissei.com/media/catalog/product/2/e/2e3f.pdf",
            marker
        ));
        assert!(!is_product_image_url(
            "https://cdn.other.com/media/catalog/product/a.jpg",
            marker
        ));
        assert!(!is_product_image_url(
            "https://nissei.com/static/frontend/theme.jpg",
            marker
        ));
    }

    #[test]
    fn state_collects_distinct_images_in_display_order() {
        let mut state = CarouselState::new(8);
        state.seed("a.jpg".to_string());
        for url in ["b.jpg", "c.jpg", "d.jpg"] {
            assert_eq!(state.observe(Some(url.to_string())), LoopControl::Continue);
        }
        assert_eq!(
            state.into_urls(),
            vec!["a.jpg", "b.jpg", "c.jpg", "d.jpg"]
        );
    }

    #[test]
    fn two_consecutive_stalls_exhaust_the_carousel() {
        let mut state = CarouselState::new(8);
        state.seed("a.jpg".to_string());
        assert_eq!(state.observe(Some("b.jpg".to_string())), LoopControl::Continue);
        assert_eq!(state.observe(Some("b.jpg".to_string())), LoopControl::Continue);
        assert_eq!(state.observe(Some("b.jpg".to_string())), LoopControl::Stop);
        assert_eq!(state.into_urls(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn a_new_image_resets_the_stall_counter() {
        let mut state = CarouselState::new(8);
        state.seed("a.jpg".to_string());
        assert_eq!(state.observe(None), LoopControl::Continue);
        assert_eq!(state.observe(Some("b.jpg".to_string())), LoopControl::Continue);
        assert_eq!(state.observe(None), LoopControl::Continue);
        assert_eq!(state.observe(None), LoopControl::Stop);
        assert_eq!(state.into_urls(), vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn collection_is_bounded_by_the_image_cap() {
        let mut state = CarouselState::new(3);
        state.seed("0.jpg".to_string());
        assert_eq!(state.observe(Some("1.jpg".to_string())), LoopControl::Continue);
        assert_eq!(state.observe(Some("2.jpg".to_string())), LoopControl::Stop);
        assert_eq!(state.into_urls().len(), 3);
    }

    #[test]
    fn duplicate_controls_at_same_position_collapse() {
        let controls = vec![
            NextControl {
                selector: ".fotorama__arr--next".to_string(),
                x: 640,
                y: 300,
            },
            NextControl {
                selector: "button[class*=\"next\"]".to_string(),
                x: 640,
                y: 300,
            },
            NextControl {
                selector: ".slick-next".to_string(),
                x: 100,
                y: 500,
            },
        ];
        let unique = dedupe_by_position(controls);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].selector, ".fotorama__arr--next");
    }

    #[test]
    fn magento_gallery_json_is_the_first_static_source() {
        let doc = Html::parse_document(
            r#"<script type="text/x-magento-init">
            {"[data-gallery-role=gallery-placeholder]": {"mage/gallery/gallery": {"data": [
                {"thumb": "https://nissei.com/media/catalog/product/cache/0123456789abcdef0123456789abcdef/t/1.jpg",
                 "img": "https://nissei.com/media/catalog/product/cache/0123456789abcdef0123456789abcdef/i/1.jpg",
                 "full": "https://nissei.com/media/catalog/product/cache/0123456789abcdef0123456789abcdef/f/1.jpg"},
                {"img": "https://nissei.com/media/catalog/product/f/2.jpg"}
            ]}}}
            </script>"#,
        );
        let urls = static_gallery_images(&doc, &params());
        assert_eq!(
            urls,
            vec![
                "https://nissei.com/media/catalog/product/f/1.jpg".to_string(),
                "https://nissei.com/media/catalog/product/f/2.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn gallery_selectors_prefer_zoom_attributes_and_resolve_relative_urls() {
        let doc = Html::parse_document(
            r#"<div class="fotorama">
                 <img src="/media/catalog/product/small/x.jpg"
                      data-zoom-image="/media/catalog/product/zoom/x.jpg">
               </div>"#,
        );
        let urls = static_gallery_images(&doc, &params());
        assert_eq!(
            urls,
            vec!["https://nissei.com/media/catalog/product/zoom/x.jpg".to_string()]
        );
    }

    #[test]
    fn whole_page_fallback_rejects_chrome_assets() {
        let doc = Html::parse_document(
            r#"<body>
                 <img src="https://nissei.com/media/logo.jpg">
                 <img src="https://nissei.com/media/catalog/product/real/photo.jpg">
                 <img src="https://nissei.com/media/catalog/product/tiny.jpg" width="48" height="48">
               </body>"#,
        );
        let urls = static_gallery_images(&doc, &params());
        assert_eq!(
            urls,
            vec!["https://nissei.com/media/catalog/product/real/photo.jpg".to_string()]
        );
    }

    #[test]
    fn static_results_are_capped() {
        let mut html = String::from("<div class=\"fotorama\">");
        for i in 0..12 {
            html.push_str(&format!(
                "<img src=\"https://nissei.com/media/catalog/product/{i}.jpg\">"
            ));
        }
        html.push_str("</div>");
        let doc = Html::parse_document(&html);
        let urls = static_gallery_images(&doc, &params());
        assert_eq!(urls.len(), 8);
    }
}
