//! Field extraction over a parsed document.
//!
//! One generic first-acceptable-match routine consumes the selector tables;
//! every extractor returns a typed `Option` so "not found" is an outcome,
//! not a swallowed exception.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::domain::normalize::{clean_text, parse_price};
use crate::domain::product::ProductFields;
use crate::extraction::selectors::{self, SelectorRow};
use crate::infrastructure::config::ExtractionConfig;

/// Minimum length before a description block is trusted; anything shorter
/// is usually a stray label.
const MIN_SECTION_LEN: usize = 50;

/// Extract every text field from a product detail document. Images are
/// handled separately (static gallery scan or carousel).
pub fn extract_fields(doc: &Html, config: &ExtractionConfig) -> ProductFields {
    ProductFields {
        name: extract_name(doc),
        price: extract_price(doc, selectors::PRICE),
        original_price: extract_price(doc, selectors::ORIGINAL_PRICE),
        description: extract_description(doc, config.description_max_len),
        short_description: first_text(doc, selectors::SHORT_DESCRIPTION, MIN_SECTION_LEN, 1000),
        sku_code: extract_sku(doc),
        brand: first_text(doc, selectors::BRAND, 2, 50),
        availability: first_text(doc, selectors::AVAILABILITY, 2, 100),
        categories: extract_categories(doc),
        specifications: extract_specifications(doc),
        image_urls: Vec::new(),
    }
}

fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let parsed = Selector::parse(selector).ok()?;
    doc.select(&parsed).next()
}

/// Whitespace-collapsed text content of an element.
fn inline_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Line-per-node text content, for multi-paragraph sections.
fn block_text(element: &ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// First battery match whose text length is plausible.
pub fn first_text(doc: &Html, battery: &[&str], min_len: usize, max_len: usize) -> Option<String> {
    for selector in battery {
        if let Some(element) = select_first(doc, selector) {
            let text = inline_text(&element);
            if text.len() >= min_len {
                let bounded: String = text.chars().take(max_len).collect();
                return Some(bounded.trim().to_string());
            }
        }
    }
    None
}

/// First battery match honoring the row's attribute priority, falling back
/// to text content when the row has no attributes.
pub fn first_value(doc: &Html, battery: &[SelectorRow], min_len: usize) -> Option<String> {
    for row in battery {
        if let Some(element) = select_first(doc, row.selector) {
            if row.attrs.is_empty() {
                let text = inline_text(&element);
                if text.len() >= min_len {
                    return Some(text);
                }
            } else {
                for attr in row.attrs {
                    if let Some(value) = element.value().attr(attr) {
                        let value = value.trim();
                        if value.len() >= min_len {
                            return Some(value.to_string());
                        }
                    }
                }
            }
        }
    }
    None
}

pub fn extract_name(doc: &Html) -> Option<String> {
    first_text(doc, selectors::NAME, 2, 300)
}

/// Walk the battery until one selector yields text that parses as a price.
fn extract_price(doc: &Html, battery: &[&str]) -> Option<Decimal> {
    for selector in battery {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        for element in doc.select(&parsed) {
            if let Some(price) = parse_price(&inline_text(&element)) {
                if !price.is_zero() {
                    return Some(price);
                }
            }
        }
    }
    None
}

/// Strict description priority: the extended-information section is used
/// exclusively when present; only in its absence is the details section
/// tried, and only then a generic block. Tiers are never blended; mixing a
/// generic fallback into a structured section injects navigation
/// boilerplate.
pub fn extract_description(doc: &Html, max_len: usize) -> Option<String> {
    if let Some(text) = extended_information_section(doc) {
        return Some(clean_text(&text, max_len));
    }
    if let Some(text) = section_text(doc, selectors::DESCRIPTION_DETAILS) {
        return Some(clean_text(&text, max_len));
    }
    section_text(doc, selectors::DESCRIPTION_GENERIC).map(|text| clean_text(&text, max_len))
}

fn extended_information_section(doc: &Html) -> Option<String> {
    for selector in selectors::DESCRIPTION_EXTENDED {
        if let Some(element) = select_first(doc, selector) {
            let text = if element.value().name() == "table" || select_inside(&element, "table").is_some()
            {
                table_content(&element)
            } else {
                block_text(&element)
            };
            if text.len() > MIN_SECTION_LEN {
                return Some(text);
            }
        }
    }
    None
}

fn section_text(doc: &Html, battery: &[&str]) -> Option<String> {
    for selector in battery {
        if let Some(element) = select_first(doc, selector) {
            let text = block_text(&element);
            if text.len() > MIN_SECTION_LEN {
                return Some(text);
            }
        }
    }
    None
}

fn select_inside<'a>(element: &ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let parsed = Selector::parse(selector).ok()?;
    element.select(&parsed).next()
}

/// Render a structured spec table as `key: value` lines.
fn table_content(element: &ElementRef) -> String {
    let table = if element.value().name() == "table" {
        *element
    } else {
        match select_inside(element, "table") {
            Some(table) => table,
            None => return block_text(element),
        }
    };

    let row_selector = match Selector::parse("tr") {
        Ok(parsed) => parsed,
        Err(_) => return block_text(element),
    };
    let cell_selector = match Selector::parse("td, th") {
        Ok(parsed) => parsed,
        Err(_) => return block_text(element),
    };

    let mut lines = Vec::new();
    for row in table.select(&row_selector) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if cells.len() >= 2 {
            let key = inline_text(&cells[0]);
            let value = inline_text(&cells[1]);
            if !key.is_empty() && !value.is_empty() {
                lines.push(format!("{key}: {value}"));
            }
        } else if cells.len() == 1 {
            let text = inline_text(&cells[0]);
            if text.len() > 5 {
                lines.push(text);
            }
        }
    }
    lines.join("\n")
}

static SKU_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)SKU[:\s]+([A-Z]{1,5}-\d{4,10})",
        r"(?i)SKU[:\s]+([A-Z0-9-]{5,15})",
        r"(?i)C[oó]digo[:\s]+([A-Z]{1,5}-\d{4,10})",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("sku pattern"))
    .collect()
});

fn match_sku(text: &str) -> Option<String> {
    SKU_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .map(|captures| captures[1].trim().to_uppercase())
}

/// SKU extraction order: label-prefixed patterns near the stock block, the
/// same patterns over the whole page, then `data-sku`-like attributes.
pub fn extract_sku(doc: &Html) -> Option<String> {
    for scope in selectors::SKU_LABEL_SCOPES {
        if let Some(element) = select_first(doc, scope) {
            if let Some(sku) = match_sku(&inline_text(&element)) {
                return Some(sku);
            }
        }
    }

    let page_text = doc.root_element().text().collect::<Vec<_>>().join(" ");
    if let Some(sku) = match_sku(&page_text) {
        return Some(sku);
    }

    first_value(doc, selectors::SKU, 3)
        .filter(|value| value.len() <= 30)
        .map(|value| value.to_uppercase())
}

pub fn extract_specifications(doc: &Html) -> Vec<(String, String)> {
    for selector in selectors::SPEC_TABLES {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let cell_selector = match Selector::parse("td, th") {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let mut specs = Vec::new();
        for row in doc.select(&parsed) {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            if cells.len() >= 2 {
                let key = inline_text(&cells[0]);
                let value = inline_text(&cells[1]);
                if !key.is_empty() && key.len() < 100 && !value.is_empty() {
                    specs.push((key, value));
                }
            }
        }
        if !specs.is_empty() {
            return specs;
        }
    }

    for selector in selectors::SPEC_LISTS {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let mut specs = Vec::new();
        for item in doc.select(&parsed) {
            let text = inline_text(&item);
            if let Some((key, value)) = text.split_once(':') {
                let key = key.trim();
                let value = value.trim();
                if !key.is_empty() && key.len() < 100 && !value.is_empty() {
                    specs.push((key.to_string(), value.to_string()));
                }
            }
        }
        if !specs.is_empty() {
            return specs;
        }
    }

    Vec::new()
}

/// Breadcrumb trail minus navigation entries, first battery that matches.
pub fn extract_categories(doc: &Html) -> Vec<String> {
    for selector in selectors::BREADCRUMBS {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let mut categories = Vec::new();
        for link in doc.select(&parsed) {
            let text = inline_text(&link);
            if text.len() > 2 && !selectors::BREADCRUMB_NOISE.contains(&text.to_lowercase().as_str())
            {
                if !categories.contains(&text) {
                    categories.push(text);
                }
            }
        }
        if !categories.is_empty() {
            return categories;
        }
    }
    Vec::new()
}
