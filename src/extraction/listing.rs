//! Search-result listing discovery.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::domain::normalize::resolve_url;
use crate::domain::product::CandidateProduct;
use crate::error::ScrapeError;
use crate::extraction::selectors;

/// Minimum length before a listing name is trusted.
const MIN_LISTING_NAME_LEN: usize = 3;

/// Build the catalog search URL for a query.
pub fn search_url(base_url: &str, search_path: &str, query: &str) -> Result<String, ScrapeError> {
    let mut url = Url::parse(base_url)
        .and_then(|base| base.join(search_path))
        .map_err(|e| ScrapeError::Config(format!("invalid search URL: {e}")))?;
    url.query_pairs_mut().append_pair("q", query);
    Ok(url.to_string())
}

/// Address a specific search-result page (the site paginates with `?p=N`).
pub fn page_url(search_url: &str, page: u32) -> String {
    if page <= 1 {
        return search_url.to_string();
    }
    match Url::parse(search_url) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("p", &page.to_string());
            url.to_string()
        }
        Err(_) => search_url.to_string(),
    }
}

/// Extract candidate products from a search-result page, bounded by `max`.
///
/// Containers that do not yield both a plausible name and a resolvable link
/// are skipped rather than failing the listing.
pub fn extract_candidates(
    doc: &Html,
    query: &str,
    base_url: &str,
    max: usize,
) -> Vec<CandidateProduct> {
    let container_selector = match Selector::parse(selectors::LISTING_ITEM) {
        Ok(parsed) => parsed,
        Err(_) => return Vec::new(),
    };

    let mut candidates = Vec::new();
    for container in doc.select(&container_selector) {
        if candidates.len() >= max {
            break;
        }
        if let Some(candidate) = extract_single_candidate(&container, query, base_url) {
            if !candidates
                .iter()
                .any(|existing: &CandidateProduct| existing.url == candidate.url)
            {
                candidates.push(candidate);
            }
        }
    }

    debug!(query, found = candidates.len(), "extracted listing candidates");
    candidates
}

fn extract_single_candidate(
    container: &ElementRef,
    query: &str,
    base_url: &str,
) -> Option<CandidateProduct> {
    let name = selectors::LISTING_NAME.iter().find_map(|selector| {
        let parsed = Selector::parse(selector).ok()?;
        let element = container.select(&parsed).next()?;
        let text = element
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        (text.len() > MIN_LISTING_NAME_LEN).then_some(text)
    })?;

    let link_selector = Selector::parse(selectors::LISTING_LINK).ok()?;
    let href = container
        .select(&link_selector)
        .next()
        .and_then(|link| link.value().attr("href"))?;
    let url = resolve_url(base_url, href)?;

    Some(CandidateProduct {
        name,
        url,
        search_query: query.to_string(),
    })
}
