//! AI-assisted relevance filter for listing candidates.
//!
//! Keeps the products that are the primary subject of the query and drops
//! accessories. A quality improvement, never a correctness dependency: any
//! failure (capability unavailable, timeout, malformed response) falls open
//! to the original unfiltered list.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::product::CandidateProduct;
use crate::infrastructure::ai_client::{extract_json_object, AiClient};

#[derive(Debug, Serialize)]
struct CandidateSummary<'a> {
    index: usize,
    name: &'a str,
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct FilterVerdict {
    filtered_indices: Vec<usize>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Filter candidates down to the query's primary subjects.
pub async fn filter_candidates(
    ai: &AiClient,
    candidates: Vec<CandidateProduct>,
    query: &str,
) -> Vec<CandidateProduct> {
    if candidates.is_empty() {
        return candidates;
    }

    let prompt = match filter_prompt(&candidates, query) {
        Some(prompt) => prompt,
        None => return candidates,
    };

    let response = match ai.complete(&prompt).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "relevance filter unavailable, keeping all candidates");
            return candidates;
        }
    };

    match apply_verdict(&candidates, &response) {
        Some(filtered) => filtered,
        None => {
            warn!("relevance filter response unusable, keeping all candidates");
            candidates
        }
    }
}

fn filter_prompt(candidates: &[CandidateProduct], query: &str) -> Option<String> {
    let summaries: Vec<CandidateSummary> = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| CandidateSummary {
            index,
            name: &candidate.name,
            url: &candidate.url,
        })
        .collect();
    let listing = serde_json::to_string_pretty(&summaries).ok()?;

    Some(format!(
        "These products came from a catalog search for \"{query}\":\n\
         \n\
         {listing}\n\
         \n\
         Keep only the products that are the PRIMARY subject of the search. Remove \
         accessories such as cases, screen protectors and chargers, and clearly \
         unrelated items. When you are not sure whether an item belongs, KEEP it.\n\
         \n\
         Respond ONLY with valid JSON:\n\
         {{\"filtered_indices\": [0, 1, 3], \"reasoning\": \"brief reason\"}}"
    ))
}

/// Apply a filter response to the candidate list. `None` means the response
/// was unusable and the caller should fall open.
fn apply_verdict(
    candidates: &[CandidateProduct],
    response: &str,
) -> Option<Vec<CandidateProduct>> {
    let json = extract_json_object(response)?;
    let verdict: FilterVerdict = serde_json::from_str(&json).ok()?;

    let kept: Vec<CandidateProduct> = verdict
        .filtered_indices
        .iter()
        .filter(|&&index| index < candidates.len())
        .map(|&index| candidates[index].clone())
        .collect();

    debug!(
        kept = kept.len(),
        total = candidates.len(),
        reasoning = verdict.reasoning.as_deref().unwrap_or("n/a"),
        "relevance filter applied"
    );
    Some(kept)
}
