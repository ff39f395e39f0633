//! Error taxonomy for the extraction pipeline.
//!
//! Tier-level failures (network, render, AI parsing) are expected during
//! normal operation; the cascade converts them into "this tier produced
//! nothing" and escalates. Storage and configuration errors surface to the
//! pipeline caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("network request failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("browser rendering failed: {0}")]
    Render(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("AI response unusable: {0}")]
    AiResponse(String),

    #[error("storage operation failed: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ScrapeError {
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn invalid_image(message: impl Into<String>) -> Self {
        Self::InvalidImage(message.into())
    }
}
