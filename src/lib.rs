//! Product catalog crawling and extraction pipeline for Nissei.com.
//!
//! The core is a multi-tier extraction cascade over an uncontrolled,
//! JS-heavy third-party site: static fetch first, a headless browser with
//! interactive carousel navigation when that falls short, and optionally an
//! AI-assisted pass over the rendered HTML. Extracted products and their
//! transcoded images are upserted idempotently into a SQLite catalog keyed
//! by `(site, url)`.

pub mod domain;
pub mod error;
pub mod extraction;
pub mod infrastructure;
pub mod pipeline;

pub use domain::{CandidateProduct, CatalogEntry, CatalogStore, ExtractedProduct, ProcessedImage};
pub use error::ScrapeError;
pub use infrastructure::{AppConfig, SqliteCatalogStore};
pub use pipeline::{Pipeline, RunReport, RunRequest};
