//! Infrastructure layer: configuration, logging, HTTP, browser automation,
//! image transcoding, AI capability and the SQLite catalog store.

pub mod ai_client;
pub mod browser_driver;
pub mod catalog_repository;
pub mod config;
pub mod http_client;
pub mod image_processor;
pub mod logging;

pub use ai_client::AiClient;
pub use browser_driver::{BrowserSession, RenderedPage};
pub use catalog_repository::SqliteCatalogStore;
pub use config::AppConfig;
pub use http_client::HttpClient;
pub use image_processor::ImageProcessor;
