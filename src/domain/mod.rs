//! Domain layer: catalog entities, normalization and store traits.

pub mod normalize;
pub mod product;
pub mod repositories;

pub use product::{
    CandidateProduct, CatalogEntry, CatalogImage, ExtractedProduct, ExtractionMethod,
    ProcessedImage, ProductFields,
};
pub use repositories::CatalogStore;
