//! SQLite implementation of the catalog store.
//!
//! Entries are keyed by a `(site_id, url)` uniqueness constraint; the store
//! relies on that constraint for create-or-update semantics. Image
//! replacement is transactional: the old gallery is deleted and the new set
//! inserted in order, with the first image as principal and mirrored into
//! the entry's `main_image` slot.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::domain::product::{
    CatalogEntry, CatalogImage, ExtractedProduct, ExtractionMethod, ProcessedImage,
};
use crate::domain::repositories::CatalogStore;
use crate::error::ScrapeError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id TEXT NOT NULL,
    url TEXT NOT NULL,
    name TEXT NOT NULL,
    search_query TEXT,
    price TEXT,
    original_price TEXT,
    description TEXT,
    short_description TEXT,
    sku_code TEXT,
    brand TEXT,
    availability TEXT,
    categories TEXT NOT NULL DEFAULT '[]',
    specifications TEXT NOT NULL DEFAULT '[]',
    extraction_method TEXT NOT NULL DEFAULT 'listing_only',
    details_extracted INTEGER NOT NULL DEFAULT 0,
    main_image TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (site_id, url)
);

CREATE TABLE IF NOT EXISTS catalog_images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id INTEGER NOT NULL REFERENCES catalog_products (id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    content BLOB NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    original_url TEXT NOT NULL,
    alt_text TEXT,
    is_main INTEGER NOT NULL DEFAULT 0,
    position INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_catalog_images_product ON catalog_images (product_id);
"#;

#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Open (creating if missing) the database at `database_url` and
    /// initialize the schema.
    pub async fn connect(database_url: &str) -> Result<Self, ScrapeError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(ScrapeError::Storage)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool (tests use in-memory SQLite).
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, ScrapeError> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self) -> Result<(), ScrapeError> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Ordered gallery rows for one product.
    pub async fn images_for(&self, product_id: i64) -> Result<Vec<CatalogImage>, ScrapeError> {
        let rows = sqlx::query(
            "SELECT id, product_id, filename, content, width, height, original_url, alt_text, \
             is_main, position \
             FROM catalog_images WHERE product_id = ? ORDER BY position ASC",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(image_from_row).collect()
    }

    async fn replace_images(
        &self,
        product_id: i64,
        product_name: &str,
        images: &[ProcessedImage],
    ) -> Result<(), ScrapeError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM catalog_images WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        let mut main_filename: Option<String> = None;
        for image in images {
            sqlx::query(
                "INSERT INTO catalog_images \
                 (product_id, filename, content, width, height, original_url, alt_text, \
                  is_main, position) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(product_id)
            .bind(&image.filename)
            .bind(image.content.as_slice())
            .bind(i64::from(image.width))
            .bind(i64::from(image.height))
            .bind(&image.original_url)
            .bind(format!("{} - Imagen {}", product_name, image.order + 1))
            .bind(image.is_main)
            .bind(i64::from(image.order))
            .execute(&mut *tx)
            .await?;

            if image.is_main {
                main_filename = Some(image.filename.clone());
            }
        }

        sqlx::query("UPDATE catalog_products SET main_image = ?, updated_at = ? WHERE id = ?")
            .bind(&main_filename)
            .bind(Utc::now())
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(product_id, count = images.len(), "replaced product gallery");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn find_by_url(
        &self,
        site_id: &str,
        url: &str,
    ) -> Result<Option<CatalogEntry>, ScrapeError> {
        let row = sqlx::query(
            "SELECT id, site_id, url, name, search_query, price, original_price, description, \
             short_description, sku_code, brand, availability, categories, specifications, \
             extraction_method, details_extracted, main_image, created_at, updated_at \
             FROM catalog_products WHERE site_id = ? AND url = ?",
        )
        .bind(site_id)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn upsert(
        &self,
        site_id: &str,
        product: &ExtractedProduct,
        images: &[ProcessedImage],
    ) -> Result<CatalogEntry, ScrapeError> {
        let now = Utc::now();
        let existing = self.find_by_url(site_id, &product.url).await?;
        let price = product.price.map(|d| d.to_string());
        let original_price = product.original_price.map(|d| d.to_string());
        let categories = serde_json::to_string(&product.categories)
            .unwrap_or_else(|_| "[]".to_string());
        let specifications = serde_json::to_string(&product.specifications)
            .unwrap_or_else(|_| "[]".to_string());

        let product_id = match existing {
            Some(entry) => {
                if product.details_extracted {
                    sqlx::query(
                        "UPDATE catalog_products SET \
                         name = ?, search_query = ?, price = ?, original_price = ?, \
                         description = ?, short_description = ?, sku_code = ?, brand = ?, \
                         availability = ?, categories = ?, specifications = ?, \
                         extraction_method = ?, details_extracted = 1, updated_at = ? \
                         WHERE id = ?",
                    )
                    .bind(&product.name)
                    .bind(&product.search_query)
                    .bind(&price)
                    .bind(&original_price)
                    .bind(&product.description)
                    .bind(&product.short_description)
                    .bind(&product.sku_code)
                    .bind(&product.brand)
                    .bind(&product.availability)
                    .bind(&categories)
                    .bind(&specifications)
                    .bind(product.extraction_method.as_str())
                    .bind(now)
                    .bind(entry.id)
                    .execute(&self.pool)
                    .await?;
                } else {
                    // A detail-less re-run refreshes listing-level fields
                    // only; previously captured rich data stays put.
                    sqlx::query(
                        "UPDATE catalog_products SET \
                         name = ?, search_query = ?, \
                         price = COALESCE(?, price), \
                         original_price = COALESCE(?, original_price), \
                         updated_at = ? \
                         WHERE id = ?",
                    )
                    .bind(&product.name)
                    .bind(&product.search_query)
                    .bind(&price)
                    .bind(&original_price)
                    .bind(now)
                    .bind(entry.id)
                    .execute(&self.pool)
                    .await?;
                }
                entry.id
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO catalog_products \
                     (site_id, url, name, search_query, price, original_price, description, \
                      short_description, sku_code, brand, availability, categories, \
                      specifications, extraction_method, details_extracted, main_image, \
                      created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)",
                )
                .bind(site_id)
                .bind(&product.url)
                .bind(&product.name)
                .bind(&product.search_query)
                .bind(&price)
                .bind(&original_price)
                .bind(&product.description)
                .bind(&product.short_description)
                .bind(&product.sku_code)
                .bind(&product.brand)
                .bind(&product.availability)
                .bind(&categories)
                .bind(&specifications)
                .bind(product.extraction_method.as_str())
                .bind(product.details_extracted)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await?;
                result.last_insert_rowid()
            }
        };

        if !images.is_empty() {
            self.replace_images(product_id, &product.name, images).await?;
        }

        self.find_by_url(site_id, &product.url)
            .await?
            .ok_or(ScrapeError::Storage(sqlx::Error::RowNotFound))
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<CatalogEntry, ScrapeError> {
    let categories: String = row.try_get("categories")?;
    let specifications: String = row.try_get("specifications")?;
    let price: Option<String> = row.try_get("price")?;
    let original_price: Option<String> = row.try_get("original_price")?;
    let extraction_method: String = row.try_get("extraction_method")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(CatalogEntry {
        id: row.try_get("id")?,
        site_id: row.try_get("site_id")?,
        url: row.try_get("url")?,
        name: row.try_get("name")?,
        search_query: row.try_get("search_query")?,
        price: price.as_deref().and_then(|p| Decimal::from_str(p).ok()),
        original_price: original_price
            .as_deref()
            .and_then(|p| Decimal::from_str(p).ok()),
        description: row.try_get("description")?,
        short_description: row.try_get("short_description")?,
        sku_code: row.try_get("sku_code")?,
        brand: row.try_get("brand")?,
        availability: row.try_get("availability")?,
        categories: serde_json::from_str(&categories).unwrap_or_default(),
        specifications: serde_json::from_str(&specifications).unwrap_or_default(),
        extraction_method: ExtractionMethod::from_str_lossy(&extraction_method),
        details_extracted: row.try_get("details_extracted")?,
        main_image: row.try_get("main_image")?,
        created_at,
        updated_at,
    })
}

fn image_from_row(row: &SqliteRow) -> Result<CatalogImage, ScrapeError> {
    let width: i64 = row.try_get("width")?;
    let height: i64 = row.try_get("height")?;
    let position: i64 = row.try_get("position")?;
    Ok(CatalogImage {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        filename: row.try_get("filename")?,
        content: row.try_get("content")?,
        width: width as u32,
        height: height as u32,
        original_url: row.try_get("original_url")?,
        alt_text: row.try_get("alt_text")?,
        is_main: row.try_get("is_main")?,
        position: position as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::CandidateProduct;

    async fn memory_store() -> SqliteCatalogStore {
        SqliteCatalogStore::connect("sqlite::memory:")
            .await
            .expect("in-memory store")
    }

    fn detailed_product() -> ExtractedProduct {
        let candidate = CandidateProduct {
            name: "iPhone 16 Pro Max 256GB".to_string(),
            url: "https://nissei.com/py/iphone-16-pro-max".to_string(),
            search_query: "iphone".to_string(),
        };
        let mut product = ExtractedProduct::from_candidate(&candidate);
        product.price = Some(Decimal::from_str("9999000").unwrap());
        product.description = Some("Pantalla OLED, chip A18 Pro, camara de 48MP.".to_string());
        product.brand = Some("Apple".to_string());
        product.specifications = vec![("Memoria".to_string(), "256GB".to_string())];
        product.details_extracted = true;
        product.extraction_method = ExtractionMethod::Rendered;
        product
    }

    fn stub_product() -> ExtractedProduct {
        let candidate = CandidateProduct {
            name: "iPhone 16 Pro Max 256GB".to_string(),
            url: "https://nissei.com/py/iphone-16-pro-max".to_string(),
            search_query: "iphone".to_string(),
        };
        ExtractedProduct::listing_stub(&candidate)
    }

    fn image(order: u32, is_main: bool) -> ProcessedImage {
        ProcessedImage {
            content: vec![0xFF, 0xD8, 0xFF, 0xE0],
            width: 800,
            height: 600,
            original_url: format!("https://nissei.com/media/catalog/product/{order}.jpg"),
            filename: format!("iphone_{order}.jpg"),
            is_main,
            order,
        }
    }

    #[tokio::test]
    async fn stub_rerun_does_not_clobber_rich_fields() {
        let store = memory_store().await;
        store
            .upsert("nissei", &detailed_product(), &[])
            .await
            .unwrap();

        let entry = store.upsert("nissei", &stub_product(), &[]).await.unwrap();
        assert_eq!(
            entry.description.as_deref(),
            Some("Pantalla OLED, chip A18 Pro, camara de 48MP.")
        );
        assert_eq!(entry.brand.as_deref(), Some("Apple"));
        assert!(entry.details_extracted);
        // Listing-level fields still refresh.
        assert_eq!(entry.name, "iPhone 16 Pro Max 256GB");
    }

    #[tokio::test]
    async fn image_replacement_keeps_exactly_one_principal() {
        let store = memory_store().await;
        let first = [image(0, true), image(1, false)];
        let entry = store
            .upsert("nissei", &detailed_product(), &first)
            .await
            .unwrap();
        assert_eq!(entry.main_image.as_deref(), Some("iphone_0.jpg"));

        let second = [image(0, true), image(1, false), image(2, false)];
        let entry = store
            .upsert("nissei", &detailed_product(), &second)
            .await
            .unwrap();

        let images = store.images_for(entry.id).await.unwrap();
        assert_eq!(images.len(), 3);
        let principals: Vec<_> = images.iter().filter(|i| i.is_main).collect();
        assert_eq!(principals.len(), 1);
        assert_eq!(principals[0].position, 0);
        assert_eq!(entry.main_image.as_deref(), Some("iphone_0.jpg"));
    }

    #[tokio::test]
    async fn empty_image_set_leaves_stored_gallery_alone() {
        let store = memory_store().await;
        let entry = store
            .upsert("nissei", &detailed_product(), &[image(0, true)])
            .await
            .unwrap();
        assert_eq!(store.images_for(entry.id).await.unwrap().len(), 1);

        let entry = store
            .upsert("nissei", &detailed_product(), &[])
            .await
            .unwrap();
        assert_eq!(store.images_for(entry.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn round_trips_decimal_prices_and_specifications() {
        let store = memory_store().await;
        let entry = store
            .upsert("nissei", &detailed_product(), &[])
            .await
            .unwrap();
        assert_eq!(entry.price, Some(Decimal::from_str("9999000").unwrap()));
        assert_eq!(
            entry.specifications,
            vec![("Memoria".to_string(), "256GB".to_string())]
        );
        assert_eq!(entry.extraction_method, ExtractionMethod::Rendered);
    }
}
