//! End-to-end pipeline run against a mock site: listing discovery, static
//! detail extraction, image download/transcoding and catalog persistence.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nissei_catalog::infrastructure::config::{AppConfig, HttpClientConfig};
use nissei_catalog::{Pipeline, RunRequest, SqliteCatalogStore};

fn listing_page(base: &str, count: usize) -> String {
    let mut html = String::from("<html><body><ol class=\"products list\">");
    for i in 0..count {
        html.push_str(&format!(
            "<li class=\"product-item\"><h3 class=\"product-item-name\">\
             <a href=\"{base}/py/item-{i}.html\">Producto de prueba numero {i}</a>\
             </h3></li>"
        ));
    }
    html.push_str("</ol></body></html>");
    html
}

fn detail_page(base: &str, index: usize) -> String {
    format!(
        r#"<html><body>
        <h1 class="page-title"><span>Producto de prueba numero {index} 256GB</span></h1>
        <div class="product-info-price">
          <span class="price-wrapper"><span class="price">Gs. 1.500.000</span></span>
        </div>
        <div class="product attribute description"><div class="value">
          Una descripcion suficientemente larga para el umbral del predicado de suficiencia.
        </div></div>
        <div class="fotorama">
          <img src="{base}/media/catalog/product/{index}/a.jpg">
          <img src="{base}/media/catalog/product/{index}/b.jpg">
        </div>
        </body></html>"#
    )
}

/// A PNG that compresses poorly enough to clear the minimum byte gate.
fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x * 7 + y * 13) % 256) as u8,
            ((x * 3 + y * 29) % 256) as u8,
            ((x * 17 + y * 5) % 256) as u8,
        ])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("png fixture");
    buffer.into_inner()
}

fn test_config(base: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.site.base_url = base.to_string();
    config.site.domain_marker = String::new();
    config.browser.enabled = false;
    config.extraction.delay_between_products_ms = 0;
    config.http = HttpClientConfig {
        max_requests_per_second: 1000,
        retry_count: 0,
        ..HttpClientConfig::default()
    };
    config
}

async fn mount_site(server: &MockServer, detailed: usize, total: usize) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/py/catalogsearch/result/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_page(&base, total)))
        .mount(server)
        .await;

    for i in 0..detailed {
        Mock::given(method("GET"))
            .and(path(format!("/py/item-{i}.html")))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_page(&base, i)))
            .mount(server)
            .await;
        for img in ["a", "b"] {
            Mock::given(method("GET"))
                .and(path(format!("/media/catalog/product/{i}/{img}.jpg")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "image/png")
                        .set_body_bytes(noisy_png(400, 300)),
                )
                .mount(server)
                .await;
        }
    }
}

#[tokio::test]
async fn full_run_extracts_details_and_persists_stubs() {
    let server = MockServer::start().await;
    mount_site(&server, 2, 10).await;

    let store = SqliteCatalogStore::connect("sqlite::memory:")
        .await
        .expect("store");
    let pipeline = Pipeline::new(test_config(&server.uri()), Arc::new(store.clone()))
        .expect("pipeline");

    let report = pipeline
        .run(&RunRequest {
            query: "producto".to_string(),
            max_results: 10,
            max_detailed: 2,
            max_images_per_product: 8,
        })
        .await
        .expect("run");

    assert_eq!(report.found, 10);
    assert_eq!(report.processed, 2);
    assert_eq!(report.saved, 10);
    assert_eq!(report.errors, 0, "errors: {:?}", report.error_messages);

    use nissei_catalog::CatalogStore;

    // Detailed entries carry rich data and a gallery with one principal.
    for i in 0..2 {
        let url = format!("{}/py/item-{i}.html", server.uri());
        let entry = store
            .find_by_url("nissei", &url)
            .await
            .unwrap()
            .expect("detailed entry persisted");
        assert!(entry.details_extracted);
        assert!(entry.price.is_some());
        assert!(entry.description.is_some());
        assert_eq!(entry.extraction_method.as_str(), "static");

        let images = store.images_for(entry.id).await.unwrap();
        assert_eq!(images.len(), 2);
        let principals: Vec<_> = images.iter().filter(|img| img.is_main).collect();
        assert_eq!(principals.len(), 1);
        assert_eq!(principals[0].position, 0);
        assert_eq!(entry.main_image.as_deref(), Some(principals[0].filename.as_str()));
        // Transcoded output is JPEG regardless of the PNG source.
        assert!(images[0].content.starts_with(&[0xFF, 0xD8, 0xFF]));
    }

    // The remainder are listing-only stubs with no images.
    for i in 2..10 {
        let url = format!("{}/py/item-{i}.html", server.uri());
        let entry = store
            .find_by_url("nissei", &url)
            .await
            .unwrap()
            .expect("stub entry persisted");
        assert!(!entry.details_extracted);
        assert_eq!(entry.extraction_method.as_str(), "listing_only");
        assert!(entry.price.is_none());
        assert!(store.images_for(entry.id).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn reruns_are_idempotent_and_keep_rich_data() {
    let server = MockServer::start().await;
    mount_site(&server, 1, 3).await;

    let store = SqliteCatalogStore::connect("sqlite::memory:")
        .await
        .expect("store");
    let pipeline = Pipeline::new(test_config(&server.uri()), Arc::new(store.clone()))
        .expect("pipeline");

    let request = RunRequest {
        query: "producto".to_string(),
        max_results: 3,
        max_detailed: 1,
        max_images_per_product: 8,
    };
    pipeline.run(&request).await.expect("first run");

    // Second run with a detail budget of zero: every candidate becomes a
    // stub, which must not clobber the rich row from the first run.
    let stub_only = RunRequest {
        max_detailed: 0,
        ..request.clone()
    };
    let report = pipeline.run(&stub_only).await.expect("second run");
    assert_eq!(report.found, 3);
    assert_eq!(report.processed, 0);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_products")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 3, "no duplicate rows on re-run");

    use nissei_catalog::CatalogStore;
    let url = format!("{}/py/item-0.html", server.uri());
    let entry = store.find_by_url("nissei", &url).await.unwrap().unwrap();
    assert!(entry.details_extracted, "stub re-run kept the detailed flag");
    assert!(entry.description.is_some(), "stub re-run kept the description");
    assert_eq!(store.images_for(entry.id).await.unwrap().len(), 2);
}
