//! The field-extraction cascade.
//!
//! Tiers escalate from cheap to expensive (static fetch, rendered DOM,
//! AI-assisted extraction) and stop at the first tier whose merged result
//! satisfies the sufficiency predicate. Tier failures are logged and
//! converted into "this tier produced nothing"; they never abort the
//! product.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::Html;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::domain::normalize::parse_price;
use crate::domain::product::{
    CandidateProduct, ExtractedProduct, ExtractionMethod, ProductFields,
};
use crate::extraction::carousel::{self, CarouselParams};
use crate::extraction::fields;
use crate::infrastructure::ai_client::{extract_json_object, AiClient};
use crate::infrastructure::browser_driver::BrowserSession;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::http_client::HttpClient;

pub struct CascadeContext<'a> {
    pub http: &'a HttpClient,
    pub browser: Option<&'a BrowserSession>,
    pub ai: Option<&'a AiClient>,
    pub config: &'a AppConfig,
    pub max_images: usize,
}

/// Run the cascade for one candidate. Infallible by design: the worst case
/// is a record that never became sufficient, which the caller persists with
/// whatever was gathered.
pub async fn extract_product(
    ctx: &CascadeContext<'_>,
    candidate: &CandidateProduct,
) -> ExtractedProduct {
    let mut product = ExtractedProduct::from_candidate(candidate);
    let params = CarouselParams::from_config(ctx.config, ctx.max_images);

    // Tier 0: static fetch.
    let mut static_html: Option<String> = None;
    match ctx.http.get_text(&candidate.url).await {
        Ok(html) => {
            {
                let doc = Html::parse_document(&html);
                let mut extracted = fields::extract_fields(&doc, &ctx.config.extraction);
                extracted.image_urls = carousel::static_gallery_images(&doc, &params);
                product.absorb(extracted);
            }
            product.extraction_method = ExtractionMethod::Static;
            static_html = Some(html);
        }
        Err(e) => {
            warn!(url = %candidate.url, error = %e, "static tier produced nothing");
        }
    }

    if product.extraction_method == ExtractionMethod::Static && product.is_sufficient() {
        debug!(url = %candidate.url, "static tier sufficient, not escalating");
        return finalize(product);
    }

    // Tier 1: rendered DOM plus carousel navigation.
    let mut rendered_html: Option<String> = None;
    if let Some(browser) = ctx.browser {
        match browser.render(&candidate.url).await {
            Ok(page) => {
                page.activate_detail_tabs().await;

                match page.html().await {
                    Ok(html) => {
                        {
                            let doc = Html::parse_document(&html);
                            let extracted = fields::extract_fields(&doc, &ctx.config.extraction);
                            product.absorb(extracted);
                        }
                        rendered_html = Some(html);
                    }
                    Err(e) => warn!(url = %candidate.url, error = %e, "snapshot failed"),
                }

                // The carousel yields the full gallery versus the static
                // tier's single preview image, so rendered-tier images take
                // priority whenever they exist.
                let carousel_images = carousel::extract_carousel_images(&page, &params).await;
                if !carousel_images.is_empty() {
                    info!(
                        url = %candidate.url,
                        count = carousel_images.len(),
                        "carousel images replace static images"
                    );
                    product.replace_images_if_richer(carousel_images);
                }

                page.close().await;
                product.extraction_method = ExtractionMethod::Rendered;
            }
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "rendered tier produced nothing");
            }
        }

        if product.extraction_method == ExtractionMethod::Rendered && product.is_sufficient() {
            debug!(url = %candidate.url, "rendered tier sufficient, not escalating");
            return finalize(product);
        }
    }

    // Tier 2: AI-assisted extraction over the trimmed HTML.
    if let Some(ai) = ctx.ai {
        let source = rendered_html.or(static_html);
        if let Some(html) = source {
            let trimmed = prepare_html_for_ai(&html, ctx.config.extraction.ai_html_budget);
            let prompt = extraction_prompt(&candidate.url, &trimmed);
            match ai.complete(&prompt).await {
                Ok(response) => {
                    let extracted = parse_ai_response(&response, ctx.max_images);
                    if extracted.is_empty() {
                        warn!(url = %candidate.url, "AI tier returned no usable fields");
                    } else {
                        product.absorb(extracted);
                        product.extraction_method = ExtractionMethod::Ai;
                    }
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %e, "AI tier produced nothing");
                }
            }
        }
    }

    finalize(product)
}

fn finalize(mut product: ExtractedProduct) -> ExtractedProduct {
    product.details_extracted = product.extraction_method.is_detailed();
    product
}

static STRIPPED_BLOCKS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["script", "style", "nav", "header", "footer", "aside"]
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}[\s>].*?</{tag}\s*>"))
                .expect("tag strip pattern")
        })
        .collect()
});

static HTML_COMMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));

/// Trim rendered HTML for the extraction prompt: drop script/style/nav
/// blocks and comments, then cap to the character budget.
pub fn prepare_html_for_ai(html: &str, budget: usize) -> String {
    let mut trimmed = HTML_COMMENTS.replace_all(html, "").into_owned();
    for pattern in STRIPPED_BLOCKS.iter() {
        trimmed = pattern.replace_all(&trimmed, "").into_owned();
    }
    if trimmed.chars().count() > budget {
        let cut: String = trimmed.chars().take(budget).collect();
        format!("{cut}...[content truncated]")
    } else {
        trimmed
    }
}

fn extraction_prompt(url: &str, html: &str) -> String {
    format!(
        "Analyze this product page HTML from an e-commerce site in Paraguay and extract \
         structured information.\n\
         \n\
         URL: {url}\n\
         \n\
         Look specifically for \"Más Información\", \"Detalles\" and \"Descripción\" sections, \
         technical specification tables, the exact product name, prices in Guaranies (Gs.) and \
         full-resolution product image URLs.\n\
         \n\
         HTML:\n{html}\n\
         \n\
         Respond ONLY with a valid JSON object in this exact shape:\n\
         {{\n\
           \"name\": \"full product name\",\n\
           \"price\": number_or_null,\n\
           \"original_price\": number_or_null,\n\
           \"description\": \"content of the detail sections\",\n\
           \"image_urls\": [\"https://...\"],\n\
           \"specifications\": {{\"feature\": \"value\"}},\n\
           \"availability\": \"stock text\",\n\
           \"brand\": \"brand\"\n\
         }}\n\
         Use null for fields that are not clearly present. Image URLs must be absolute. \
         Prices must be plain numbers without separators."
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AiExtraction {
    name: Option<String>,
    price: Option<Value>,
    original_price: Option<Value>,
    description: Option<String>,
    image_urls: Option<Vec<Value>>,
    specifications: Option<serde_json::Map<String, Value>>,
    availability: Option<String>,
    brand: Option<String>,
}

/// Parse the AI response, keeping only fields that are present and
/// well-typed. A malformed response yields an empty partial, never an
/// error; field-level drops are not a tier failure.
pub fn parse_ai_response(response: &str, max_images: usize) -> ProductFields {
    let Some(json) = extract_json_object(response) else {
        return ProductFields::default();
    };
    let Ok(raw) = serde_json::from_str::<AiExtraction>(&json) else {
        return ProductFields::default();
    };

    let mut fields = ProductFields {
        name: raw
            .name
            .map(|n| n.trim().chars().take(300).collect::<String>())
            .filter(|n| !n.is_empty()),
        price: raw.price.as_ref().and_then(decimal_from_value),
        original_price: raw.original_price.as_ref().and_then(decimal_from_value),
        description: raw
            .description
            .map(|d| d.trim().chars().take(2000).collect::<String>())
            .filter(|d| !d.is_empty()),
        availability: raw
            .availability
            .map(|a| a.chars().take(100).collect::<String>())
            .filter(|a| !a.is_empty()),
        brand: raw
            .brand
            .map(|b| b.chars().take(50).collect::<String>())
            .filter(|b| !b.is_empty()),
        ..ProductFields::default()
    };

    if let Some(urls) = raw.image_urls {
        fields.image_urls = urls
            .iter()
            .filter_map(Value::as_str)
            .filter(|url| url.starts_with("http"))
            .take(max_images)
            .map(str::to_string)
            .collect();
    }

    if let Some(specs) = raw.specifications {
        fields.specifications = specs
            .iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let key: String = key.trim().chars().take(50).collect();
                let value: String = value.trim().chars().take(200).collect();
                (!key.is_empty() && !value.is_empty()).then_some((key, value))
            })
            .collect();
    }

    fields
}

/// Accept a price as a JSON number or a locale-formatted string; drop
/// negatives.
fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let decimal = match value {
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        Value::String(s) => parse_price(s),
        _ => None,
    }?;
    (!decimal.is_sign_negative()).then_some(decimal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::{AiConfig, AiProvider, HttpClientConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_well_typed_ai_fields_and_drops_the_rest() {
        let response = r#"```json
        {
          "name": "iPhone 16 Pro Max 256GB",
          "price": 9999000,
          "original_price": "Gs. 11.500.000",
          "description": 42,
          "image_urls": ["https://nissei.com/media/catalog/product/a.jpg", 17, "not-a-url"],
          "specifications": {"Memoria": "256GB", "Nested": {"x": 1}},
          "availability": "En stock",
          "brand": null
        }
        ```"#;
        let fields = parse_ai_response(response, 8);
        assert_eq!(fields.name.as_deref(), Some("iPhone 16 Pro Max 256GB"));
        assert_eq!(fields.price, Some(Decimal::from_str("9999000").unwrap()));
        assert_eq!(
            fields.original_price,
            Some(Decimal::from_str("11500000").unwrap())
        );
        // Wrong-typed description dropped without failing the tier.
        assert_eq!(fields.description, None);
        assert_eq!(
            fields.image_urls,
            vec!["https://nissei.com/media/catalog/product/a.jpg".to_string()]
        );
        assert_eq!(
            fields.specifications,
            vec![("Memoria".to_string(), "256GB".to_string())]
        );
        assert_eq!(fields.availability.as_deref(), Some("En stock"));
        assert_eq!(fields.brand, None);
    }

    #[test]
    fn malformed_ai_response_yields_empty_fields() {
        assert!(parse_ai_response("no json at all", 8).is_empty());
        assert!(parse_ai_response("{broken json", 8).is_empty());
    }

    #[test]
    fn negative_ai_prices_are_dropped() {
        let fields = parse_ai_response(r#"{"price": -100}"#, 8);
        assert_eq!(fields.price, None);
    }

    #[test]
    fn html_trimming_strips_scripts_and_caps_length() {
        let html = "<html><head><script>var x = 1;</script><style>.a{}</style></head>\
                    <body><nav><a>menu</a></nav><main>Producto principal</main></body></html>";
        let trimmed = prepare_html_for_ai(html, 8000);
        assert!(trimmed.contains("Producto principal"));
        assert!(!trimmed.contains("var x"));
        assert!(!trimmed.contains("menu"));

        let long = format!("<body>{}</body>", "z".repeat(10_000));
        let capped = prepare_html_for_ai(&long, 100);
        assert!(capped.ends_with("...[content truncated]"));
    }

    fn sufficient_product_page() -> &'static str {
        r#"<html><body>
            <h1 class="page-title"><span>iPhone 16 Pro Max 256GB Titanio</span></h1>
            <div class="product-info-price">
              <span class="price-wrapper"><span class="price">Gs. 9.999.000</span></span>
            </div>
            <div class="product attribute description"><div class="value">
              Pantalla OLED de 6.9 pulgadas, chip A18 Pro y camara de 48MP con zoom optico.
            </div></div>
        </body></html>"#
    }

    /// Tier escalation is lazy: once the static tier satisfies the
    /// sufficiency predicate, the AI capability must never be called.
    #[tokio::test]
    async fn sufficient_static_tier_never_calls_ai() {
        let site = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/py/iphone.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sufficient_product_page()))
            .mount(&site)
            .await;

        let ai_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&ai_server)
            .await;

        std::env::set_var("CASCADE_TEST_TOKEN", "test-token");
        let ai = AiClient::from_config(&AiConfig {
            provider: AiProvider::Anthropic,
            endpoint: ai_server.uri(),
            token_env: "CASCADE_TEST_TOKEN".to_string(),
            ..AiConfig::default()
        })
        .expect("ai client");

        let mut config = AppConfig::default();
        config.site.base_url = site.uri();
        config.site.domain_marker = String::new();
        let http = HttpClient::new(HttpClientConfig {
            max_requests_per_second: 100,
            ..HttpClientConfig::default()
        })
        .unwrap();

        let ctx = CascadeContext {
            http: &http,
            browser: None,
            ai: Some(&ai),
            config: &config,
            max_images: 8,
        };
        let candidate = CandidateProduct {
            name: "iPhone 16 Pro Max".to_string(),
            url: format!("{}/py/iphone.html", site.uri()),
            search_query: "iphone".to_string(),
        };

        let product = extract_product(&ctx, &candidate).await;
        assert_eq!(product.extraction_method, ExtractionMethod::Static);
        assert!(product.details_extracted);
        assert!(product.is_sufficient());
        // MockServer verifies the expect(0) on drop.
    }

    #[tokio::test]
    async fn ai_tier_fills_gaps_when_earlier_tiers_fall_short() {
        let site = MockServer::start().await;
        // Page with a name but no price and no description: insufficient.
        Mock::given(method("GET"))
            .and(path("/py/novedad.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><h1 class="page-title"><span>Notebook Lenovo IdeaPad 5</span></h1></body></html>"#,
            ))
            .mount(&site)
            .await;

        let ai_server = MockServer::start().await;
        let ai_payload = serde_json::json!({
            "content": [{
                "text": "{\"price\": 4500000, \"description\": \"Notebook con Ryzen 7, 16GB de RAM y 512GB SSD.\"}"
            }]
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ai_payload))
            .expect(1)
            .mount(&ai_server)
            .await;

        std::env::set_var("CASCADE_TEST_TOKEN_2", "test-token");
        let ai = AiClient::from_config(&AiConfig {
            provider: AiProvider::Anthropic,
            endpoint: ai_server.uri(),
            token_env: "CASCADE_TEST_TOKEN_2".to_string(),
            ..AiConfig::default()
        })
        .expect("ai client");

        let mut config = AppConfig::default();
        config.site.base_url = site.uri();
        let http = HttpClient::new(HttpClientConfig {
            max_requests_per_second: 100,
            ..HttpClientConfig::default()
        })
        .unwrap();

        let ctx = CascadeContext {
            http: &http,
            browser: None,
            ai: Some(&ai),
            config: &config,
            max_images: 8,
        };
        let candidate = CandidateProduct {
            name: "Notebook Lenovo".to_string(),
            url: format!("{}/py/novedad.html", site.uri()),
            search_query: "notebook".to_string(),
        };

        let product = extract_product(&ctx, &candidate).await;
        assert_eq!(product.extraction_method, ExtractionMethod::Ai);
        assert_eq!(product.price, Some(Decimal::from_str("4500000").unwrap()));
        assert!(product.description.unwrap().contains("Ryzen 7"));
    }
}
