//! Locale-aware price parsing and text cleanup.
//!
//! Nissei prices are Guarani-formatted: dot as thousands separator, comma as
//! decimal separator, usually prefixed with "Gs.". Descriptions scraped from
//! detail pages carry share-button and navigation boilerplate that must be
//! stripped before persistence. Pure functions, no I/O.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use url::Url;

/// Marker appended when a description is cut at the length bound.
const TRUNCATION_MARKER: &str = "... [truncated]";

/// Parse a Guarani-formatted price out of free-form text.
///
/// Heuristic: keep only digits, dots and commas. Dots alone are thousands
/// separators unless a single dot delimits a trailing group of at most two
/// digits (a canonical decimal rendering). When both separators appear, a
/// trailing comma-group of at most two digits is the decimal part and dots
/// are thousands separators; otherwise both are stripped. Returns `None` on
/// empty or unparseable input, never an error.
pub fn parse_price(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let has_dot = cleaned.contains('.');
    let has_comma = cleaned.contains(',');

    let normalized = if has_dot && has_comma {
        let parts: Vec<&str> = cleaned.split(',').collect();
        if parts.len() == 2 && parts[1].len() <= 2 {
            format!("{}.{}", parts[0].replace('.', ""), parts[1])
        } else {
            cleaned.replace(['.', ','], "")
        }
    } else if has_comma {
        let parts: Vec<&str> = cleaned.split(',').collect();
        if parts.len() == 2 && parts[1].len() <= 2 {
            format!("{}.{}", parts[0], parts[1])
        } else {
            cleaned.replace(',', "")
        }
    } else if has_dot {
        let parts: Vec<&str> = cleaned.split('.').collect();
        if parts.len() == 2 && !parts[1].is_empty() && parts[1].len() <= 2 {
            // A lone dot with a 1-2 digit tail cannot be a thousands
            // separator; keep it as the decimal point so re-parsing a
            // canonical rendering round-trips.
            cleaned.clone()
        } else {
            cleaned.replace('.', "")
        }
    } else {
        cleaned.clone()
    };

    Decimal::from_str(&normalized).ok()
}

static BOILERPLATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)compartir en.{0,40}facebook.{0,40}twitter(.{0,40}whatsapp)?",
        r"(?is)compartilhar.{0,40}facebook.{0,40}twitter.{0,40}whatsapp",
        r"(?i)a[ñn]adir a favoritos",
        r"(?is)adicionar [aà] lista.{0,40}favoritos",
        r"(?is)comprar a(hora|gora).{0,40}(añadir|adicionar) a[ol] carr(ito|inho)",
        r"(?i)enviar (a|para) um? amigo",
        r"(?i)imprimir esta p[aá]gina",
        r"(?is)m[aá]s informaci[oó]n.{0,20}detalles.{0,20}especificaciones",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("boilerplate pattern"))
    .collect()
});

static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n[\s]*").expect("blank line pattern"));

/// Strip navigation/share boilerplate, collapse blank lines and truncate to
/// `max_len` characters (with a marker when cut).
pub fn clean_text(text: &str, max_len: usize) -> String {
    let mut cleaned = text.to_string();
    for pattern in BOILERPLATE_PATTERNS.iter() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    let collapsed = BLANK_LINES.replace_all(&cleaned, "\n").trim().to_string();
    if collapsed.chars().count() > max_len {
        let cut: String = collapsed.chars().take(max_len).collect();
        format!("{}{}", cut.trim_end(), TRUNCATION_MARKER)
    } else {
        collapsed
    }
}

static CACHE_SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/cache/[a-f0-9]{32}/").expect("cache segment pattern"));

/// Rewrite a Magento image-cache URL to the original full-resolution asset.
///
/// `.../catalog/product/cache/<32 hex>/2/e/2e3f.jpg` becomes
/// `.../catalog/product/2/e/2e3f.jpg`. URLs without a cache segment pass
/// through unchanged.
pub fn canonicalize_image_url(url: &str) -> String {
    CACHE_SEGMENT.replace(url, "/").into_owned()
}

/// Resolve an href against the site base to an absolute URL.
///
/// Handles protocol-relative (`//host/...`) and root-relative (`/...`)
/// forms; rejects empty hrefs and `data:` URIs.
pub fn resolve_url(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") {
        return None;
    }
    if href.starts_with("//") {
        return Some(format!("https:{href}"));
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if let Some(rest) = href.strip_prefix('/') {
        return Some(format!("{}/{}", base_url.trim_end_matches('/'), rest));
    }
    Url::parse(base_url)
        .ok()?
        .join(href)
        .ok()
        .map(|joined| joined.to_string())
}

/// Filesystem/URL-safe slug for image filenames, bounded to `max_len` bytes.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.len() >= max_len {
            break;
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Gs. 1.500.000", "1500000")]
    #[case("1.500.000,50", "1500000.50")]
    #[case("₲ 2.350.000", "2350000")]
    #[case("123,45", "123.45")]
    #[case("1.234", "1234")]
    #[case("999", "999")]
    #[case("Gs 15.990.000 IVA incluido", "15990000")]
    fn parses_guarani_prices(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(parse_price(input), Some(Decimal::from_str(expected).unwrap()));
    }

    #[rstest]
    #[case("")]
    #[case("sin precio")]
    #[case("Gs. ")]
    fn rejects_priceless_text(#[case] input: &str) {
        assert_eq!(parse_price(input), None);
    }

    #[rstest]
    #[case("Gs. 1.500.000")]
    #[case("1.500.000,50")]
    #[case("123,45")]
    #[case("987")]
    fn parse_price_is_idempotent_on_canonical_form(#[case] input: &str) {
        let first = parse_price(input).unwrap();
        let reparsed = parse_price(&first.to_string()).unwrap();
        assert_eq!(first, reparsed);
    }

    #[test]
    fn clean_text_strips_boilerplate_and_collapses_blank_lines() {
        let raw = "Pantalla OLED de 6.9 pulgadas.\n\n\nAñadir a favoritos\nChip A18 Pro.";
        let cleaned = clean_text(raw, 2000);
        assert!(cleaned.contains("Pantalla OLED"));
        assert!(cleaned.contains("Chip A18 Pro."));
        assert!(!cleaned.contains("favoritos"));
        assert!(!cleaned.contains("\n\n\n"));
    }

    #[test]
    fn clean_text_truncates_with_marker() {
        let raw = "x".repeat(300);
        let cleaned = clean_text(&raw, 100);
        assert!(cleaned.starts_with("xxx"));
        assert!(cleaned.ends_with(TRUNCATION_MARKER));
        assert!(cleaned.chars().count() < 300);
    }

    #[test]
    fn canonicalizes_magento_cache_urls() {
        let cached =
            "https://nissei.com/media/catalog/product/cache/0a1b2c3d4e5f60718293a4b5c6d7e8f9/2/e/2e3f4a35.jpg";
        assert_eq!(
            canonicalize_image_url(cached),
            "https://nissei.com/media/catalog/product/2/e/2e3f4a35.jpg"
        );
        let plain = "https://nissei.com/media/catalog/product/2/e/2e3f4a35.jpg";
        assert_eq!(canonicalize_image_url(plain), plain);
    }

    #[test]
    fn resolves_relative_hrefs() {
        let base = "https://nissei.com";
        assert_eq!(
            resolve_url(base, "/py/iphone.html").as_deref(),
            Some("https://nissei.com/py/iphone.html")
        );
        assert_eq!(
            resolve_url(base, "//cdn.nissei.com/a.jpg").as_deref(),
            Some("https://cdn.nissei.com/a.jpg")
        );
        assert_eq!(
            resolve_url(base, "https://other.com/x").as_deref(),
            Some("https://other.com/x")
        );
        assert_eq!(resolve_url(base, "data:image/png;base64,AAAA"), None);
        assert_eq!(resolve_url(base, ""), None);
    }

    #[test]
    fn slugify_bounds_and_sanitizes() {
        assert_eq!(slugify("iPhone 16 Pro Max (256GB)", 30), "iphone-16-pro-max-256gb");
        assert_eq!(slugify("Ñandutí  ***  español", 30), "andut-espa-ol");
    }
}
