//! Headless browser driver for the rendered tier.
//!
//! A `BrowserSession` is an explicit resource: acquired at batch start,
//! passed to the rendering and carousel code, and released in guaranteed
//! cleanup at the end of the batch. Rendering failures are tier failures,
//! not fatal errors.
//!
//! The target site's markup varies across product templates and overlays
//! (cookie banners, modals) intercept clicks, so clicking goes through a
//! layered fallback: native click, scroll-into-view + click, JS-dispatched
//! click, synthetic pointer events.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromeLaunchConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::infrastructure::config::BrowserConfig;

/// Close-button sweep targets for cookie banners and modals that intercept
/// carousel and tab clicks.
const OVERLAY_CLOSE_SELECTORS: &[&str] = &[
    "button[id*='cookie'] .close",
    ".cookie-banner .close",
    ".cookie-notice button",
    "[aria-label*='close cookie']",
    ".modal .close",
    ".popup .close",
    ".overlay .close",
    "button[aria-label='Close']",
    "button[data-dismiss='modal']",
    ".close-button",
    ".btn-close",
];

/// Tab labels carrying the structured product sections, checked before
/// generic tab selectors.
const TAB_TEXT_LABELS: &[&str] = &["detalles", "más información", "mas información", "descripción"];

const TAB_SELECTORS: &[&str] = &[".tab[data-toggle]", "[role='tab']", ".nav-link[data-toggle]"];

/// Signals that the product content finished rendering: a product-like
/// image, a price-like element, or a title.
const CONTENT_READY_JS: &str = r#"(() => !!(
    document.querySelector('img[src*="catalog"], img[src*="product"], img[src*="media"]')
    || document.querySelector('.price, [class*="price"]')
    || document.querySelector('h1')
))()"#;

pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch a headless Chrome session for one batch run.
    pub async fn launch(config: &BrowserConfig, user_agent: &str) -> Result<Self, ScrapeError> {
        let mut builder = ChromeLaunchConfig::builder()
            .window_size(1920, 1080)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--exclude-switches=enable-automation")
            .arg("--disable-infobars")
            .arg(format!("--user-agent={user_agent}"));
        if !config.headless {
            builder = builder.with_head();
        }
        let launch_config = builder.build().map_err(ScrapeError::Render)?;

        let (browser, mut handler) = Browser::launch(launch_config)
            .await
            .map_err(|e| ScrapeError::render(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(error) = event {
                    let text = format!("{error:?}");
                    // CDP sends events this client version cannot decode;
                    // they are not failures.
                    if !text.contains("data did not match any variant") {
                        debug!(error = %text, "browser handler event error");
                    }
                }
            }
        });

        info!("browser session launched");
        Ok(Self {
            browser,
            handler_task,
            config: config.clone(),
        })
    }

    /// Navigate to a URL and wait until the page looks ready: body present,
    /// then one of several content signals, then a settle delay for the
    /// gallery JS to initialize.
    pub async fn render(&self, url: &str) -> Result<RenderedPage, ScrapeError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::render(format!("failed to open page: {e}")))?;

        let load_timeout = Duration::from_secs(self.config.page_load_timeout_seconds);
        match tokio::time::timeout(load_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                let _ = page.close().await;
                return Err(ScrapeError::render(format!("navigation to {url} failed: {e}")));
            }
            Err(_) => {
                debug!(url, "page load timed out; proceeding with partial content");
            }
        }

        let rendered = RenderedPage {
            page,
            config: self.config.clone(),
        };

        if let Err(e) = rendered.wait_for_body(load_timeout).await {
            rendered.close().await;
            return Err(e);
        }
        rendered
            .wait_for_content_signal(Duration::from_secs(self.config.content_wait_seconds))
            .await;
        tokio::time::sleep(Duration::from_millis(self.config.settle_delay_ms)).await;

        Ok(rendered)
    }

    /// Tear the session down, releasing the OS browser process.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "browser close reported an error");
        }
        let _ = self.handler_task.await;
        info!("browser session closed");
    }
}

pub struct RenderedPage {
    page: Page,
    config: BrowserConfig,
}

impl RenderedPage {
    /// Serialized HTML snapshot of the live DOM.
    pub async fn html(&self) -> Result<String, ScrapeError> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::render(format!("failed to capture HTML snapshot: {e}")))
    }

    /// Evaluate a script that returns a JSON-serializable value.
    pub async fn evaluate_value(&self, script: &str) -> Result<Value, ScrapeError> {
        let result = self
            .page
            .evaluate(script.to_string())
            .await
            .map_err(|e| ScrapeError::render(format!("script evaluation failed: {e}")))?;
        result
            .into_value::<Value>()
            .map_err(|e| ScrapeError::render(format!("script result was not JSON: {e}")))
    }

    async fn eval_bool(&self, script: &str) -> bool {
        match self.evaluate_value(script).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn wait_for_body(&self, timeout: Duration) -> Result<(), ScrapeError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element("body").await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ScrapeError::render("body element never appeared"));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Wait for any content-ready signal, falling through after the grace
    /// period without error.
    async fn wait_for_content_signal(&self, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval_bool(CONTENT_READY_JS).await {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                debug!("no content signal before deadline, proceeding anyway");
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Click the first element matching `selector`, escalating through the
    /// fallback ladder. Returns whether any strategy succeeded.
    pub async fn click_with_fallbacks(&self, selector: &str) -> bool {
        if let Ok(element) = self.page.find_element(selector).await {
            if element.click().await.is_ok() {
                return true;
            }
            // The click may have been intercepted; bring the element into
            // view and retry before falling back to JS.
            if element.scroll_into_view().await.is_ok() && element.click().await.is_ok() {
                return true;
            }
        }

        let quoted = js_string(selector);
        let dispatch_click = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el) return false; el.click(); return true; }})()"
        );
        if self.eval_bool(&dispatch_click).await {
            return true;
        }

        let synthetic = format!(
            r#"(() => {{
    const el = document.querySelector({quoted});
    if (!el) return false;
    const rect = el.getBoundingClientRect();
    const opts = {{
        bubbles: true,
        cancelable: true,
        clientX: rect.left + rect.width / 2,
        clientY: rect.top + rect.height / 2
    }};
    for (const type of ['pointerdown', 'mousedown', 'pointerup', 'mouseup', 'click']) {{
        const event = type.startsWith('pointer')
            ? new PointerEvent(type, opts)
            : new MouseEvent(type, opts);
        el.dispatchEvent(event);
    }}
    return true;
}})()"#
        );
        self.eval_bool(&synthetic).await
    }

    /// Close cookie banners and modals that intercept clicks, then send
    /// Escape for anything that survived the sweep.
    pub async fn dismiss_overlays(&self) {
        let selectors = match serde_json::to_string(OVERLAY_CLOSE_SELECTORS) {
            Ok(json) => json,
            Err(_) => return,
        };
        let sweep = format!(
            r#"(() => {{
    const selectors = {selectors};
    let closed = 0;
    for (const sel of selectors) {{
        let matches;
        try {{ matches = Array.from(document.querySelectorAll(sel)); }} catch (_) {{ continue; }}
        for (const el of matches.slice(0, 2)) {{
            const rect = el.getBoundingClientRect();
            if (rect.width > 0 && rect.height > 0) {{ el.click(); closed += 1; }}
        }}
    }}
    return closed;
}})()"#
        );
        let closed = self
            .evaluate_value(&sweep)
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if closed > 0 {
            debug!(closed, "dismissed overlays");
            let escape = "(() => { document.body.dispatchEvent(\
                new KeyboardEvent('keydown', { key: 'Escape', bubbles: true })); return true; })()";
            let _ = self.eval_bool(escape).await;
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }

    /// Activate non-default content tabs (details / extended information)
    /// so their sections land in the DOM snapshot.
    pub async fn activate_detail_tabs(&self) {
        self.dismiss_overlays().await;

        let max_clicks = self.config.max_tab_clicks as u64;
        let labels = match serde_json::to_string(TAB_TEXT_LABELS) {
            Ok(json) => json,
            Err(_) => return,
        };
        let by_text = format!(
            r#"(() => {{
    const labels = {labels};
    const nodes = Array.from(document.querySelectorAll('a, button, [role="tab"]'));
    let clicked = 0;
    for (const label of labels) {{
        if (clicked >= {max_clicks}) break;
        const el = nodes.find(n => (n.textContent || '').trim().toLowerCase().includes(label));
        if (el) {{ el.click(); clicked += 1; }}
    }}
    return clicked;
}})()"#
        );
        let mut clicked = self
            .evaluate_value(&by_text)
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        for selector in TAB_SELECTORS {
            if clicked >= max_clicks {
                break;
            }
            if self.click_with_fallbacks(selector).await {
                clicked += 1;
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }

        if clicked > 0 {
            debug!(clicked, "activated detail tabs");
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }
    }

    pub async fn close(self) {
        let _ = self.page.close().await;
    }
}

/// Quote a string as a JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
