//! Chromium driver using chromiumoxide.
//!
//! One [`ChromiumDriver`] owns one browser process and one page. The
//! [`ChromiumFactory`] launches a fresh one per session attempt.

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;

use lead_harvest::{
    Driver, DriverError, DriverFactory, DriverResult, HarvestConfig, Scope, ScrollOutcome,
    WaitState,
};

use super::{find_chromium, js_string, BrowserOptions, LaunchError};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Attached and laid out with a non-empty box.
const RENDERED_FN: &str = r#"function() {
    if (!this.isConnected) return false;
    const r = this.getBoundingClientRect();
    return r.width > 0 && r.height > 0;
}"#;

/// Launches one Chromium session per call to [`DriverFactory::open`].
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    options: BrowserOptions,
    end_of_list: Option<String>,
}

impl ChromiumFactory {
    pub fn new(options: BrowserOptions, end_of_list: Option<String>) -> Self {
        Self {
            options,
            end_of_list,
        }
    }

    pub fn from_config(options: BrowserOptions, config: &HarvestConfig) -> Self {
        Self::new(options, config.site.end_of_list.clone())
    }
}

#[async_trait]
impl DriverFactory for ChromiumFactory {
    type Driver = ChromiumDriver;

    async fn open(&self) -> DriverResult<ChromiumDriver> {
        ChromiumDriver::launch(&self.options, self.end_of_list.clone())
            .await
            .map_err(|e| DriverError::Browser(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ScrollProbe {
    saturated: bool,
    marker: bool,
}

/// A live Chromium page driving one result feed.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    end_of_list: Option<String>,
    navigation_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch a browser and open a blank page.
    pub async fn launch(
        options: &BrowserOptions,
        end_of_list: Option<String>,
    ) -> Result<Self, LaunchError> {
        let chrome_path = match &options.executable {
            Some(path) => path.clone(),
            None => find_chromium().ok_or(LaunchError::ChromiumNotFound)?,
        };

        let (width, height) = options.window;
        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(width, height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--lang=en-US");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder.build().map_err(LaunchError::Config)?;

        let (browser, mut handler) = Browser::launch(config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("cdp handler: {e}");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;
        tracing::debug!("chromium session opened");

        Ok(Self {
            browser,
            page,
            handler,
            end_of_list,
            navigation_timeout: Duration::from_millis(options.navigation_timeout_ms),
        })
    }

    async fn eval_bool(&self, expression: &str) -> bool {
        match self.page.evaluate(expression).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(e) => {
                tracing::trace!("probe failed: {e}");
                false
            }
        }
    }

    async fn locate<'a>(
        &self,
        scope: Scope<'a, Element>,
        selector: Option<&str>,
    ) -> DriverResult<Located<'a>> {
        let found = match (scope, selector) {
            (Scope::Within(item), None) => return Ok(Located::Scope(item)),
            (Scope::Within(item), Some(sel)) => item.find_element(sel).await,
            (Scope::Page, Some(sel)) => self.page.find_element(sel).await,
            (Scope::Page, None) => self.page.find_element("body").await,
        };
        found
            .map(Located::Found)
            .map_err(not_found(selector.unwrap_or("body")))
    }
}

/// Element resolved for a read: the scope item itself or a descendant.
enum Located<'a> {
    Scope(&'a Element),
    Found(Element),
}

impl Located<'_> {
    fn element(&self) -> &Element {
        match self {
            Self::Scope(el) => el,
            Self::Found(el) => el,
        }
    }
}

fn browser_err(e: CdpError) -> DriverError {
    DriverError::Browser(e.to_string())
}

fn not_found(selector: &str) -> impl Fn(CdpError) -> DriverError + '_ {
    move |e| DriverError::NotFound(format!("{selector}: {e}"))
}

async fn bounded<T, F>(what: &str, timeout: Duration, fut: F) -> DriverResult<T>
where
    F: Future<Output = DriverResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout {
            what: what.to_string(),
            ms: timeout.as_millis() as u64,
        }),
    }
}

async fn poll_until<F, Fut>(what: &str, timeout: Duration, mut probe: F) -> DriverResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if probe().await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(DriverError::Timeout {
                what: what.to_string(),
                ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn element_is_rendered(item: &Element) -> bool {
    match item.call_js_fn(RENDERED_FN, false).await {
        Ok(ret) => ret.result.value.and_then(|v| v.as_bool()).unwrap_or(false),
        Err(_) => false,
    }
}

fn presence_script(selector: &str, state: WaitState) -> String {
    let sel = js_string(selector);
    match state {
        WaitState::Attached => format!("document.querySelector('{sel}') !== null"),
        WaitState::Visible => format!(
            r#"(() => {{
                const el = document.querySelector('{sel}');
                if (!el) return false;
                const r = el.getBoundingClientRect();
                return r.width > 0 && r.height > 0;
            }})()"#
        ),
    }
}

fn scroll_script(container: &str, amount: i64, end_of_list: Option<&str>) -> String {
    let marker = match end_of_list {
        Some(sel) => format!("document.querySelector('{}') !== null", js_string(sel)),
        None => "false".to_string(),
    };
    format!(
        r#"(() => {{
            const feed = document.querySelector('{}');
            if (!feed) return null;
            feed.scrollBy(0, {amount});
            const saturated = feed.scrollTop + feed.clientHeight >= feed.scrollHeight - 4;
            return {{ saturated, marker: {marker} }};
        }})()"#,
        js_string(container)
    )
}

#[async_trait]
impl Driver for ChromiumDriver {
    type Item = Element;

    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        bounded(url, self.navigation_timeout, async {
            self.page.goto(url).await.map_err(browser_err)?;
            self.page.wait_for_navigation().await.map_err(browser_err)?;
            Ok(())
        })
        .await
    }

    async fn fill_and_submit(&self, selector: &str, text: &str) -> DriverResult<()> {
        let input = self
            .page
            .find_element(selector)
            .await
            .map_err(not_found(selector))?;
        input.click().await.map_err(browser_err)?;
        input.type_str(text).await.map_err(browser_err)?;
        input.press_key("Enter").await.map_err(browser_err)?;
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> DriverResult<()> {
        let script = presence_script(selector, state);
        let script = script.as_str();
        poll_until(selector, timeout, move || self.eval_bool(script)).await
    }

    async fn list_items(&self, selector: &str) -> DriverResult<Vec<Element>> {
        self.page.find_elements(selector).await.map_err(browser_err)
    }

    async fn wait_stable(&self, item: &Element, timeout: Duration) -> DriverResult<()> {
        poll_until("item render", timeout, move || element_is_rendered(item)).await
    }

    async fn read_text(
        &self,
        scope: Scope<'_, Element>,
        selector: Option<&str>,
        timeout: Duration,
    ) -> DriverResult<String> {
        let what = selector.unwrap_or("scope text");
        bounded(what, timeout, async {
            let located = self.locate(scope, selector).await?;
            located
                .element()
                .inner_text()
                .await
                .map_err(browser_err)?
                .ok_or_else(|| DriverError::NotFound(format!("{what}: no text")))
        })
        .await
    }

    async fn read_attribute(
        &self,
        scope: Scope<'_, Element>,
        selector: Option<&str>,
        name: &str,
        timeout: Duration,
    ) -> DriverResult<String> {
        let what = selector.unwrap_or(name);
        bounded(what, timeout, async {
            let located = self.locate(scope, selector).await?;
            located
                .element()
                .attribute(name)
                .await
                .map_err(browser_err)?
                .ok_or_else(|| DriverError::NotFound(format!("{what}: no {name} attribute")))
        })
        .await
    }

    async fn read_all_text(
        &self,
        scope: Scope<'_, Element>,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Vec<String>> {
        bounded(selector, timeout, async {
            let elements = match scope {
                Scope::Within(item) => item.find_elements(selector).await,
                Scope::Page => self.page.find_elements(selector).await,
            }
            .map_err(browser_err)?;
            let mut texts = Vec::with_capacity(elements.len());
            for el in &elements {
                if let Some(text) = el.inner_text().await.map_err(browser_err)? {
                    texts.push(text);
                }
            }
            Ok(texts)
        })
        .await
    }

    async fn scroll(&self, selector: &str, amount: i64) -> DriverResult<ScrollOutcome> {
        let script = scroll_script(selector, amount, self.end_of_list.as_deref());
        let probe: Option<ScrollProbe> = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| DriverError::Script(format!("unexpected scroll result: {e:?}")))?;
        match probe {
            Some(p) => Ok(ScrollOutcome {
                at_end: p.saturated || p.marker,
            }),
            None => Err(DriverError::NotFound(selector.to_string())),
        }
    }

    async fn click(&self, item: &Element) -> DriverResult<()> {
        item.scroll_into_view().await.map_err(browser_err)?;
        item.click().await.map_err(browser_err)?;
        Ok(())
    }

    async fn click_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()> {
        bounded(selector, timeout, async {
            let el = self
                .page
                .find_element(selector)
                .await
                .map_err(not_found(selector))?;
            el.click().await.map_err(browser_err)?;
            Ok(())
        })
        .await
    }

    async fn sleep(&self, ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DriverError::Browser(e.to_string()))?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("page close failed: {e}");
        }
        let closed = self.browser.close().await.map(|_| ()).map_err(browser_err);
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("waiting for chromium exit failed: {e}");
        }
        self.handler.abort();
        tracing::debug!("chromium session closed");
        closed
    }
}
