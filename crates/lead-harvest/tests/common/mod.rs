//! Scripted in-memory driver shared by the integration tests.
//!
//! The feed holds a fixed catalog of items; `visible` grows by `per_scroll`
//! on every downward scroll. Selectors are plain keys ("name", "link", ...)
//! matched by the driver instead of CSS.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use lead_harvest::config::{
    DetailPanel, ExtractionSettings, FieldDescriptor, FieldSelectors, HarvestConfig,
    PacingSettings, SiteSelectors, StagnationSettings,
};
use lead_harvest::{
    Driver, DriverError, DriverFactory, DriverResult, HarvestResult, Record, RecordSink, Scope,
    ScrollOutcome, WaitState,
};

/// One rendered result card.
#[derive(Debug, Clone, Default)]
pub struct FakeItem {
    pub id: usize,
    pub name: Option<String>,
    /// Name reads that fail before the name renders.
    pub name_after: u32,
    pub url: Option<String>,
    pub blocks: Vec<String>,
    pub blocks_fail: bool,
    pub rating: Option<String>,
    pub reviews: Option<String>,
    pub phone: Option<String>,
    pub unstable: bool,
    /// Panel shown after clicking the card.
    pub detail: Option<FakeDetail>,
    pub click_fails: bool,
}

/// Detail panel contents, with the labels the page renders.
#[derive(Debug, Clone, Default)]
pub struct FakeDetail {
    pub category: String,
    pub address_label: String,
    pub phone_label: String,
}

impl FakeItem {
    pub fn place(id: usize, name: &str) -> Self {
        Self {
            id,
            name: Some(name.to_string()),
            url: Some(format!("https://maps.test/place/{id}")),
            blocks: vec![
                "Cafe".to_string(),
                "·".to_string(),
                format!("{id} Main St, Springfield"),
            ],
            rating: Some("4.5 stars".to_string()),
            reviews: Some("(1,234)".to_string()),
            ..Default::default()
        }
    }

    pub fn without_url(mut self) -> Self {
        self.url = None;
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn nameless(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn name_after(mut self, failed_reads: u32) -> Self {
        self.name_after = failed_reads;
        self
    }

    pub fn unstable(mut self) -> Self {
        self.unstable = true;
        self
    }

    pub fn with_detail(mut self, category: &str, address_label: &str, phone_label: &str) -> Self {
        self.detail = Some(FakeDetail {
            category: category.to_string(),
            address_label: address_label.to_string(),
            phone_label: phone_label.to_string(),
        });
        self
    }

    pub fn click_fails(mut self) -> Self {
        self.click_fails = true;
        self
    }
}

/// `count` distinct places named "place-<i>".
pub fn catalog(count: usize) -> Vec<FakeItem> {
    (0..count)
        .map(|i| FakeItem::place(i, &format!("place-{i}")))
        .collect()
}

/// How the scripted feed behaves during one session.
#[derive(Clone, Default)]
pub struct FeedPlan {
    pub catalog: Vec<FakeItem>,
    pub initial: usize,
    pub per_scroll: usize,
    /// Report `at_end` once every item is visible.
    pub end_marker: bool,
    pub feed_missing: bool,
    pub consent_modal: bool,
    /// `close` never returns.
    pub hang_on_close: bool,
    /// The detail panel never shows its ready marker.
    pub panel_unconfirmed: bool,
    /// Every list call after this many successful ones fails.
    pub fail_lists_after: Option<usize>,
    /// Individual list calls (1-based) that fail.
    pub flaky_lists: Vec<usize>,
    /// Notify this handle during the given list call (1-based).
    pub interrupt_at_list: Option<(usize, Arc<Notify>)>,
}

impl FeedPlan {
    pub fn new(catalog: Vec<FakeItem>, initial: usize, per_scroll: usize) -> Self {
        Self {
            catalog,
            initial,
            per_scroll,
            ..Default::default()
        }
    }
}

/// Counters shared by every driver a factory opens.
#[derive(Debug, Default)]
pub struct Shared {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub screenshots: Mutex<Vec<PathBuf>>,
}

#[derive(Debug, Default)]
struct Inner {
    visible: usize,
    list_calls: usize,
    scrolls: Vec<i64>,
    name_reads: HashMap<usize, u32>,
    sleeps: Vec<u64>,
    navigations: Vec<String>,
    submitted: Vec<String>,
    clicked: Vec<String>,
    waits: Vec<String>,
    /// Item whose detail panel is open.
    opened: Option<usize>,
}

pub struct ScriptedDriver {
    plan: FeedPlan,
    inner: Mutex<Inner>,
    shared: Arc<Shared>,
}

impl ScriptedDriver {
    pub fn new(plan: FeedPlan) -> Self {
        Self::with_shared(plan, Arc::new(Shared::default()))
    }

    fn with_shared(plan: FeedPlan, shared: Arc<Shared>) -> Self {
        let inner = Inner {
            visible: plan.initial.min(plan.catalog.len()),
            ..Default::default()
        };
        Self {
            plan,
            inner: Mutex::new(inner),
            shared,
        }
    }

    pub fn name_reads(&self, id: usize) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .name_reads
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    pub fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }

    pub fn sleeps(&self) -> Vec<u64> {
        self.inner.lock().unwrap().sleeps.clone()
    }

    pub fn scrolls(&self) -> Vec<i64> {
        self.inner.lock().unwrap().scrolls.clone()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.inner.lock().unwrap().submitted.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.inner.lock().unwrap().clicked.clone()
    }

    pub fn waited(&self) -> Vec<String> {
        self.inner.lock().unwrap().waits.clone()
    }

    fn opened_detail(&self) -> DriverResult<(FakeItem, FakeDetail)> {
        let opened = self.inner.lock().unwrap().opened;
        let item = opened
            .and_then(|id| self.plan.catalog.iter().find(|item| item.id == id))
            .ok_or_else(|| Self::not_found("detail panel"))?;
        let detail = item
            .detail
            .clone()
            .ok_or_else(|| Self::not_found("detail panel"))?;
        Ok((item.clone(), detail))
    }

    fn not_found(what: &str) -> DriverError {
        DriverError::NotFound(what.to_string())
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Item = FakeItem;

    async fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.inner.lock().unwrap().navigations.push(url.to_string());
        Ok(())
    }

    async fn fill_and_submit(&self, _selector: &str, text: &str) -> DriverResult<()> {
        self.inner.lock().unwrap().submitted.push(text.to_string());
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &str,
        _state: WaitState,
        timeout: Duration,
    ) -> DriverResult<()> {
        self.inner.lock().unwrap().waits.push(selector.to_string());
        let present = match selector {
            "feed" => !self.plan.feed_missing,
            "consent" => self.plan.consent_modal,
            "panel" => !self.plan.panel_unconfirmed,
            _ => true,
        };
        if present {
            Ok(())
        } else {
            Err(DriverError::Timeout {
                what: selector.to_string(),
                ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn list_items(&self, _selector: &str) -> DriverResult<Vec<FakeItem>> {
        let mut inner = self.inner.lock().unwrap();
        inner.list_calls += 1;
        let call = inner.list_calls;
        if let Some((at, notify)) = &self.plan.interrupt_at_list {
            if *at == call {
                notify.notify_one();
            }
        }
        let failing = self.plan.fail_lists_after.is_some_and(|n| call > n)
            || self.plan.flaky_lists.contains(&call);
        if failing {
            return Err(DriverError::Browser("target closed".to_string()));
        }
        Ok(self.plan.catalog[..inner.visible].to_vec())
    }

    async fn wait_stable(&self, item: &FakeItem, timeout: Duration) -> DriverResult<()> {
        if item.unstable {
            return Err(DriverError::Timeout {
                what: format!("item {}", item.id),
                ms: timeout.as_millis() as u64,
            });
        }
        Ok(())
    }

    async fn read_text(
        &self,
        scope: Scope<'_, FakeItem>,
        selector: Option<&str>,
        _timeout: Duration,
    ) -> DriverResult<String> {
        let selector = selector.unwrap_or_default();
        let Scope::Within(item) = scope else {
            let (item, detail) = self.opened_detail()?;
            return match selector {
                "title" => item.name.clone().ok_or_else(|| Self::not_found("title")),
                "category" => Ok(detail.category),
                other => Err(Self::not_found(other)),
            };
        };
        match selector {
            "name" => {
                let mut inner = self.inner.lock().unwrap();
                let reads = inner.name_reads.entry(item.id).or_insert(0);
                *reads += 1;
                if *reads <= item.name_after {
                    return Err(Self::not_found("name"));
                }
                item.name.clone().ok_or_else(|| Self::not_found("name"))
            }
            "rating" => item.rating.clone().ok_or_else(|| Self::not_found(selector)),
            "reviews" => item.reviews.clone().ok_or_else(|| Self::not_found(selector)),
            "phone" => item.phone.clone().ok_or_else(|| Self::not_found(selector)),
            other => Err(Self::not_found(other)),
        }
    }

    async fn read_attribute(
        &self,
        scope: Scope<'_, FakeItem>,
        selector: Option<&str>,
        name: &str,
        _timeout: Duration,
    ) -> DriverResult<String> {
        match (scope, selector, name) {
            (Scope::Within(item), Some("link"), "href") => {
                item.url.clone().ok_or_else(|| Self::not_found("link"))
            }
            (Scope::Page, Some("address-button"), "aria-label") => {
                Ok(self.opened_detail()?.1.address_label)
            }
            (Scope::Page, Some("phone-button"), "aria-label") => {
                Ok(self.opened_detail()?.1.phone_label)
            }
            _ => Err(Self::not_found(name)),
        }
    }

    async fn read_all_text(
        &self,
        scope: Scope<'_, FakeItem>,
        selector: &str,
        _timeout: Duration,
    ) -> DriverResult<Vec<String>> {
        match (scope, selector) {
            (Scope::Within(item), "blocks") if item.blocks_fail => {
                Err(DriverError::Script("detached node".to_string()))
            }
            (Scope::Within(item), "blocks") => Ok(item.blocks.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn scroll(&self, _selector: &str, amount: i64) -> DriverResult<ScrollOutcome> {
        let mut inner = self.inner.lock().unwrap();
        inner.scrolls.push(amount);
        let total = self.plan.catalog.len();
        if amount > 0 {
            inner.visible = (inner.visible + self.plan.per_scroll).min(total);
        }
        Ok(ScrollOutcome {
            at_end: self.plan.end_marker && inner.visible == total,
        })
    }

    async fn click(&self, item: &FakeItem) -> DriverResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.clicked.push(format!("item-{}", item.id));
        if item.click_fails {
            return Err(DriverError::Browser("element is not clickable".to_string()));
        }
        inner.opened = Some(item.id);
        Ok(())
    }

    async fn click_selector(&self, selector: &str, _timeout: Duration) -> DriverResult<()> {
        self.inner.lock().unwrap().clicked.push(selector.to_string());
        Ok(())
    }

    async fn sleep(&self, ms: u64) {
        self.inner.lock().unwrap().sleeps.push(ms);
        tokio::task::yield_now().await;
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.shared
            .screenshots
            .lock()
            .unwrap()
            .push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if self.plan.hang_on_close {
            std::future::pending::<()>().await;
        }
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens one scripted driver per attempt; attempt `n` uses `plans[n]`
/// (or the last plan once they run out).
pub struct ScriptedFactory {
    plans: Vec<FeedPlan>,
    pub shared: Arc<Shared>,
}

impl ScriptedFactory {
    pub fn new(plans: Vec<FeedPlan>) -> Self {
        assert!(!plans.is_empty());
        Self {
            plans,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn opens(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    async fn open(&self) -> DriverResult<ScriptedDriver> {
        let n = self.shared.opens.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans[n.min(self.plans.len() - 1)].clone();
        Ok(ScriptedDriver::with_shared(plan, Arc::clone(&self.shared)))
    }
}

/// Sink keeping every persisted sequence in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    history: Arc<Mutex<Vec<Vec<Record>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Vec<Record>> {
        self.history.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Vec<Record>> {
        self.history.lock().unwrap().last().cloned()
    }
}

impl RecordSink for MemorySink {
    fn persist(&self, records: &[Record]) -> HarvestResult<()> {
        self.history.lock().unwrap().push(records.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Card config switched to reading page-scoped fields from the detail panel.
pub fn detail_test_config() -> HarvestConfig {
    let mut config = test_config();
    config.fields = FieldSelectors {
        name: FieldDescriptor::text("title").in_page(),
        url: FieldDescriptor::attribute(Some("link"), "href"),
        rating: FieldDescriptor::text("rating"),
        reviews: FieldDescriptor::text("reviews"),
        phone: FieldDescriptor::attribute(Some("phone-button"), "aria-label")
            .in_page()
            .strip("Phone: "),
        category: Some(FieldDescriptor::text("category").in_page()),
        address: Some(
            FieldDescriptor::attribute(Some("address-button"), "aria-label")
                .in_page()
                .strip("Address: "),
        ),
        blocks: None,
    };
    config.detail_panel = Some(DetailPanel {
        ready_selector: "panel".to_string(),
        ready_timeout_ms: 10,
    });
    config
}

/// Config whose selectors match the scripted driver's keys.
pub fn test_config() -> HarvestConfig {
    HarvestConfig {
        target: 100,
        max_session_retries: 0,
        site: SiteSelectors {
            base_url: "https://maps.test".to_string(),
            search_box: "search".to_string(),
            consent_button: Some("consent".to_string()),
            feed_panel: "feed".to_string(),
            result_item: "item".to_string(),
            end_of_list: None,
        },
        fields: FieldSelectors {
            name: FieldDescriptor::text("name"),
            url: FieldDescriptor::attribute(Some("link"), "href"),
            rating: FieldDescriptor::text("rating"),
            reviews: FieldDescriptor::text("reviews"),
            phone: FieldDescriptor::text("phone"),
            category: None,
            address: None,
            blocks: Some("blocks".to_string()),
        },
        detail_panel: None,
        extraction: ExtractionSettings {
            field_timeout_ms: 10,
            stable_timeout_ms: 10,
            max_attempts: 3,
            backoff_min_ms: 5,
            backoff_max_ms: 5,
        },
        stagnation: StagnationSettings {
            no_progress_limit: 6,
            stall_limit: 5,
            end_of_list_limit: 3,
            max_driver_errors: 3,
        },
        pacing: PacingSettings {
            scroll_min_px: 100,
            scroll_max_px: 100,
            pause_min_ms: 1,
            pause_max_ms: 1,
            initial_load_ms: 0,
            feed_timeout_ms: 10,
            consent_timeout_ms: 10,
        },
        ..HarvestConfig::default()
    }
}
