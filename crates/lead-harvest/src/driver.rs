//! Page-automation capability surface.
//!
//! The harvesting engine never talks to a browser directly. It goes through
//! [`Driver`], which a runtime implements on top of a real browser (Chromium
//! via chromiumoxide) and tests implement over a scripted in-memory feed.
//! Every call may fail with a [`DriverError`]; the engine decides per call
//! site whether that failure is recoverable.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{DriverResult, HarvestResult};

/// Element state awaited by [`Driver::wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Present in the DOM.
    Attached,
    /// Present and rendered with a non-empty box.
    Visible,
}

/// Where a read is resolved.
pub enum Scope<'a, I> {
    /// The whole page.
    Page,
    /// Inside one item handle.
    Within(&'a I),
}

impl<I> Clone for Scope<'_, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I> Copy for Scope<'_, I> {}

/// What a scroll action observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollOutcome {
    /// The scroll position saturated or an end-of-list marker is visible.
    pub at_end: bool,
}

/// A single browser session able to drive one result feed.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Opaque reference to one rendered item, valid only within this session.
    type Item: Send + Sync;

    /// Navigate the page to `url`.
    async fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Type `text` into the element at `selector` and submit it.
    async fn fill_and_submit(&self, selector: &str, text: &str) -> DriverResult<()>;

    /// Wait until `selector` reaches `state`, or fail after `timeout`.
    async fn wait_for(&self, selector: &str, state: WaitState, timeout: Duration)
        -> DriverResult<()>;

    /// Current visible items matching `selector`, in DOM order.
    async fn list_items(&self, selector: &str) -> DriverResult<Vec<Self::Item>>;

    /// Wait until `item` is attached and rendered.
    async fn wait_stable(&self, item: &Self::Item, timeout: Duration) -> DriverResult<()>;

    /// Text of the first element matching `selector` inside `scope`.
    ///
    /// With `selector = None` the scope element itself is read.
    async fn read_text(
        &self,
        scope: Scope<'_, Self::Item>,
        selector: Option<&str>,
        timeout: Duration,
    ) -> DriverResult<String>;

    /// Attribute `name` of the first element matching `selector` inside `scope`.
    async fn read_attribute(
        &self,
        scope: Scope<'_, Self::Item>,
        selector: Option<&str>,
        name: &str,
        timeout: Duration,
    ) -> DriverResult<String>;

    /// Texts of every element matching `selector` inside `scope`, in DOM order.
    async fn read_all_text(
        &self,
        scope: Scope<'_, Self::Item>,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Vec<String>>;

    /// Scroll the container at `selector` by `amount` pixels (negative scrolls up).
    async fn scroll(&self, selector: &str, amount: i64) -> DriverResult<ScrollOutcome>;

    /// Click an item.
    async fn click(&self, item: &Self::Item) -> DriverResult<()>;

    /// Click the first element matching `selector`.
    async fn click_selector(&self, selector: &str, timeout: Duration) -> DriverResult<()>;

    /// Pause for `ms` milliseconds.
    async fn sleep(&self, ms: u64);

    /// Capture a screenshot of the page to `path`.
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Release browser resources held by this session.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Opens a fresh [`Driver`] for every session attempt.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    type Driver: Driver;

    async fn open(&self) -> DriverResult<Self::Driver>;
}

/// Site-specific navigation and search flow run before harvesting.
#[async_trait]
pub trait Handshake: Send + Sync {
    async fn perform<D: Driver>(&self, driver: &mut D) -> HarvestResult<()>;
}
