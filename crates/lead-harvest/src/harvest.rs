//! Incremental harvest loop over a virtualized, infinitely-scrolling feed.
//!
//! Each cycle lists the visible items, extracts only the ones not looked at
//! yet, then evaluates stop conditions and asks the driver to load more.
//! Terminal states are `TargetReached`, `Exhausted` (driver keeps reporting
//! the end of the feed), and `Stalled` (too many unproductive cycles).

use rand::Rng;

use crate::config::{HarvestConfig, PacingSettings, StagnationSettings};
use crate::dedup::DedupIndex;
use crate::driver::{Driver, ScrollOutcome};
use crate::pipeline::ItemPipeline;
use crate::progress::{ProgressEventKind, ProgressReporter};
use crate::types::{
    DriverResult, ExtractionOutcome, HarvestError, HarvestOutcome, HarvestResult, Record,
};

/// Session-scoped mutable state of one harvest.
#[derive(Debug, Default)]
pub struct HarvestState {
    /// Accepted records and their identity keys.
    pub index: DedupIndex,
    /// Items already run through the pipeline, whatever their outcome.
    pub looked_at: usize,
    /// Consecutive cycles with no newly accepted record.
    pub no_progress: u32,
    /// Consecutive cycles with an unchanged visible-item count.
    pub stall: u32,
    /// Consecutive cycles ending on an end-of-feed signal without growth.
    pub end_streak: u32,
    /// Consecutive cycles whose item listing failed.
    pub driver_errors: u32,
    pub last_visible: Option<usize>,
    pub cycles: u32,
    pub skipped: usize,
    pub duplicates: usize,
    last_scroll_at_end: bool,
}

impl HarvestState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        self.index.records()
    }

    pub fn accepted(&self) -> usize {
        self.index.len()
    }
}

/// Load-more action chosen for the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    /// Regular randomized scroll.
    Scroll,
    /// Scroll a multiple of the regular distance.
    LargeScroll,
    /// Scroll back up briefly, then far down, to shake loose lazy loading.
    Nudge,
}

impl LoadMore {
    /// Escalate recovery as unproductive cycles pile up.
    pub fn for_no_progress(no_progress: u32) -> Self {
        match no_progress {
            0 | 1 => Self::Scroll,
            2 | 3 => Self::LargeScroll,
            _ => Self::Nudge,
        }
    }
}

/// Drives the pipeline over the feed until a terminal state.
#[derive(Debug, Clone)]
pub struct HarvestLoop {
    pipeline: ItemPipeline,
    feed_selector: String,
    item_selector: String,
    target: usize,
    stagnation: StagnationSettings,
    pacing: PacingSettings,
}

impl HarvestLoop {
    pub fn new(
        pipeline: ItemPipeline,
        feed_selector: impl Into<String>,
        item_selector: impl Into<String>,
        target: usize,
        stagnation: StagnationSettings,
        pacing: PacingSettings,
    ) -> Self {
        Self {
            pipeline,
            feed_selector: feed_selector.into(),
            item_selector: item_selector.into(),
            target,
            stagnation,
            pacing,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            ItemPipeline::from_config(config),
            config.site.feed_panel.clone(),
            config.site.result_item.clone(),
            config.target,
            config.stagnation.clone(),
            config.pacing.clone(),
        )
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn with_target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    /// Run cycles until a terminal state.
    ///
    /// Errors only when item listing fails on too many consecutive cycles.
    pub async fn run<D: Driver>(
        &self,
        driver: &D,
        state: &mut HarvestState,
        progress: &mut ProgressReporter,
    ) -> HarvestResult<HarvestOutcome> {
        loop {
            if let Some(outcome) = self.cycle(driver, state, progress).await? {
                tracing::info!(
                    "harvest {outcome} after {} cycle(s): {} record(s), {} skipped, {} duplicate(s)",
                    state.cycles,
                    state.accepted(),
                    state.skipped,
                    state.duplicates
                );
                progress.emit(ProgressEventKind::HarvestCompleted {
                    outcome,
                    total: state.accepted(),
                });
                return Ok(outcome);
            }
        }
    }

    /// One cycle. Returns the terminal state when one is reached.
    pub async fn cycle<D: Driver>(
        &self,
        driver: &D,
        state: &mut HarvestState,
        progress: &mut ProgressReporter,
    ) -> HarvestResult<Option<HarvestOutcome>> {
        state.cycles += 1;

        let items = match driver.list_items(&self.item_selector).await {
            Ok(items) => {
                state.driver_errors = 0;
                Some(items)
            }
            Err(e) => {
                state.driver_errors += 1;
                tracing::warn!(
                    "listing items failed ({}/{}): {e}",
                    state.driver_errors,
                    self.stagnation.max_driver_errors
                );
                if state.driver_errors >= self.stagnation.max_driver_errors {
                    return Err(HarvestError::TooManyDriverErrors(state.driver_errors));
                }
                None
            }
        };
        let visible = items
            .as_ref()
            .map(Vec::len)
            .or(state.last_visible)
            .unwrap_or(0);

        let mut accepted_this_cycle = 0;
        if let Some(items) = &items {
            for (i, item) in items.iter().enumerate().skip(state.looked_at) {
                if state.accepted() >= self.target {
                    break;
                }
                state.looked_at = i + 1;
                match self.pipeline.extract(driver, item, &mut state.index).await {
                    ExtractionOutcome::Accepted(record) => {
                        accepted_this_cycle += 1;
                        tracing::debug!("item {i}: accepted {:?}", record.name);
                        progress.emit(ProgressEventKind::RecordAccepted {
                            index: i,
                            name: record.name,
                            total: state.accepted(),
                        });
                    }
                    ExtractionOutcome::RejectedDuplicate => {
                        state.duplicates += 1;
                        tracing::debug!("item {i}: duplicate, rejected");
                        progress.emit(ProgressEventKind::DuplicateRejected { index: i });
                    }
                    ExtractionOutcome::Skipped(reason) => {
                        state.skipped += 1;
                        tracing::debug!("item {i}: skipped ({reason})");
                        progress.emit(ProgressEventKind::ItemSkipped { index: i, reason });
                    }
                }
            }
        }

        if state.accepted() >= self.target {
            self.finish_cycle(state, visible, accepted_this_cycle, progress);
            return Ok(Some(HarvestOutcome::TargetReached));
        }

        let unchanged = state.last_visible == Some(visible);
        if unchanged {
            state.stall += 1;
        } else {
            state.stall = 0;
        }
        if accepted_this_cycle == 0 {
            state.no_progress += 1;
        } else {
            state.no_progress = 0;
        }
        if state.last_scroll_at_end && unchanged {
            state.end_streak += 1;
        } else {
            state.end_streak = 0;
        }
        state.last_visible = Some(visible);
        self.finish_cycle(state, visible, accepted_this_cycle, progress);

        if state.end_streak >= self.stagnation.end_of_list_limit {
            return Ok(Some(HarvestOutcome::Exhausted));
        }
        if state.no_progress >= self.stagnation.no_progress_limit
            || state.stall >= self.stagnation.stall_limit
        {
            return Ok(Some(HarvestOutcome::Stalled));
        }

        let action = LoadMore::for_no_progress(state.no_progress);
        state.last_scroll_at_end = match self.load_more(driver, action).await {
            Ok(outcome) => outcome.at_end,
            Err(e) => {
                tracing::warn!("load-more ({action:?}) failed: {e}");
                false
            }
        };
        let pause = self.pause_ms();
        driver.sleep(pause).await;
        Ok(None)
    }

    fn finish_cycle(
        &self,
        state: &HarvestState,
        visible: usize,
        accepted_this_cycle: usize,
        progress: &mut ProgressReporter,
    ) {
        tracing::info!(
            "cycle {}: {visible} visible, +{accepted_this_cycle} accepted, {}/{} total",
            state.cycles,
            state.accepted(),
            self.target
        );
        progress.emit(ProgressEventKind::CycleCompleted {
            cycle: state.cycles,
            visible,
            accepted_this_cycle,
            total: state.accepted(),
            no_progress: state.no_progress,
            stall: state.stall,
        });
    }

    async fn load_more<D: Driver>(
        &self,
        driver: &D,
        action: LoadMore,
    ) -> DriverResult<ScrollOutcome> {
        let amount = self.scroll_px();
        match action {
            LoadMore::Scroll => driver.scroll(&self.feed_selector, amount).await,
            LoadMore::LargeScroll => driver.scroll(&self.feed_selector, amount * 3).await,
            LoadMore::Nudge => {
                driver.scroll(&self.feed_selector, -amount).await?;
                driver.sleep(self.pacing.pause_min_ms / 2).await;
                driver.scroll(&self.feed_selector, amount * 4).await
            }
        }
    }

    fn scroll_px(&self) -> i64 {
        let (lo, hi) = (self.pacing.scroll_min_px, self.pacing.scroll_max_px);
        if lo >= hi {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }

    fn pause_ms(&self) -> u64 {
        let (lo, hi) = (self.pacing.pause_min_ms, self.pacing.pause_max_ms);
        if lo >= hi {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }
}
