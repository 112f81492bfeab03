//! Item extraction pipeline: extractor + normalizer + dedup with bounded retry.
//!
//! One call handles one rendered item:
//! 1. wait for the item to stabilize (else `Skipped(NotStable)`),
//! 2. read the name, retrying the whole extraction while it is missing,
//! 3. read the remaining fields best-effort,
//! 4. normalize and submit to the dedup index.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::config::{
    DetailPanel, ExtractionSettings, FieldSelectors, HarvestConfig, LocationRules,
};
use crate::dedup::DedupIndex;
use crate::driver::{Driver, Scope, WaitState};
use crate::extractor::{BlockClassifier, FieldExtractor};
use crate::normalize::normalize;
use crate::types::{is_present, ExtractionOutcome, RawFields, SkipReason};

/// Why a single attempt did not yield raw fields.
#[derive(Debug)]
enum AttemptFailure {
    NoName,
    Failed(String),
}

/// Extracts, normalizes, and admits one item at a time.
#[derive(Debug, Clone)]
pub struct ItemPipeline {
    extractor: FieldExtractor,
    fields: FieldSelectors,
    detail: Option<DetailPanel>,
    classifier: BlockClassifier,
    location: LocationRules,
    settings: ExtractionSettings,
}

impl ItemPipeline {
    pub fn new(
        fields: FieldSelectors,
        detail: Option<DetailPanel>,
        classifier: BlockClassifier,
        location: LocationRules,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            extractor: FieldExtractor::new(Duration::from_millis(settings.field_timeout_ms)),
            fields,
            detail,
            classifier,
            location,
            settings,
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            config.fields.clone(),
            config.detail_panel.clone(),
            BlockClassifier::from_policy(&config.blocks),
            config.location.clone(),
            config.extraction.clone(),
        )
    }

    /// Run the pipeline over one item.
    ///
    /// Only an accepted record mutates `index`.
    pub async fn extract<D: Driver>(
        &self,
        driver: &D,
        item: &D::Item,
        index: &mut DedupIndex,
    ) -> ExtractionOutcome {
        let stable_timeout = Duration::from_millis(self.settings.stable_timeout_ms);
        if let Err(e) = driver.wait_stable(item, stable_timeout).await {
            tracing::debug!("item never stabilized: {e}");
            return ExtractionOutcome::Skipped(SkipReason::NotStable);
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 0;
        let raw = loop {
            attempt += 1;
            match self.gather(driver, item).await {
                Ok(raw) => break raw,
                Err(failure) if attempt >= max_attempts => {
                    let reason = match failure {
                        AttemptFailure::NoName => SkipReason::NoName,
                        AttemptFailure::Failed(e) => SkipReason::Error(e),
                    };
                    return ExtractionOutcome::Skipped(reason);
                }
                Err(failure) => {
                    let wait = self.backoff_ms();
                    tracing::debug!(
                        "extraction attempt {attempt}/{max_attempts} incomplete ({failure:?}), retrying in {wait}ms"
                    );
                    driver.sleep(wait).await;
                }
            }
        };

        let record = normalize(&raw, &self.location, Utc::now());
        if index.try_admit(record.clone()) {
            ExtractionOutcome::Accepted(record)
        } else {
            ExtractionOutcome::RejectedDuplicate
        }
    }

    async fn gather<D: Driver>(
        &self,
        driver: &D,
        item: &D::Item,
    ) -> Result<RawFields, AttemptFailure> {
        if let Some(detail) = &self.detail {
            driver
                .click(item)
                .await
                .map_err(|e| AttemptFailure::Failed(e.to_string()))?;
            let ready = Duration::from_millis(detail.ready_timeout_ms);
            // Some entries have no address; a missing ready marker is tolerated.
            if let Err(e) = driver
                .wait_for(&detail.ready_selector, WaitState::Attached, ready)
                .await
            {
                tracing::trace!("detail panel not confirmed: {e}");
            }
        }

        let x = &self.extractor;
        let mut raw = RawFields {
            name: x.read_field(driver, item, &self.fields.name).await,
            ..Default::default()
        };
        if !is_present(&raw.name) {
            return Err(AttemptFailure::NoName);
        }

        if let Some(desc) = &self.fields.category {
            raw.category = x.read_field(driver, item, desc).await;
        }
        if let Some(desc) = &self.fields.address {
            raw.address = x.read_field(driver, item, desc).await;
        }
        if self.fields.category.is_none() || self.fields.address.is_none() {
            if let Some(blocks_selector) = &self.fields.blocks {
                let blocks = driver
                    .read_all_text(Scope::Within(item), blocks_selector, x.timeout())
                    .await
                    .map_err(|e| AttemptFailure::Failed(e.to_string()))?;
                let classified = self.classifier.classify(blocks.as_slice());
                if self.fields.category.is_none() {
                    if let Some(category) = classified.category {
                        raw.category = category;
                    }
                }
                if self.fields.address.is_none() {
                    if let Some(address) = classified.address {
                        raw.address = address;
                    }
                }
            }
        }

        raw.url = x.read_field(driver, item, &self.fields.url).await;
        raw.rating = x.read_field(driver, item, &self.fields.rating).await;
        raw.reviews = x.read_field(driver, item, &self.fields.reviews).await;
        raw.phone = x.read_field(driver, item, &self.fields.phone).await;
        Ok(raw)
    }

    fn backoff_ms(&self) -> u64 {
        let (lo, hi) = (self.settings.backoff_min_ms, self.settings.backoff_max_ms);
        if lo >= hi {
            return lo;
        }
        rand::thread_rng().gen_range(lo..=hi)
    }
}
