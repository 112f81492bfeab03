//! Search handshake: open the site, clear the consent modal, submit a query,
//! and wait for the result feed.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{HarvestConfig, PacingSettings, SiteSelectors};
use crate::driver::{Driver, Handshake, WaitState};
use crate::types::{HarvestError, HarvestResult};

/// Search flow for a map-style site with a search box and a result feed.
#[derive(Debug, Clone)]
pub struct SearchHandshake {
    query: String,
    site: SiteSelectors,
    pacing: PacingSettings,
}

impl SearchHandshake {
    pub fn new(query: impl Into<String>, site: SiteSelectors, pacing: PacingSettings) -> Self {
        Self {
            query: query.into(),
            site,
            pacing,
        }
    }

    pub fn from_config(query: impl Into<String>, config: &HarvestConfig) -> Self {
        Self::new(query, config.site.clone(), config.pacing.clone())
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

#[async_trait]
impl Handshake for SearchHandshake {
    async fn perform<D: Driver>(&self, driver: &mut D) -> HarvestResult<()> {
        driver
            .navigate(&self.site.base_url)
            .await
            .map_err(|e| HarvestError::Handshake(format!("navigation failed: {e}")))?;

        if let Some(consent) = &self.site.consent_button {
            let timeout = Duration::from_millis(self.pacing.consent_timeout_ms);
            match driver.wait_for(consent, WaitState::Visible, timeout).await {
                Ok(()) => match driver.click_selector(consent, timeout).await {
                    Ok(()) => tracing::info!("consent accepted"),
                    Err(e) => tracing::warn!("consent button visible but not clickable: {e}"),
                },
                Err(_) => tracing::debug!("no consent modal"),
            }
        }

        driver
            .fill_and_submit(&self.site.search_box, &self.query)
            .await
            .map_err(|e| HarvestError::Handshake(format!("search submit failed: {e}")))?;
        driver.sleep(self.pacing.initial_load_ms).await;

        let feed_timeout = Duration::from_millis(self.pacing.feed_timeout_ms);
        driver
            .wait_for(&self.site.feed_panel, WaitState::Visible, feed_timeout)
            .await
            .map_err(|e| HarvestError::Handshake(format!("result feed not found: {e}")))?;

        tracing::info!("search submitted: {:?}", self.query);
        Ok(())
    }
}
