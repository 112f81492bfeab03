//! Harvest configuration: selectors, thresholds, pacing, and output.
//!
//! Loaded from a JSON file where every field is optional, then adjusted by
//! `LEADHARVEST_*` environment overrides. Defaults follow the Google Maps
//! result feed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{HarvestError, HarvestResult};

const DEFAULT_BASE_URL: &str = "https://www.google.com/maps";
const DEFAULT_TARGET: usize = 100;
const DEFAULT_MAX_SESSION_RETRIES: u32 = 2;

/// Where a field descriptor is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    /// Inside the item handle.
    #[default]
    Item,
    /// Anywhere on the page (detail panel).
    Page,
}

/// How to read one field.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDescriptor {
    pub scope: FieldScope,
    /// `None` reads the scope element itself.
    pub selector: Option<String>,
    /// Read this attribute instead of the text content.
    pub attribute: Option<String>,
    /// Prefix removed from the value when present (e.g. `"Address: "`).
    pub strip_prefix: Option<String>,
}

impl FieldDescriptor {
    /// Text content of the first match of `selector` inside the item.
    pub fn text(selector: &str) -> Self {
        Self {
            selector: Some(selector.to_string()),
            ..Default::default()
        }
    }

    /// Attribute of the first match of `selector` (or the item itself).
    pub fn attribute(selector: Option<&str>, name: &str) -> Self {
        Self {
            selector: selector.map(str::to_string),
            attribute: Some(name.to_string()),
            ..Default::default()
        }
    }

    /// Resolve against the whole page instead of the item.
    pub fn in_page(mut self) -> Self {
        self.scope = FieldScope::Page;
        self
    }

    pub fn strip(mut self, prefix: &str) -> Self {
        self.strip_prefix = Some(prefix.to_string());
        self
    }
}

/// Per-field selectors.
///
/// When `category`/`address` are unset, both are classified from the
/// candidate text blocks matched by `blocks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSelectors {
    pub name: FieldDescriptor,
    pub url: FieldDescriptor,
    pub rating: FieldDescriptor,
    pub reviews: FieldDescriptor,
    pub phone: FieldDescriptor,
    pub category: Option<FieldDescriptor>,
    pub address: Option<FieldDescriptor>,
    pub blocks: Option<String>,
}

impl Default for FieldSelectors {
    fn default() -> Self {
        Self::card()
    }
}

impl FieldSelectors {
    /// Read everything from the result card itself.
    pub fn card() -> Self {
        Self {
            name: FieldDescriptor::text("div.qBF1Pd"),
            url: FieldDescriptor::attribute(Some("a[href*='/maps/place/']"), "href"),
            rating: FieldDescriptor::text("span.MW4etd"),
            reviews: FieldDescriptor::text("span.UY7F9"),
            phone: FieldDescriptor::text("span.UsdlK"),
            category: None,
            address: None,
            blocks: Some("div.W4Efsd span".to_string()),
        }
    }

    /// Read from the detail panel opened by clicking the card.
    pub fn detail() -> Self {
        Self {
            name: FieldDescriptor::text("h1.DUwDvf").in_page(),
            url: FieldDescriptor::attribute(Some("a[href*='/maps/place/']"), "href"),
            rating: FieldDescriptor::attribute(Some("div.F7nice span[aria-hidden='true']"), "aria-label")
                .in_page(),
            reviews: FieldDescriptor::attribute(
                Some("div.F7nice span[aria-label*='reviews']"),
                "aria-label",
            )
            .in_page(),
            phone: FieldDescriptor::attribute(Some("button[data-item-id^='phone:tel:']"), "aria-label")
                .in_page()
                .strip("Phone: "),
            category: Some(FieldDescriptor::text("button[jsaction*='category']").in_page()),
            address: Some(
                FieldDescriptor::attribute(Some("button[data-item-id='address']"), "aria-label")
                    .in_page()
                    .strip("Address: "),
            ),
            blocks: None,
        }
    }
}

/// Detail panel opened by clicking an item before its fields are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailPanel {
    /// Selector whose appearance signals the panel has loaded.
    pub ready_selector: String,
    pub ready_timeout_ms: u64,
}

impl Default for DetailPanel {
    fn default() -> Self {
        Self {
            ready_selector: "button[data-item-id='address']".to_string(),
            ready_timeout_ms: 3000,
        }
    }
}

/// Page-level selectors for the search flow and the result feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSelectors {
    pub base_url: String,
    pub search_box: String,
    pub consent_button: Option<String>,
    /// Scrollable container of the result feed.
    pub feed_panel: String,
    /// One rendered result item inside the feed.
    pub result_item: String,
    /// Marker rendered once the feed cannot load more.
    pub end_of_list: Option<String>,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_box: "input#searchboxinput".to_string(),
            consent_button: Some("button[aria-label='Accept all']".to_string()),
            feed_panel: "div[role='feed']".to_string(),
            result_item: "div[role='feed'] div[role='article']".to_string(),
            end_of_list: Some("span.HlvSq".to_string()),
        }
    }
}

/// Per-item extraction bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub field_timeout_ms: u64,
    pub stable_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self {
            field_timeout_ms: 2000,
            stable_timeout_ms: 5000,
            max_attempts: 3,
            backoff_min_ms: 200,
            backoff_max_ms: 700,
        }
    }
}

/// Stop-condition thresholds for the harvest loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagnationSettings {
    /// Consecutive cycles without a newly accepted record.
    pub no_progress_limit: u32,
    /// Consecutive cycles with an unchanged visible-item count.
    pub stall_limit: u32,
    /// Consecutive cycles the driver reports the end of the feed.
    pub end_of_list_limit: u32,
    /// Consecutive cycles whose item listing failed.
    pub max_driver_errors: u32,
}

impl Default for StagnationSettings {
    fn default() -> Self {
        Self {
            no_progress_limit: 6,
            stall_limit: 5,
            end_of_list_limit: 3,
            max_driver_errors: 3,
        }
    }
}

/// Randomized scroll and pause bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    pub scroll_min_px: i64,
    pub scroll_max_px: i64,
    pub pause_min_ms: u64,
    pub pause_max_ms: u64,
    pub initial_load_ms: u64,
    pub feed_timeout_ms: u64,
    pub consent_timeout_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            scroll_min_px: 600,
            scroll_max_px: 1200,
            pause_min_ms: 1000,
            pause_max_ms: 2000,
            initial_load_ms: 3000,
            feed_timeout_ms: 10_000,
            consent_timeout_ms: 3000,
        }
    }
}

/// One substring rule for location derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRule {
    pub contains: String,
    pub name: String,
}

/// Default location and the ordered rules that override it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationRules {
    pub default: String,
    pub rules: Vec<LocationRule>,
}

impl Default for LocationRules {
    fn default() -> Self {
        Self {
            default: "Unknown".to_string(),
            rules: Vec::new(),
        }
    }
}

/// Shape limits for classifying candidate text blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockPolicy {
    /// Category blocks are strictly shorter than this.
    pub category_max_len: usize,
    /// Address blocks are strictly longer than this.
    pub address_min_len: usize,
    /// Words that mark opening-hours status.
    pub status_terms: Vec<String>,
    /// Substrings that mark a price level.
    pub price_marks: Vec<String>,
    /// Bare glyphs separating blocks.
    pub separators: Vec<String>,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            category_max_len: 40,
            address_min_len: 8,
            status_terms: ["open", "opens", "closed", "closes", "hours", "24 hours"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            price_marks: ["$", "€", "£", "¥", "₹"].iter().map(|s| s.to_string()).collect(),
            separators: ["·", "⋅", "•", "|"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Export format for the record sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(HarvestError::Config(format!("unknown export format: {other}"))),
        }
    }
}

/// Output location and format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub format: ExportFormat,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            format: ExportFormat::Csv,
        }
    }
}

/// Full harvest configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub target: usize,
    pub max_session_retries: u32,
    pub site: SiteSelectors,
    pub fields: FieldSelectors,
    pub detail_panel: Option<DetailPanel>,
    pub extraction: ExtractionSettings,
    pub stagnation: StagnationSettings,
    pub pacing: PacingSettings,
    pub location: LocationRules,
    pub blocks: BlockPolicy,
    pub output: OutputSettings,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET,
            max_session_retries: DEFAULT_MAX_SESSION_RETRIES,
            site: SiteSelectors::default(),
            fields: FieldSelectors::card(),
            detail_panel: None,
            extraction: ExtractionSettings::default(),
            stagnation: StagnationSettings::default(),
            pacing: PacingSettings::default(),
            location: LocationRules::default(),
            blocks: BlockPolicy::default(),
            output: OutputSettings::default(),
        }
    }
}

impl HarvestConfig {
    /// Preset that opens each card's detail panel before reading fields.
    pub fn detail_preset() -> Self {
        Self {
            fields: FieldSelectors::detail(),
            detail_panel: Some(DetailPanel::default()),
            ..Self::default()
        }
    }

    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(raw: &str) -> HarvestResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Load a JSON config file.
    pub fn load(path: &Path) -> HarvestResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarvestError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Apply `LEADHARVEST_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.target = read_env_usize("LEADHARVEST_TARGET", self.target);
        self.max_session_retries =
            read_env_u32("LEADHARVEST_MAX_RETRIES", self.max_session_retries);
        if let Some(dir) = read_env_string("LEADHARVEST_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.output.dir = PathBuf::from(dir);
            }
        }
        if let Some(url) = read_env_string("LEADHARVEST_BASE_URL") {
            if !url.is_empty() {
                self.site.base_url = url;
            }
        }
    }

    /// Reject inconsistent bounds.
    pub fn validate(&self) -> HarvestResult<()> {
        if self.target == 0 {
            return Err(HarvestError::Config("target must be at least 1".to_string()));
        }
        if self.extraction.max_attempts == 0 {
            return Err(HarvestError::Config(
                "extraction.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.extraction.backoff_min_ms > self.extraction.backoff_max_ms {
            return Err(HarvestError::Config(
                "extraction.backoff_min_ms exceeds backoff_max_ms".to_string(),
            ));
        }
        if self.pacing.scroll_min_px <= 0 || self.pacing.scroll_min_px > self.pacing.scroll_max_px
        {
            return Err(HarvestError::Config(
                "pacing scroll bounds must satisfy 0 < min <= max".to_string(),
            ));
        }
        if self.pacing.pause_min_ms > self.pacing.pause_max_ms {
            return Err(HarvestError::Config(
                "pacing.pause_min_ms exceeds pause_max_ms".to_string(),
            ));
        }
        let s = &self.stagnation;
        if s.no_progress_limit == 0 || s.stall_limit == 0 || s.end_of_list_limit == 0 {
            return Err(HarvestError::Config(
                "stagnation limits must be at least 1".to_string(),
            ));
        }
        if self.fields.category.is_none() != self.fields.address.is_none()
            && self.fields.blocks.is_none()
        {
            return Err(HarvestError::Config(
                "fields.blocks is required when category or address has no selector"
                    .to_string(),
            ));
        }
        if self.fields.category.is_none()
            && self.fields.address.is_none()
            && self.fields.blocks.is_none()
        {
            return Err(HarvestError::Config(
                "fields need either category/address selectors or a blocks selector".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env_usize(name: &str, default_value: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default_value)
}

fn read_env_u32(name: &str, default_value: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default_value)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|v| v.trim().to_string())
}
