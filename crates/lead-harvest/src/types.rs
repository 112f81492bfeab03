//! Core data types for harvested records, outcomes, and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder for a field that could not be read.
pub const SENTINEL: &str = "N/A";

/// Placeholder category when no block qualified as a category.
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Export column order. `Record`'s field order must match.
pub const COLUMNS: [&str; 9] = [
    "name",
    "category",
    "address",
    "phone",
    "url",
    "rating",
    "review_count",
    "derived_location",
    "captured_at",
];

/// One harvested entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub url: String,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub derived_location: String,
    pub captured_at: DateTime<Utc>,
}

impl Record {
    /// Whether a usable url was captured for this record.
    pub fn has_url(&self) -> bool {
        is_present(&self.url)
    }
}

/// Raw field strings as read from one rendered item, before normalization.
///
/// Every field is either the as-read text or [`SENTINEL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFields {
    pub name: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    pub url: String,
    pub rating: String,
    pub reviews: String,
}

impl Default for RawFields {
    fn default() -> Self {
        Self {
            name: SENTINEL.to_string(),
            category: SENTINEL.to_string(),
            address: SENTINEL.to_string(),
            phone: SENTINEL.to_string(),
            url: SENTINEL.to_string(),
            rating: SENTINEL.to_string(),
            reviews: SENTINEL.to_string(),
        }
    }
}

/// True when `value` carries real content (neither empty nor the sentinel).
pub fn is_present(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty() && trimmed != SENTINEL
}

/// Why an item was permanently skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The item never reached a stable, renderable state.
    NotStable,
    /// The name field stayed unreadable after every attempt.
    NoName,
    /// An unexpected failure persisted through every attempt.
    Error(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStable => write!(f, "not stable"),
            Self::NoName => write!(f, "no name"),
            Self::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Result of running the extraction pipeline over a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Accepted(Record),
    RejectedDuplicate,
    Skipped(SkipReason),
}

/// Terminal state of one harvest loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// The accumulated record count reached the target.
    TargetReached,
    /// The driver persistently signalled that no more content can load.
    Exhausted,
    /// Too many consecutive cycles without progress.
    Stalled,
}

impl std::fmt::Display for HarvestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetReached => write!(f, "target reached"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Stalled => write!(f, "stalled"),
        }
    }
}

/// How a session run ended without a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed(HarvestOutcome),
    Interrupted,
}

/// Successful result of a session run.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Accumulated records in discovery order.
    pub records: Vec<Record>,
    pub outcome: SessionOutcome,
    /// Number of session attempts made, including the final one.
    pub attempts: u32,
}

/// Errors raised by the automation driver.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Timed out after {ms}ms: {what}")]
    Timeout { what: String, ms: u64 },

    #[error("Element not found: {0}")]
    NotFound(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Script error: {0}")]
    Script(String),
}

/// Convenience result type for driver calls.
pub type DriverResult<T> = Result<T, DriverError>;

/// Session-level errors.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Driver failed on {0} consecutive cycles")]
    TooManyDriverErrors(u32),

    #[error("Interrupted")]
    Interrupted,

    #[error("Persist error: {0}")]
    Persist(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Session failed after {attempts} attempt(s): {last}")]
    SessionsExhausted {
        attempts: u32,
        /// Records saved by the final attempt.
        persisted: usize,
        last: Box<HarvestError>,
    },
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_present() {
        assert!(is_present("Cafe"));
        assert!(!is_present("N/A"));
        assert!(!is_present("  "));
        assert!(!is_present(""));
    }

    #[test]
    fn test_raw_fields_default_to_sentinel() {
        let raw = RawFields::default();
        assert_eq!(raw.name, SENTINEL);
        assert_eq!(raw.reviews, SENTINEL);
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::NoName.to_string(), "no name");
        assert_eq!(SkipReason::NotStable.to_string(), "not stable");
        assert_eq!(
            SkipReason::Error("boom".to_string()).to_string(),
            "error: boom"
        );
    }

    #[test]
    fn test_sessions_exhausted_message() {
        let err = HarvestError::SessionsExhausted {
            attempts: 3,
            persisted: 0,
            last: Box::new(HarvestError::Handshake("feed missing".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Session failed after 3 attempt(s): Handshake failed: feed missing"
        );
    }
}
