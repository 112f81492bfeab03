//! Record normalization: raw field strings into typed, cleaned values.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::LocationRules;
use crate::types::{is_present, RawFields, Record, SENTINEL, UNKNOWN_CATEGORY};

fn rating_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("rating regex is valid"))
}

fn review_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*").expect("review regex is valid"))
}

/// First decimal number in `raw`, e.g. `"4.5 stars"` → `4.5`.
pub fn parse_rating(raw: &str) -> Option<f32> {
    if !is_present(raw) {
        return None;
    }
    let m = rating_re().find(raw)?;
    m.as_str().replace(',', ".").parse::<f32>().ok()
}

/// First digit run in `raw` with thousands separators removed, e.g. `"(1,234)"` → `1234`.
pub fn parse_review_count(raw: &str) -> Option<u32> {
    if !is_present(raw) {
        return None;
    }
    let m = review_re().find(raw)?;
    m.as_str().replace(',', "").parse::<u32>().ok()
}

/// Canonical location for `address`: first matching rule, else the default.
///
/// Matching is a case-insensitive substring test.
pub fn derive_location(address: &str, rules: &LocationRules) -> String {
    if is_present(address) {
        let haystack = address.to_lowercase();
        for rule in &rules.rules {
            if !rule.contains.is_empty() && haystack.contains(&rule.contains.to_lowercase()) {
                return rule.name.clone();
            }
        }
    }
    rules.default.clone()
}

fn clean(value: &str) -> String {
    if is_present(value) {
        value.trim().to_string()
    } else {
        SENTINEL.to_string()
    }
}

/// Build a [`Record`] from raw field strings.
pub fn normalize(raw: &RawFields, rules: &LocationRules, captured_at: DateTime<Utc>) -> Record {
    let category = if is_present(&raw.category) {
        raw.category.trim().to_string()
    } else {
        UNKNOWN_CATEGORY.to_string()
    };
    Record {
        name: clean(&raw.name),
        category,
        address: clean(&raw.address),
        phone: clean(&raw.phone),
        url: clean(&raw.url),
        rating: parse_rating(&raw.rating),
        review_count: parse_review_count(&raw.reviews),
        derived_location: derive_location(&raw.address, rules),
        captured_at,
    }
}
