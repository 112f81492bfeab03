//! Fallback-tolerant field reads and category/address block classification.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BlockPolicy, FieldDescriptor, FieldScope};
use crate::driver::{Driver, Scope};
use crate::types::SENTINEL;

/// Reads single fields, converting every driver failure into [`SENTINEL`].
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor {
    timeout: Duration,
}

impl FieldExtractor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read one field of `item`, or [`SENTINEL`] if it is absent, hidden, or slow.
    pub async fn read_field<D: Driver>(
        &self,
        driver: &D,
        item: &D::Item,
        field: &FieldDescriptor,
    ) -> String {
        let scope = match field.scope {
            FieldScope::Item => Scope::Within(item),
            FieldScope::Page => Scope::Page,
        };
        let selector = field.selector.as_deref();
        let result = match &field.attribute {
            Some(name) => {
                driver
                    .read_attribute(scope, selector, name, self.timeout)
                    .await
            }
            None => driver.read_text(scope, selector, self.timeout).await,
        };
        match result {
            Ok(value) => {
                let value = match &field.strip_prefix {
                    Some(prefix) => value
                        .trim()
                        .strip_prefix(prefix.as_str())
                        .unwrap_or(value.as_str()),
                    None => value.as_str(),
                };
                let value = value.trim();
                if value.is_empty() {
                    SENTINEL.to_string()
                } else {
                    value.to_string()
                }
            }
            Err(e) => {
                tracing::trace!("field {:?} unavailable: {e}", field.selector);
                SENTINEL.to_string()
            }
        }
    }
}

/// Slot a candidate block can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Category,
    Address,
}

/// One entry in the ordered classification policy.
#[derive(Clone)]
pub struct SlotRule {
    pub slot: Slot,
    test: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl SlotRule {
    pub fn new(slot: Slot, test: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            slot,
            test: Arc::new(test),
        }
    }

    pub fn matches(&self, block: &str) -> bool {
        (self.test)(block)
    }
}

impl std::fmt::Debug for SlotRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRule").field("slot", &self.slot).finish()
    }
}

/// Category and address picked out of a list of blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub category: Option<String>,
    pub address: Option<String>,
}

/// Ordered predicate list assigning candidate text blocks to slots.
///
/// Blocks are visited in DOM order. Each block fills at most one slot, and a
/// filled slot is never overwritten.
#[derive(Debug, Clone)]
pub struct BlockClassifier {
    rules: Vec<SlotRule>,
    separators: Vec<String>,
}

impl BlockClassifier {
    pub fn new(rules: Vec<SlotRule>, separators: Vec<String>) -> Self {
        Self { rules, separators }
    }

    /// Shape rules for category (short, no digits, no price/status terms) and
    /// address (long enough, with a digit or comma, no status terms).
    pub fn from_policy(policy: &BlockPolicy) -> Self {
        let category_max = policy.category_max_len;
        let address_min = policy.address_min_len;
        let status: Arc<Vec<String>> = Arc::new(
            policy
                .status_terms
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
        );
        let prices = policy.price_marks.clone();

        let category_status = Arc::clone(&status);
        let category = SlotRule::new(Slot::Category, move |block| {
            block.chars().count() < category_max
                && !block.chars().any(|c| c.is_ascii_digit())
                && !prices.iter().any(|p| block.contains(p.as_str()))
                && !mentions_status(block, &category_status)
        });
        let address = SlotRule::new(Slot::Address, move |block| {
            block.chars().count() > address_min
                && block.chars().any(|c| c.is_ascii_digit() || c == ',')
                && !mentions_status(block, &status)
        });

        Self::new(vec![category, address], policy.separators.clone())
    }

    /// Append a rule evaluated after the existing ones.
    pub fn with_rule(mut self, rule: SlotRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn classify<S: AsRef<str>>(&self, blocks: &[S]) -> Classified {
        let mut out = Classified::default();
        for raw in blocks {
            let block = self.trim_separators(raw.as_ref());
            if block.is_empty() {
                continue;
            }
            for rule in &self.rules {
                let slot = match rule.slot {
                    Slot::Category => &mut out.category,
                    Slot::Address => &mut out.address,
                };
                if slot.is_none() && rule.matches(block) {
                    *slot = Some(block.to_string());
                    break;
                }
            }
            if out.category.is_some() && out.address.is_some() {
                break;
            }
        }
        out
    }

    fn trim_separators<'a>(&self, block: &'a str) -> &'a str {
        let mut s = block.trim();
        loop {
            let before = s.len();
            for sep in &self.separators {
                s = s.trim_start_matches(sep.as_str()).trim_end_matches(sep.as_str()).trim();
            }
            if s.len() == before {
                return s;
            }
        }
    }
}

fn mentions_status(block: &str, terms: &[String]) -> bool {
    let lower = block.to_lowercase();
    terms.iter().any(|term| {
        if term.contains(' ') {
            lower.contains(term.as_str())
        } else {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == term)
        }
    })
}
