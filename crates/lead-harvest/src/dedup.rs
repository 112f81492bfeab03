//! Identity keys and the session-scoped dedup index.

use std::collections::HashSet;

use crate::types::Record;

/// Identity of a record within one harvest session.
///
/// The url wins when present; otherwise the `(name, address)` pair is used.
/// Keeping the pair as two fields makes the key unambiguous without joining.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Url(String),
    NameAddress(String, String),
}

impl IdentityKey {
    pub fn of(record: &Record) -> Self {
        if record.has_url() {
            Self::Url(record.url.trim().to_string())
        } else {
            Self::NameAddress(
                record.name.trim().to_string(),
                record.address.trim().to_string(),
            )
        }
    }
}

/// Seen identity keys plus the accumulated records, in discovery order.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<IdentityKey>,
    records: Vec<Record>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `record` unless its identity was already seen.
    ///
    /// A rejected record leaves the index untouched.
    pub fn try_admit(&mut self, record: Record) -> bool {
        let key = IdentityKey::of(&record);
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key);
        self.records.push(record);
        true
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.seen.contains(&IdentityKey::of(record))
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}
