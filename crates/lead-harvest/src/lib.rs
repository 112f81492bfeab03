//! Lead Harvest — incremental harvesting engine for virtualized result feeds.
//!
//! Items in an infinitely-scrolling feed become visible a few at a time and
//! render inconsistently. This crate turns them into clean, deduplicated
//! records: a fallback-tolerant field extractor, a normalizer, a
//! session-scoped dedup index, a retrying per-item pipeline, the scroll-driven
//! harvest loop with stagnation detection, and a session runner that restarts
//! failed sessions and persists partial results on every exit path.
//!
//! Browser access goes through the [`Driver`] trait.

pub mod config;
pub mod dedup;
pub mod driver;
pub mod export;
pub mod extractor;
pub mod handshake;
pub mod harvest;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod types;

pub use config::HarvestConfig;
pub use dedup::{DedupIndex, IdentityKey};
pub use driver::{Driver, DriverFactory, Handshake, Scope, ScrollOutcome, WaitState};
pub use export::{sink_for, CsvSink, JsonSink, RecordSink};
pub use extractor::{BlockClassifier, FieldExtractor, Slot, SlotRule};
pub use handshake::SearchHandshake;
pub use harvest::{HarvestLoop, HarvestState, LoadMore};
pub use normalize::{derive_location, normalize, parse_rating, parse_review_count};
pub use pipeline::ItemPipeline;
pub use session::SessionRunner;
pub use types::*;
