// Copyright 2026 Lead Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for harvest telemetry.
//!
//! The harvest loop and session runner emit `ProgressEvent`s through a
//! `tokio::sync::broadcast` channel to any subscriber (CLI progress bar,
//! log sinks). When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

use crate::types::{HarvestOutcome, SkipReason};

/// A progress event emitted during a harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A session attempt opened a fresh driver.
    SessionStarted { attempt: u32 },
    /// A record passed dedup and was appended.
    RecordAccepted { index: usize, name: String, total: usize },
    /// A valid record whose identity was already seen.
    DuplicateRejected { index: usize },
    /// An item that will never be looked at again.
    ItemSkipped { index: usize, reason: SkipReason },
    /// Counter snapshot at the end of a cycle.
    CycleCompleted {
        cycle: u32,
        visible: usize,
        accepted_this_cycle: usize,
        total: usize,
        no_progress: u32,
        stall: u32,
    },
    /// The harvest loop reached a terminal state.
    HarvestCompleted { outcome: HarvestOutcome, total: usize },
    /// A session attempt failed and may be retried.
    SessionFailed { attempt: u32, error: String },
    /// Records were written to the sink.
    Persisted { records: usize, target: String },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Numbers events for one run and forwards them to an optional sender.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<ProgressSender>,
    run_id: String,
    seq: u64,
}

impl ProgressReporter {
    pub fn new(tx: Option<ProgressSender>, run_id: impl Into<String>) -> Self {
        Self {
            tx,
            run_id: run_id.into(),
            seq: 0,
        }
    }

    /// A reporter that drops everything.
    pub fn silent() -> Self {
        Self::new(None, "")
    }

    /// Emit an event, ignoring send errors (no receivers listening).
    pub fn emit(&mut self, event: ProgressEventKind) {
        if let Some(ref sender) = self.tx {
            self.seq += 1;
            let _ = sender.send(ProgressEvent {
                run_id: self.run_id.clone(),
                seq: self.seq,
                event,
            });
        }
    }
}
