use crate::values::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Progress counters for one channel relay
///
/// Written by exactly one relay task, read by any number of observers.
/// The item count only grows, and `closed` is a one-way publish: once an
/// observer sees `is_closed()`, every item counted before the close is
/// visible too.
#[derive(Debug)]
pub struct ChannelStatus {
    label: String,
    started_at: OnceLock<Timestamp>,
    closed_at: OnceLock<Timestamp>,
    failure: OnceLock<String>,
    items: AtomicU64,
    closed: AtomicBool,
}

impl ChannelStatus {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            started_at: OnceLock::new(),
            closed_at: OnceLock::new(),
            failure: OnceLock::new(),
            items: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Mark the relay as started. Only the first call records a time.
    pub fn report_start(&self) {
        let _ = self.started_at.set(Utc::now());
    }

    /// Count `n` more transferred items
    pub fn report_add(&self, n: u64) {
        self.items.fetch_add(n, Ordering::AcqRel);
    }

    /// Mark the relay as completely drained. Ignored after a failure.
    pub fn report_close(&self) {
        if self.failure.get().is_some() {
            return;
        }
        let _ = self.closed_at.set(Utc::now());
        self.closed.store(true, Ordering::Release);
    }

    /// Mark the relay as stopped on an error. Only the first reason is kept.
    pub fn report_failure(&self, reason: impl Into<String>) {
        let _ = self.failure.set(reason.into());
    }

    pub fn count(&self) -> u64 {
        self.items.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.started_at.get().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_failed(&self) -> bool {
        self.failure.get().is_some()
    }

    /// Returns true once the relay has either drained or failed
    pub fn is_finished(&self) -> bool {
        self.is_closed() || self.is_failed()
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at.get().copied()
    }

    pub fn closed_at(&self) -> Option<Timestamp> {
        self.closed_at.get().copied()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.get().map(String::as_str)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        // Read `closed` first so the count is at least as new as the flag
        let closed = self.is_closed();
        StatusSnapshot {
            label: self.label.clone(),
            items: self.count(),
            started_at: self.started_at(),
            closed_at: self.closed_at(),
            closed,
            failure: self.failure().map(str::to_string),
        }
    }
}

/// Point-in-time copy of a `ChannelStatus`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub label: String,
    pub items: u64,
    pub started_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub closed: bool,
    pub failure: Option<String>,
}
