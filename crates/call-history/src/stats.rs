//! Process-wide call-history counters
//!
//! Incremented concurrently by every transaction and store worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct CallHistoryStats {
    completed_calls: AtomicU64,
    failed_calls: AtomicU64,
    not_recorded_overload: AtomicU64,
    notify_failures: AtomicU64,
    write_latency_us_total: AtomicU64,
    latency_samples: AtomicU64,
}

/// Point-in-time copy of [`CallHistoryStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Fragments written successfully
    pub completed_calls: u64,
    /// Fragments the store failed to write, or that could not be queued
    pub failed_calls: u64,
    /// Fragments dropped because the overload guard refused them
    pub not_recorded_overload: u64,
    pub notify_failures: u64,
    /// Mean latency of the writes that reached the store
    pub average_write_latency_us: u64,
}

impl CallHistoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self, latency: Duration) {
        self.completed_calls.fetch_add(1, Ordering::Relaxed);
        self.add_latency(latency);
    }

    pub fn record_failed(&self, latency: Option<Duration>) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = latency {
            self.add_latency(latency);
        }
    }

    pub fn record_overload(&self) {
        self.not_recorded_overload.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notify_failure(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn add_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.write_latency_us_total.fetch_add(micros, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed_calls(&self) -> u64 {
        self.completed_calls.load(Ordering::Relaxed)
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.load(Ordering::Relaxed)
    }

    pub fn not_recorded_overload(&self) -> u64 {
        self.not_recorded_overload.load(Ordering::Relaxed)
    }

    pub fn notify_failures(&self) -> u64 {
        self.notify_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let completed_calls = self.completed_calls();
        let failed_calls = self.failed_calls();
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let average_write_latency_us = if samples == 0 {
            0
        } else {
            self.write_latency_us_total.load(Ordering::Relaxed) / samples
        };

        StatsSnapshot {
            completed_calls,
            failed_calls,
            not_recorded_overload: self.not_recorded_overload(),
            notify_failures: self.notify_failures(),
            average_write_latency_us,
        }
    }
}
