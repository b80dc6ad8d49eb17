//! Overload guard for call list store writes
//!
//! A token bucket whose refill rate follows store latency. Every write
//! attempt from every transaction takes a token through
//! [`LoadMonitor::admit_request`]; store workers report how long each write
//! took through [`LoadMonitor::request_complete`].
//!
//! Once per adjustment period (after [`REQUESTS_BEFORE_ADJUSTMENT`]
//! completions or [`ADJUST_PERIOD`], whichever comes first) the rate is
//! revised:
//!
//! - average latency above target: the rate is divided by
//!   `1 + (average - target) / target`
//! - latency on target and some requests were refused in the period: the
//!   rate grows by [`INCREASE_FACTOR`]
//!
//! The rate always stays within `[min_token_rate, max_token_rate]`; a
//! `max_token_rate` of zero means no ceiling.

use std::time::{Duration, Instant};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const ADJUST_PERIOD: Duration = Duration::from_secs(2);
pub const REQUESTS_BEFORE_ADJUSTMENT: u32 = 20;
pub const INCREASE_FACTOR: f64 = 0.5;

/// Overload guard tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadMonitorConfig {
    /// Store write latency the guard steers towards
    pub target_latency: Duration,
    /// Bucket size
    pub max_tokens: u32,
    /// Tokens per second at start-up
    pub init_token_rate: f32,
    pub min_token_rate: f32,
    /// Zero means unbounded
    pub max_token_rate: f32,
}

impl Default for LoadMonitorConfig {
    fn default() -> Self {
        Self {
            target_latency: Duration::from_micros(1_000_000),
            max_tokens: 20,
            init_token_rate: 100.0,
            min_token_rate: 10.0,
            max_token_rate: 0.0,
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(max_tokens: f64, rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.max_tokens);
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    bucket: TokenBucket,
    pending: u32,
    rejected_in_period: u32,
    latency_total_us: u64,
    samples: u32,
    period_start: Instant,
}

/// Shared, rate-limited admission guard
#[derive(Debug)]
pub struct LoadMonitor {
    config: LoadMonitorConfig,
    state: Mutex<MonitorState>,
}

impl LoadMonitor {
    pub fn new(config: LoadMonitorConfig) -> Self {
        let rate = clamp_rate(&config, config.init_token_rate as f64);
        let bucket = TokenBucket::new(config.max_tokens as f64, rate);
        Self {
            config,
            state: Mutex::new(MonitorState {
                bucket,
                pending: 0,
                rejected_in_period: 0,
                latency_total_us: 0,
                samples: 0,
                period_start: Instant::now(),
            }),
        }
    }

    /// Take a token for one store write. `false` means the write must be
    /// dropped.
    pub fn admit_request(&self) -> bool {
        let mut state = self.state.lock();
        if state.bucket.try_take(Instant::now()) {
            state.pending += 1;
            true
        } else {
            state.rejected_in_period += 1;
            false
        }
    }

    /// Report the latency of a write admitted earlier
    pub fn request_complete(&self, latency: Duration) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        state.samples += 1;
        state.latency_total_us = state
            .latency_total_us
            .saturating_add(u64::try_from(latency.as_micros()).unwrap_or(u64::MAX));

        let now = Instant::now();
        if state.samples >= REQUESTS_BEFORE_ADJUSTMENT
            || now.saturating_duration_since(state.period_start) >= ADJUST_PERIOD
        {
            self.adjust_rate(&mut state, now);
        }
    }

    /// Release a write admitted earlier that never reached the store
    pub fn request_abandoned(&self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
    }

    fn adjust_rate(&self, state: &mut MonitorState, now: Instant) {
        let average_us = state.latency_total_us as f64 / state.samples.max(1) as f64;
        let target_us = self.config.target_latency.as_micros().max(1) as f64;
        let old_rate = state.bucket.rate;

        let new_rate = if average_us > target_us {
            let err = (average_us - target_us) / target_us;
            old_rate / (1.0 + err)
        } else if state.rejected_in_period > 0 {
            old_rate * (1.0 + INCREASE_FACTOR)
        } else {
            old_rate
        };

        // Credit tokens earned at the old rate before switching
        state.bucket.refill(now);
        state.bucket.rate = clamp_rate(&self.config, new_rate);
        if state.bucket.rate != old_rate {
            info!(
                "Store write rate adjusted from {:.2} to {:.2}/s (average latency {:.0}us, target {:.0}us)",
                old_rate, state.bucket.rate, average_us, target_us
            );
        } else {
            debug!("Store write rate unchanged at {:.2}/s", old_rate);
        }

        state.samples = 0;
        state.latency_total_us = 0;
        state.rejected_in_period = 0;
        state.period_start = now;
    }

    /// Current refill rate in tokens per second
    pub fn current_rate(&self) -> f64 {
        self.state.lock().bucket.rate
    }

    /// Writes admitted but not yet reported complete
    pub fn pending(&self) -> u32 {
        self.state.lock().pending
    }

    pub fn config(&self) -> &LoadMonitorConfig {
        &self.config
    }
}

fn clamp_rate(config: &LoadMonitorConfig, rate: f64) -> f64 {
    let mut rate = rate.max(config.min_token_rate as f64);
    if config.max_token_rate > 0.0 {
        rate = rate.min(config.max_token_rate as f64);
    }
    rate
}
