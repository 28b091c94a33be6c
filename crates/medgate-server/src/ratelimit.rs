//! Fixed-window admission control keyed by client address.
//!
//! Each client owns one window: the first request opens it with `count = 1`,
//! later requests inside the window increment the counter and are rejected
//! once it exceeds `max_requests`. A request arriving after the window has
//! elapsed resets the entry instead of sliding it.
//!
//! Entries live in a [`DashMap`], so the read-increment-write for one key runs
//! under that key's shard lock. Expired windows are removed by
//! [`FixedWindowLimiter::sweep_expired`], which [`spawn_sweeper`] runs on an
//! interval; memory therefore tracks active clients only.
//!
//! [`spawn_sweeper`]: FixedWindowLimiter::spawn_sweeper

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted; `count` is the client's position in the current window.
    Admitted { count: u32 },
    /// Limit exceeded; the window rolls over after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

pub struct FixedWindowLimiter {
    windows: DashMap<String, RateWindow>,
    max_requests: u32,
    window: Duration,
}

impl FixedWindowLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    /// Checks and records one request for `key` at the current instant.
    pub fn check(&self, key: &str) -> Admission {
        self.check_at(key, Instant::now())
    }

    /// Checks and records one request for `key` observed at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Admission {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(RateWindow {
                window_start: now,
                count: 0,
            });

        if entry.count == 0 || now.saturating_duration_since(entry.window_start) > self.window {
            entry.window_start = now;
            entry.count = 1;
            return Admission::Admitted { count: 1 };
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.max_requests {
            let rolls_over_at = entry.window_start + self.window;
            Admission::Rejected {
                retry_after: rolls_over_at.saturating_duration_since(now),
            }
        } else {
            Admission::Admitted { count: entry.count }
        }
    }

    /// Drops every window that has already elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.window_start) <= self.window);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "Swept expired rate limit windows");
        }
        removed
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Runs [`sweep_expired`](Self::sweep_expired) every `interval`. The task
    /// holds a weak reference and exits once the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(limiter) => {
                        limiter.sweep_expired();
                    }
                    None => break,
                }
            }
        })
    }
}
