//! Request rate limiting
//!
//! An explicit component with injected, swappable storage: the in-process
//! map below for single-instance deployments, an external shared store for
//! multi-instance ones. Never module-level state.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::{EngineError, Result};

/// Storage behind the rate limiter.
pub trait RateLimitStore: Send + Sync {
    /// Record a hit for `key` at `now` and return how many hits fall
    /// within the window ending at `now`, the new one included.
    fn record(&self, key: &str, now: Instant, window: Duration) -> usize;
}

/// Sliding-window hit log held in process
pub struct InMemoryRateLimitStore {
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn record(&self, key: &str, now: Instant, window: Duration) -> usize {
        let mut hits = self.hits.lock().unwrap();
        let entry = hits.entry(key.to_string()).or_default();

        let cutoff = now.checked_sub(window);
        while let Some(front) = entry.front() {
            match cutoff {
                Some(cutoff) if *front <= cutoff => {
                    entry.pop_front();
                }
                _ => break,
            }
        }

        entry.push_back(now);
        entry.len()
    }
}

/// Per-key request limiter
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    store: Box<dyn RateLimitStore>,
}

impl RateLimiter {
    /// Create a limiter over the in-process store
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_store(config, Box::new(InMemoryRateLimitStore::new()))
    }

    /// Create a limiter over caller-provided storage
    pub fn with_store(config: &RateLimitConfig, store: Box<dyn RateLimitStore>) -> Self {
        Self {
            max_requests: config.max_requests,
            window: config.window,
            store,
        }
    }

    /// Record one request for `key` and reject it when the key has
    /// exceeded its budget for the current window.
    ///
    /// # Errors
    ///
    /// `RateLimited` when the key is over budget.
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        let count = self.store.record(key, now, self.window);
        if count > self.max_requests {
            tracing::debug!(key, count, "rate limit exceeded");
            return Err(EngineError::RateLimited(format!(
                "more than {} requests in {:?}",
                self.max_requests, self.window
            )));
        }
        Ok(())
    }
}
