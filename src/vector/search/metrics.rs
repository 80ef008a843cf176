//! Per-index search counters and latency figures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Point-in-time copy of an index's search metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMetrics {
    /// Searches attempted, whatever their outcome.
    pub total_searches: u64,
    /// Searches stopped by a cancellation token or deadline.
    pub cancelled_searches: u64,
    /// Searches rejected for any other reason, such as a malformed query.
    pub failed_searches: u64,
    /// Results handed back by successful searches.
    pub total_hits_returned: u64,
    pub total_latency_us: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
}

/// Lock-free collector shared by every search on one index.
#[derive(Debug, Default)]
pub struct SearchMetricsCollector {
    total_searches: AtomicU64,
    cancelled_searches: AtomicU64,
    failed_searches: AtomicU64,
    total_hits_returned: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
}

impl SearchMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished search and its outcome.
    pub fn record<T>(&self, elapsed: Duration, outcome: &Result<Vec<T>>) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(hits) => {
                self.total_hits_returned
                    .fetch_add(hits.len() as u64, Ordering::Relaxed);
            }
            Err(e) if e.is_cancelled() => {
                self.cancelled_searches.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failed_searches.fetch_add(1, Ordering::Relaxed);
            }
        }

        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SearchMetrics {
        let total_searches = self.total_searches.load(Ordering::Relaxed);
        let total_latency_us = self.total_latency_us.load(Ordering::Relaxed);

        SearchMetrics {
            total_searches,
            cancelled_searches: self.cancelled_searches.load(Ordering::Relaxed),
            failed_searches: self.failed_searches.load(Ordering::Relaxed),
            total_hits_returned: self.total_hits_returned.load(Ordering::Relaxed),
            total_latency_us,
            avg_latency_us: total_latency_us.checked_div(total_searches).unwrap_or(0),
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.total_searches.store(0, Ordering::Relaxed);
        self.cancelled_searches.store(0, Ordering::Relaxed);
        self.failed_searches.store(0, Ordering::Relaxed);
        self.total_hits_returned.store(0, Ordering::Relaxed);
        self.total_latency_us.store(0, Ordering::Relaxed);
        self.max_latency_us.store(0, Ordering::Relaxed);
    }
}
