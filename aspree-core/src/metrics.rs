//! Request counters, rolling latency, cache stats, process vitals.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::cache::Cache;

/// API requests slower than this count as slow.
pub const SLOW_THRESHOLD: Duration = Duration::from_millis(200);
/// Rolling latency window size.
const LATENCY_SAMPLES: usize = 100;

pub struct MetricsCollector {
    started_at: Instant,
    total: AtomicU64,
    success: AtomicU64,
    failed: AtomicU64,
    slow: AtomicU64,
    latencies_ms: Mutex<VecDeque<f64>>,
}

/// A point-in-time metrics report.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub slow_requests: u64,
    pub average_latency_ms: f64,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
    pub uptime_secs: u64,
    pub rss_bytes: Option<u64>,
}

impl MetricsCollector {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total: AtomicU64::new(0),
            success: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            slow: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(
                LATENCY_SAMPLES,
            )),
        }
    }

    pub fn record_request(&self, success: bool, elapsed: Duration) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if elapsed > SLOW_THRESHOLD {
            self.slow.fetch_add(1, Ordering::Relaxed);
        }

        let mut latencies = self.latencies_ms.lock().unwrap();
        if latencies.len() == LATENCY_SAMPLES {
            latencies.pop_front();
        }
        latencies.push_back(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn snapshot(&self, cache: &Cache) -> MetricsSnapshot {
        let latencies = self.latencies_ms.lock().unwrap();
        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<f64>() / latencies.len() as f64
        };
        drop(latencies);

        MetricsSnapshot {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.success.load(Ordering::Relaxed),
            failed_requests: self.failed.load(Ordering::Relaxed),
            slow_requests: self.slow.load(Ordering::Relaxed),
            average_latency_ms,
            cache_hit_rate: cache.hit_rate(),
            cache_entries: cache.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            rss_bytes: read_rss_bytes(),
        }
    }
}

/// Resident set size from procfs; best-effort, absent off Linux.
fn read_rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // Page size is 4 KiB on every platform this runs on in practice.
    Some(rss_pages * 4096)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_and_window() {
        let metrics = MetricsCollector::new();
        let cache = Cache::new();

        metrics.record_request(true, Duration::from_millis(10));
        metrics.record_request(false, Duration::from_millis(500));
        metrics.record_request(true, Duration::from_millis(100));

        let snap = metrics.snapshot(&cache);
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.slow_requests, 1);
        assert!(snap.average_latency_ms > 0.0);
    }

    #[test]
    fn latency_window_is_bounded() {
        let metrics = MetricsCollector::new();
        for _ in 0..(LATENCY_SAMPLES + 50) {
            metrics.record_request(true, Duration::from_millis(1));
        }
        assert_eq!(
            metrics.latencies_ms.lock().unwrap().len(),
            LATENCY_SAMPLES
        );
    }
}
