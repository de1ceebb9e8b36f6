use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 12;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => self.buckets[idx].fetch_add(1, Ordering::Relaxed),
            None => self.overflow.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Route family a request is timed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteFamily {
    /// Bet creation, edits, picks, locks and resolutions.
    Write,
    /// Bet, feed, explore and stake reads.
    Read,
    /// Proof uploads.
    Proof,
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub write: LatencySnapshot,
    pub read: LatencySnapshot,
    pub proof: LatencySnapshot,
    pub reject_origin: u64,
    pub reject_body_limit: u64,
    pub reject_rate_limit: u64,
    pub reject_unauthenticated: u64,
}

#[derive(Default)]
pub struct HttpMetrics {
    write: LatencyMetrics,
    read: LatencyMetrics,
    proof: LatencyMetrics,
    reject_origin: AtomicU64,
    reject_body_limit: AtomicU64,
    reject_rate_limit: AtomicU64,
    reject_unauthenticated: AtomicU64,
}

impl HttpMetrics {
    pub fn record(&self, family: RouteFamily, duration: Duration) {
        match family {
            RouteFamily::Write => self.write.record(duration),
            RouteFamily::Read => self.read.record(duration),
            RouteFamily::Proof => self.proof.record(duration),
        }
    }

    pub fn inc_reject_origin(&self) {
        self.reject_origin.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_body_limit(&self) {
        self.reject_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_rate_limit(&self) {
        self.reject_rate_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_unauthenticated(&self) {
        self.reject_unauthenticated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            write: self.write.snapshot(),
            read: self.read.snapshot(),
            proof: self.proof.snapshot(),
            reject_origin: self.reject_origin.load(Ordering::Relaxed),
            reject_body_limit: self.reject_body_limit.load(Ordering::Relaxed),
            reject_rate_limit: self.reject_rate_limit.load(Ordering::Relaxed),
            reject_unauthenticated: self.reject_unauthenticated.load(Ordering::Relaxed),
        }
    }
}
