//! # Bridge Metrics
//!
//! Counters for request outcomes and a latency histogram covering the whole
//! connection lifetime (read, store call, response write).
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Use atomic counters to aggregate events cheaply.
//! 2. **Fixed Buckets**: Keep histogram buckets in a contiguous array.
//! 3. **Snapshot Reads**: Expose plain structs so the binary can log a summary
//!    at shutdown without holding any lock.
//!
//! ## Notes
//! - Bucket boundaries are in milliseconds because every request crosses the
//!   store boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency bucket boundaries in milliseconds.
pub const DEFAULT_LATENCY_BUCKETS_MS: [u64; 10] = [1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000];

/// Snapshot of all server metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Connections that reached the handler.
    pub connections_total: u64,
    /// Documents stored by write requests.
    pub documents_inserted: u64,
    /// Documents streamed by read requests.
    pub documents_streamed: u64,
    /// Completed read requests, including empty ones.
    pub scans_total: u64,
    /// Requests answered with a 4xx status.
    pub client_errors: u64,
    /// Requests answered with a 5xx status or cut short mid-stream.
    pub server_errors: u64,
    /// Connections currently being handled.
    pub inflight: u64,
    /// Latency histogram snapshot.
    pub latency: LatencySnapshot,
}

/// Snapshot of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Bucket boundaries in milliseconds.
    pub bounds_ms: Vec<u64>,
    /// Bucket counts, including the overflow bucket at the end.
    pub buckets: Vec<u64>,
    /// Total number of samples.
    pub samples: u64,
    /// Sum of latencies in microseconds.
    pub sum_us: u64,
}

impl LatencySnapshot {
    /// Mean latency, or zero when nothing was recorded.
    pub fn mean(&self) -> Duration {
        if self.samples == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.sum_us / self.samples)
    }

    /// Non-empty buckets as `le_<bound>ms=<count>`, with `gt_<last>ms` for
    /// the overflow bucket. Empty when nothing was recorded.
    pub fn bucket_summary(&self) -> String {
        let mut parts = Vec::new();
        for (idx, &count) in self.buckets.iter().enumerate() {
            if count == 0 {
                continue;
            }
            match self.bounds_ms.get(idx) {
                Some(bound) => parts.push(format!("le_{bound}ms={count}")),
                None => {
                    let last = self.bounds_ms.last().copied().unwrap_or(0);
                    parts.push(format!("gt_{last}ms={count}"));
                }
            }
        }
        parts.join(" ")
    }
}

/// Thread-safe metrics aggregator shared by connection tasks.
///
/// `Ordering::Relaxed` is enough: fields are independent counters.
#[derive(Debug)]
pub struct Metrics {
    connections_total: AtomicU64,
    documents_inserted: AtomicU64,
    documents_streamed: AtomicU64,
    scans_total: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    inflight: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new metrics aggregator with the default latency buckets.
    pub fn new() -> Self {
        Metrics {
            connections_total: AtomicU64::new(0),
            documents_inserted: AtomicU64::new(0),
            documents_streamed: AtomicU64::new(0),
            scans_total: AtomicU64::new(0),
            client_errors: AtomicU64::new(0),
            server_errors: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            latency: LatencyHistogram::new(DEFAULT_LATENCY_BUCKETS_MS.to_vec()),
        }
    }

    /// Records that a connection was handed to the handler.
    pub fn record_connection_start(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that a connection was closed after `latency`.
    pub fn record_connection_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    /// Records a stored document.
    pub fn record_insert(&self) {
        self.documents_inserted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a finished scan that streamed `documents` lines.
    pub fn record_scan(&self, documents: usize) {
        self.scans_total.fetch_add(1, Ordering::Relaxed);
        self.documents_streamed.fetch_add(documents as u64, Ordering::Relaxed);
    }

    /// Records a 4xx response.
    pub fn record_client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a 5xx response or a truncated stream.
    pub fn record_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a snapshot of all counters and histogram buckets.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            documents_inserted: self.documents_inserted.load(Ordering::Relaxed),
            documents_streamed: self.documents_streamed.load(Ordering::Relaxed),
            scans_total: self.scans_total.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }
}

/// Fixed-bucket latency histogram.
#[derive(Debug)]
pub struct LatencyHistogram {
    bounds_ms: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Creates a histogram with ascending bucket boundaries (milliseconds).
    pub fn new(bounds_ms: Vec<u64>) -> Self {
        let buckets = (0..=bounds_ms.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_ms,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    /// Records a latency measurement into the histogram.
    pub fn record(&self, latency: Duration) {
        let millis = latency.as_millis() as u64;
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(latency.as_micros() as u64, Ordering::Relaxed);

        let bucket_idx = self
            .bounds_ms
            .iter()
            .position(|&bound| millis <= bound)
            .unwrap_or(self.bounds_ms.len());
        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the histogram.
    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_ms: self.bounds_ms.clone(),
            buckets: self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}
