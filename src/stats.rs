//! Conversion statistics collection.
//!
//! The coordinator reports every finished conversion to a [`StatsSink`]
//! injected at construction time, so stats collection stays decoupled
//! from conversion logic and tests can substitute their own sink. The
//! production sink is [`MetricsCollector`], which aggregates with atomic
//! counters and serves the `/stats` endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;

/// How many finished conversions the collector remembers individually.
const RECENT_CAPACITY: usize = 100;

/// One finished conversion, success or failure.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionRecord {
    /// Original filename as uploaded.
    pub filename: String,
    /// Detected file extension, e.g. `"pdf"`.
    pub extension: String,
    /// Input size in bytes.
    pub size_bytes: u64,
    /// Wall-clock conversion time in milliseconds.
    pub duration_ms: u64,
    /// Whether the conversion produced markdown.
    pub success: bool,
    /// Error category for failures, e.g. `"conversion_timeout"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// When the conversion finished (ISO 8601).
    pub finished_at: String,
}

/// Receiver for conversion outcomes.
///
/// Implementations must be cheap and non-blocking; the coordinator calls
/// [`record`](Self::record) on the request path, exactly once per
/// conversion attempt that reaches the pipeline.
pub trait StatsSink: Send + Sync {
    fn record(&self, record: ConversionRecord);
}

/// Sink that discards everything. Useful for tests and the one-shot CLI.
#[derive(Debug, Default)]
pub struct NullSink;

impl StatsSink for NullSink {
    fn record(&self, _record: ConversionRecord) {}
}

/// Per-format counters.
#[derive(Debug, Clone, Serialize)]
pub struct FormatStats {
    pub count: u64,
    pub failures: u64,
}

/// Aggregate statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Service version.
    pub version: String,
    /// Seconds since the collector was created.
    pub uptime_seconds: u64,
    /// Collector creation time (ISO 8601).
    pub started_at: String,
    /// Total conversions attempted.
    pub total_conversions: u64,
    /// Conversions that produced markdown.
    pub successful_conversions: u64,
    /// Conversions that failed for any reason.
    pub failed_conversions: u64,
    /// Mean conversion time in milliseconds over successes.
    pub avg_duration_ms: f64,
    /// Total input bytes accepted for conversion.
    pub total_bytes_processed: u64,
    /// Counts broken down by detected extension.
    pub by_format: std::collections::BTreeMap<String, FormatStats>,
    /// Most recent conversions, newest last.
    pub recent: Vec<ConversionRecord>,
}

/// Thread-safe stats aggregator backing the `/stats` endpoint.
pub struct MetricsCollector {
    started_at: Instant,
    started_at_str: String,
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    total_duration_ms: AtomicU64,
    total_bytes: AtomicU64,
    by_format: DashMap<String, (u64, u64)>,
    recent: Mutex<VecDeque<ConversionRecord>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            started_at_str: chrono::Utc::now().to_rfc3339(),
            total: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            by_format: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_CAPACITY)),
        }
    }

    /// Seconds since the collector was created.
    pub fn uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let total_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let avg = if succeeded > 0 {
            total_ms as f64 / succeeded as f64
        } else {
            0.0
        };

        let by_format = self
            .by_format
            .iter()
            .map(|entry| {
                let (count, failures) = *entry.value();
                (entry.key().clone(), FormatStats { count, failures })
            })
            .collect();

        let recent = self
            .recent
            .lock()
            .expect("recent conversions lock poisoned")
            .iter()
            .cloned()
            .collect();

        StatsSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime(),
            started_at: self.started_at_str.clone(),
            total_conversions: self.total.load(Ordering::Relaxed),
            successful_conversions: succeeded,
            failed_conversions: self.failed.load(Ordering::Relaxed),
            avg_duration_ms: avg,
            total_bytes_processed: self.total_bytes.load(Ordering::Relaxed),
            by_format,
            recent,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSink for MetricsCollector {
    fn record(&self, record: ConversionRecord) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if record.success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
            self.total_duration_ms
                .fetch_add(record.duration_ms, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_bytes.fetch_add(record.size_bytes, Ordering::Relaxed);

        {
            let mut entry = self.by_format.entry(record.extension.clone()).or_insert((0, 0));
            entry.0 += 1;
            if !record.success {
                entry.1 += 1;
            }
        }

        let mut recent = self.recent.lock().expect("recent conversions lock poisoned");
        if recent.len() == RECENT_CAPACITY {
            recent.pop_front();
        }
        recent.push_back(record);
    }
}
