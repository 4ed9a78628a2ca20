//! Per-messenger metric counters and the dashboard pull seam.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

/// Smoothing factor for the latency moving average.
pub const EMA_ALPHA: f64 = 0.1;

/// Error count above which a messenger reports unhealthy.
pub const UNHEALTHY_ERROR_THRESHOLD: u64 = 10;

/// Average latency above which a messenger reports degraded.
pub const DEGRADED_LATENCY_MS: f64 = 100.0;

/// Point-in-time metric snapshot for one messenger.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessengerMetrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub average_latency_ms: f64,
    pub errors: u64,
    /// Ratio achieved by the most recent compressed or batched send.
    pub compression_ratio: f64,
    /// Average number of messages per flushed batch.
    pub batch_efficiency: f64,
}

/// Coarse health classification derived from a metric snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
}

impl MessengerMetrics {
    /// Fixed-threshold health classification.
    pub fn health(&self) -> HealthReport {
        if self.errors > UNHEALTHY_ERROR_THRESHOLD {
            HealthReport {
                status: HealthStatus::Unhealthy,
                message: format!("{} errors recorded", self.errors),
            }
        } else if self.average_latency_ms > DEGRADED_LATENCY_MS {
            HealthReport {
                status: HealthStatus::Degraded,
                message: format!("average latency {:.1}ms", self.average_latency_ms),
            }
        } else {
            HealthReport {
                status: HealthStatus::Healthy,
                message: "operating normally".to_string(),
            }
        }
    }
}

/// Thread-safe counters shared between the messenger and its batch
/// manager. Snapshots never mutate state.
#[derive(Debug, Default)]
pub struct MessengerCounters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    batched_messages: AtomicU64,
    batches_flushed: AtomicU64,
    latency_ema_ms: Mutex<Option<f64>>,
    compression_ratio: Mutex<f64>,
}

impl MessengerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    fn update_ema(&self, sample_ms: f64) {
        let mut ema = self.latency_ema_ms.lock();
        *ema = Some(match *ema {
            None => sample_ms,
            Some(avg) => EMA_ALPHA * sample_ms + (1.0 - EMA_ALPHA) * avg,
        });
    }

    pub fn record_sent(&self, latency_ms: f64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.update_ema(latency_ms);
    }

    /// Record `count` messages sent in one operation with a single
    /// latency sample (the explicit batch path).
    pub fn record_sent_many(&self, count: u64, latency_ms: f64) {
        self.messages_sent.fetch_add(count, Ordering::Relaxed);
        self.update_ema(latency_ms);
    }

    pub fn record_received(&self, latency_ms: f64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.update_ema(latency_ms);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compression_ratio(&self, ratio: f64) {
        *self.compression_ratio.lock() = ratio;
    }

    pub fn record_batch_flush(&self, message_count: u64, ratio: f64) {
        self.batched_messages
            .fetch_add(message_count, Ordering::Relaxed);
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.record_compression_ratio(ratio);
    }

    pub fn snapshot(&self) -> MessengerMetrics {
        let batches = self.batches_flushed.load(Ordering::Relaxed);
        let batch_efficiency = if batches > 0 {
            self.batched_messages.load(Ordering::Relaxed) as f64 / batches as f64
        } else {
            0.0
        };

        MessengerMetrics {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            average_latency_ms: self.latency_ema_ms.lock().unwrap_or(0.0),
            errors: self.errors.load(Ordering::Relaxed),
            compression_ratio: *self.compression_ratio.lock(),
            batch_efficiency,
        }
    }
}

/// Pull seam for the performance dashboard: a registered source exposes a
/// domain name and a metric snapshot, nothing more. The dashboard never
/// controls messenger lifecycle through this trait.
pub trait MetricsSource: Send + Sync {
    fn domain(&self) -> &str;
    fn metrics(&self) -> MessengerMetrics;
}
