//! Cross-messenger metric aggregation and coarse resource sampling.

use serde::Serialize;

/// Metrics aggregated across every registered messenger plus coarse
/// system resource usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub messenger_count: usize,
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
    pub total_errors: u64,

    /// Arithmetic mean of per-messenger latency averages.
    pub average_latency_ms: f64,
    pub average_compression_ratio: f64,
    pub average_batch_efficiency: f64,

    /// `total_errors / total_messages * 100`.
    pub error_rate_pct: f64,
    /// Total messages divided by seconds since the dashboard started.
    pub throughput_per_sec: f64,

    /// Resident memory as a fraction of system memory, `[0, 1]`.
    pub memory_usage_ratio: f64,
    /// Coarse CPU utilization estimate, `[0, 100]`.
    pub cpu_estimate_pct: f64,
}

impl AggregatedMetrics {
    pub fn total_messages(&self) -> u64 {
        self.total_messages_sent + self.total_messages_received
    }
}

/// One coarse sample of process/system resource usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub memory_ratio: f64,
    pub cpu_estimate_pct: f64,
}

impl ResourceUsage {
    /// Sample resident-set size against total system memory and estimate
    /// CPU from load average. Reports zeros where the proc filesystem is
    /// unavailable.
    pub fn sample() -> Self {
        Self {
            memory_ratio: memory_ratio().unwrap_or(0.0),
            cpu_estimate_pct: cpu_estimate_pct().unwrap_or(0.0),
        }
    }
}

#[cfg(target_os = "linux")]
fn memory_ratio() -> Option<f64> {
    let rss_kb = read_proc_kb("/proc/self/status", "VmRSS:")?;
    let total_kb = read_proc_kb("/proc/meminfo", "MemTotal:")?;
    if total_kb == 0 {
        return None;
    }
    Some(rss_kb as f64 / total_kb as f64)
}

#[cfg(target_os = "linux")]
fn cpu_estimate_pct() -> Option<f64> {
    let loadavg = std::fs::read_to_string("/proc/loadavg").ok()?;
    let one_minute: f64 = loadavg.split_whitespace().next()?.parse().ok()?;
    let cores = std::thread::available_parallelism().map(usize::from).unwrap_or(1);
    Some((one_minute / cores as f64 * 100.0).min(100.0))
}

#[cfg(target_os = "linux")]
fn read_proc_kb(path: &str, key: &str) -> Option<u64> {
    let contents = std::fs::read_to_string(path).ok()?;
    let line = contents.lines().find(|line| line.starts_with(key))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn memory_ratio() -> Option<f64> {
    None
}

#[cfg(not(target_os = "linux"))]
fn cpu_estimate_pct() -> Option<f64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_messages() {
        let metrics = AggregatedMetrics {
            total_messages_sent: 7,
            total_messages_received: 5,
            ..AggregatedMetrics::default()
        };
        assert_eq!(metrics.total_messages(), 12);
    }

    #[test]
    fn test_sample_is_bounded() {
        let usage = ResourceUsage::sample();
        assert!(usage.memory_ratio >= 0.0 && usage.memory_ratio <= 1.0);
        assert!(usage.cpu_estimate_pct >= 0.0 && usage.cpu_estimate_pct <= 100.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_memory_sample_is_nonzero() {
        // Any running process has resident memory.
        assert!(memory_ratio().unwrap() > 0.0);
    }
}
