//! Alert rules, alert instances, and the notification seam.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::metrics::AggregatedMetrics;

/// Severity attached to a rule and its alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// A standing predicate over aggregated metrics.
#[derive(Clone)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub severity: AlertSeverity,
    pub message: String,
    /// Minimum time between successive alerts from this rule.
    pub cooldown: Duration,
    pub condition: Arc<dyn Fn(&AggregatedMetrics) -> bool + Send + Sync>,
}

impl std::fmt::Debug for AlertRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertRule")
            .field("id", &self.id)
            .field("severity", &self.severity)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}

impl AlertRule {
    pub fn new<F>(
        id: impl Into<String>,
        name: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
        cooldown_minutes: u64,
        condition: F,
    ) -> Self
    where
        F: Fn(&AggregatedMetrics) -> bool + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            severity,
            message: message.into(),
            cooldown: Duration::from_secs(cooldown_minutes * 60),
            condition: Arc::new(condition),
        }
    }
}

/// A triggered instance of a rule. Append-only once created; only the
/// `resolved`/`acknowledged` fields mutate afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
    pub metrics: AggregatedMetrics,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }
}

/// Abstract notification sink: email, chat, pager. Out of scope here
/// beyond the seam itself.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Default sink: emits alerts on the tracing bus.
#[derive(Debug, Default)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Critical => {
                error!(rule = %alert.rule_id, message = %alert.message, "alert triggered")
            }
            _ => warn!(rule = %alert.rule_id, severity = ?alert.severity,
                message = %alert.message, "alert triggered"),
        }
    }
}

/// The standing rule set every dashboard starts with.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new(
            "high-latency",
            "High message latency",
            AlertSeverity::High,
            "Average message latency above 100ms",
            5,
            |m| m.average_latency_ms > 100.0,
        ),
        AlertRule::new(
            "high-error-rate",
            "High error rate",
            AlertSeverity::High,
            "Message error rate above 1%",
            10,
            |m| m.error_rate_pct > 1.0,
        ),
        AlertRule::new(
            "low-throughput",
            "Low message throughput",
            AlertSeverity::Medium,
            "Throughput below 50 messages per second",
            15,
            |m| m.total_messages() > 0 && m.throughput_per_sec < 50.0,
        ),
        AlertRule::new(
            "high-memory",
            "High memory usage",
            AlertSeverity::Critical,
            "Memory usage above 80% of system memory",
            2,
            |m| m.memory_usage_ratio > 0.8,
        ),
        AlertRule::new(
            "inefficient-compression",
            "Inefficient compression",
            AlertSeverity::Low,
            "Compression ratio above 2.0",
            30,
            |m| m.average_compression_ratio > 2.0,
        ),
    ]
}
