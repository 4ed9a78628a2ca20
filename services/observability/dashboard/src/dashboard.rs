//! The dashboard itself: registry, aggregation, alert engine, reports.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use strand_messaging::MetricsSource;
use uuid::Uuid;

use crate::alerts::{default_rules, Alert, AlertRule, AlertSeverity, AlertSink, TracingAlertSink};
use crate::metrics::{AggregatedMetrics, ResourceUsage};

/// Overall dashboard status derived from active alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardStatus {
    Healthy,
    Warning,
    Critical,
}

/// Full report: current metrics plus the active alert set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardReport {
    pub generated_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub status: DashboardStatus,
    pub metrics: AggregatedMetrics,
    pub domains: Vec<String>,
    pub active_alerts: Vec<Alert>,
}

impl DashboardReport {
    /// JSON document for status endpoints and log shipping.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Compact summary for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub status: DashboardStatus,
    pub messenger_count: usize,
    pub active_alert_count: usize,
    pub critical_alert_count: usize,
    pub total_messages: u64,
    pub error_rate_pct: f64,
    pub throughput_per_sec: f64,
}

/// Aggregates messenger metrics and runs the alert engine.
///
/// Registered messengers are held by domain name purely for metric pull;
/// registering a second source under the same domain replaces the first.
pub struct PerformanceDashboard {
    started_at: Instant,
    sources: RwLock<HashMap<String, Arc<dyn MetricsSource>>>,
    rules: RwLock<Vec<AlertRule>>,
    last_triggered: Mutex<HashMap<String, Instant>>,
    alerts: RwLock<Vec<Alert>>,
    current: RwLock<AggregatedMetrics>,
    sink: Arc<dyn AlertSink>,
}

impl Default for PerformanceDashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceDashboard {
    /// Dashboard with the default rule set and tracing notification sink.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingAlertSink))
    }

    pub fn with_sink(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            started_at: Instant::now(),
            sources: RwLock::new(HashMap::new()),
            rules: RwLock::new(default_rules()),
            last_triggered: Mutex::new(HashMap::new()),
            alerts: RwLock::new(Vec::new()),
            current: RwLock::new(AggregatedMetrics::default()),
            sink,
        }
    }

    /// Register a messenger under its domain name. Last registration for a
    /// given name wins.
    pub fn register_messenger(&self, source: Arc<dyn MetricsSource>) {
        self.sources
            .write()
            .insert(source.domain().to_string(), source);
    }

    /// Add a rule to the standing set.
    pub fn add_rule(&self, rule: AlertRule) {
        self.rules.write().push(rule);
    }

    /// Pull every registered messenger, aggregate, then evaluate alert
    /// rules. The owning process calls this periodically.
    pub fn update_metrics(&self) -> AggregatedMetrics {
        let snapshots: Vec<_> = {
            let sources = self.sources.read();
            sources.values().map(|source| source.metrics()).collect()
        };

        let count = snapshots.len();
        let mut aggregated = AggregatedMetrics {
            messenger_count: count,
            ..AggregatedMetrics::default()
        };

        for snapshot in &snapshots {
            aggregated.total_messages_sent += snapshot.messages_sent;
            aggregated.total_messages_received += snapshot.messages_received;
            aggregated.total_errors += snapshot.errors;
            aggregated.average_latency_ms += snapshot.average_latency_ms;
            aggregated.average_compression_ratio += snapshot.compression_ratio;
            aggregated.average_batch_efficiency += snapshot.batch_efficiency;
        }
        if count > 0 {
            let count = count as f64;
            aggregated.average_latency_ms /= count;
            aggregated.average_compression_ratio /= count;
            aggregated.average_batch_efficiency /= count;
        }

        let total = aggregated.total_messages();
        if total > 0 {
            aggregated.error_rate_pct = aggregated.total_errors as f64 / total as f64 * 100.0;
        }
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            aggregated.throughput_per_sec = total as f64 / elapsed;
        }

        let resources = ResourceUsage::sample();
        aggregated.memory_usage_ratio = resources.memory_ratio;
        aggregated.cpu_estimate_pct = resources.cpu_estimate_pct;

        *self.current.write() = aggregated.clone();
        self.evaluate_rules_at(Instant::now());
        aggregated
    }

    /// Evaluate every rule against the current metrics, honoring per-rule
    /// cooldowns relative to `now`. Split from [`Self::update_metrics`] so
    /// cooldown behavior is testable without waiting wall-clock minutes.
    pub(crate) fn evaluate_rules_at(&self, now: Instant) {
        let metrics = self.current.read().clone();
        let rules = self.rules.read().clone();

        for rule in &rules {
            if !(rule.condition)(&metrics) {
                continue;
            }

            {
                let last_triggered = self.last_triggered.lock();
                if let Some(last) = last_triggered.get(&rule.id) {
                    if now.duration_since(*last) < rule.cooldown {
                        continue;
                    }
                }
            }

            let alert = Alert {
                id: Uuid::new_v4().to_string(),
                rule_id: rule.id.clone(),
                timestamp: Utc::now(),
                severity: rule.severity,
                message: rule.message.clone(),
                metrics: metrics.clone(),
                resolved: false,
                resolved_at: None,
                acknowledged: false,
                acknowledged_by: None,
                acknowledged_at: None,
            };

            self.last_triggered.lock().insert(rule.id.clone(), now);
            self.sink.notify(&alert);
            self.alerts.write().push(alert);
        }
    }

    /// Acknowledge an active alert. Returns false if the alert is unknown,
    /// already acknowledged, or already resolved.
    pub fn acknowledge_alert(&self, alert_id: &str, by: &str) -> bool {
        let mut alerts = self.alerts.write();
        let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) else {
            return false;
        };
        if alert.acknowledged || alert.resolved {
            return false;
        }
        alert.acknowledged = true;
        alert.acknowledged_by = Some(by.to_string());
        alert.acknowledged_at = Some(Utc::now());
        true
    }

    /// Resolve an alert. Returns false if unknown or already resolved.
    pub fn resolve_alert(&self, alert_id: &str) -> bool {
        let mut alerts = self.alerts.write();
        let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) else {
            return false;
        };
        if alert.resolved {
            return false;
        }
        alert.resolved = true;
        alert.resolved_at = Some(Utc::now());
        true
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|alert| alert.is_active())
            .cloned()
            .collect()
    }

    pub fn alert_history(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    fn status(&self) -> DashboardStatus {
        let alerts = self.alerts.read();
        let mut status = DashboardStatus::Healthy;
        for alert in alerts.iter().filter(|alert| alert.is_active()) {
            match alert.severity {
                AlertSeverity::Critical => return DashboardStatus::Critical,
                AlertSeverity::High => status = DashboardStatus::Warning,
                _ => {}
            }
        }
        status
    }

    /// Read-only full report from current state.
    pub fn generate_report(&self) -> DashboardReport {
        let mut domains: Vec<String> = self.sources.read().keys().cloned().collect();
        domains.sort();

        DashboardReport {
            generated_at: Utc::now(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            status: self.status(),
            metrics: self.current.read().clone(),
            domains,
            active_alerts: self.active_alerts(),
        }
    }

    /// Read-only compact summary from current state.
    pub fn summary(&self) -> DashboardSummary {
        let metrics = self.current.read().clone();
        let alerts = self.alerts.read();
        let active = alerts.iter().filter(|a| a.is_active());

        DashboardSummary {
            status: self.status(),
            messenger_count: self.sources.read().len(),
            active_alert_count: active.clone().count(),
            critical_alert_count: active
                .filter(|a| a.severity == AlertSeverity::Critical)
                .count(),
            total_messages: metrics.total_messages(),
            error_rate_pct: metrics.error_rate_pct,
            throughput_per_sec: metrics.throughput_per_sec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::time::Duration;
    use strand_messaging::MessengerMetrics;

    /// Fixed-snapshot metrics source.
    struct StubSource {
        domain: String,
        metrics: PlMutex<MessengerMetrics>,
    }

    impl StubSource {
        fn new(domain: &str, metrics: MessengerMetrics) -> Arc<Self> {
            Arc::new(Self {
                domain: domain.to_string(),
                metrics: PlMutex::new(metrics),
            })
        }

        fn set(&self, metrics: MessengerMetrics) {
            *self.metrics.lock() = metrics;
        }
    }

    impl MetricsSource for StubSource {
        fn domain(&self) -> &str {
            &self.domain
        }

        fn metrics(&self) -> MessengerMetrics {
            self.metrics.lock().clone()
        }
    }

    /// Sink that records notified alert ids.
    #[derive(Default)]
    struct RecordingSink {
        notified: PlMutex<Vec<String>>,
    }

    impl AlertSink for RecordingSink {
        fn notify(&self, alert: &Alert) {
            self.notified.lock().push(alert.rule_id.clone());
        }
    }

    fn calm_metrics() -> MessengerMetrics {
        MessengerMetrics {
            messages_sent: 500,
            messages_received: 500,
            average_latency_ms: 10.0,
            errors: 0,
            compression_ratio: 1.1,
            batch_efficiency: 5.0,
        }
    }

    #[test]
    fn test_registration_last_wins() {
        let dashboard = PerformanceDashboard::new();
        dashboard.register_messenger(StubSource::new("settlement", calm_metrics()));
        dashboard.register_messenger(StubSource::new(
            "settlement",
            MessengerMetrics {
                messages_sent: 1,
                ..MessengerMetrics::default()
            },
        ));

        let aggregated = dashboard.update_metrics();
        assert_eq!(aggregated.messenger_count, 1);
        assert_eq!(aggregated.total_messages_sent, 1);
    }

    #[test]
    fn test_aggregation_math() {
        let dashboard = PerformanceDashboard::new();
        dashboard.register_messenger(StubSource::new(
            "settlement",
            MessengerMetrics {
                messages_sent: 100,
                messages_received: 50,
                average_latency_ms: 10.0,
                errors: 3,
                compression_ratio: 1.0,
                batch_efficiency: 4.0,
            },
        ));
        dashboard.register_messenger(StubSource::new(
            "vip",
            MessengerMetrics {
                messages_sent: 200,
                messages_received: 50,
                average_latency_ms: 30.0,
                errors: 1,
                compression_ratio: 2.0,
                batch_efficiency: 8.0,
            },
        ));

        let aggregated = dashboard.update_metrics();
        assert_eq!(aggregated.messenger_count, 2);
        assert_eq!(aggregated.total_messages_sent, 300);
        assert_eq!(aggregated.total_messages_received, 100);
        assert_eq!(aggregated.total_errors, 4);
        assert_eq!(aggregated.average_latency_ms, 20.0);
        assert_eq!(aggregated.average_compression_ratio, 1.5);
        assert_eq!(aggregated.average_batch_efficiency, 6.0);
        assert_eq!(aggregated.error_rate_pct, 1.0);
        assert!(aggregated.throughput_per_sec > 0.0);
    }

    #[test]
    fn test_alert_fires_and_cooldown_debounces() {
        let sink = Arc::new(RecordingSink::default());
        let dashboard = PerformanceDashboard::with_sink(sink.clone());

        let source = StubSource::new(
            "settlement",
            MessengerMetrics {
                average_latency_ms: 250.0,
                ..calm_metrics()
            },
        );
        dashboard.register_messenger(source);

        dashboard.update_metrics();
        let high_latency: Vec<_> = dashboard
            .alert_history()
            .into_iter()
            .filter(|a| a.rule_id == "high-latency")
            .collect();
        assert_eq!(high_latency.len(), 1);
        assert!(sink.notified.lock().contains(&"high-latency".to_string()));

        let fired_at = Instant::now();
        let cooldown = Duration::from_secs(5 * 60);

        // Condition still holds inside the cooldown window: no new alert.
        dashboard.evaluate_rules_at(fired_at + cooldown / 2);
        assert_eq!(
            dashboard
                .alert_history()
                .iter()
                .filter(|a| a.rule_id == "high-latency")
                .count(),
            1
        );

        // Past the cooldown: a second alert.
        dashboard.evaluate_rules_at(fired_at + cooldown + Duration::from_secs(60));
        assert_eq!(
            dashboard
                .alert_history()
                .iter()
                .filter(|a| a.rule_id == "high-latency")
                .count(),
            2
        );
    }

    #[test]
    fn test_condition_clearing_stops_alerts() {
        let dashboard = PerformanceDashboard::new();
        let source = StubSource::new(
            "settlement",
            MessengerMetrics {
                average_latency_ms: 250.0,
                ..calm_metrics()
            },
        );
        dashboard.register_messenger(source.clone());
        dashboard.update_metrics();
        assert_eq!(dashboard.active_alerts().len(), 1);

        source.set(calm_metrics());
        dashboard.update_metrics();
        // Still just the original alert; nothing new fires.
        assert_eq!(
            dashboard
                .alert_history()
                .iter()
                .filter(|a| a.rule_id == "high-latency")
                .count(),
            1
        );
    }

    #[test]
    fn test_alert_lifecycle_is_one_way() {
        let dashboard = PerformanceDashboard::new();
        dashboard.register_messenger(StubSource::new(
            "settlement",
            MessengerMetrics {
                average_latency_ms: 250.0,
                ..calm_metrics()
            },
        ));
        dashboard.update_metrics();

        let alert_id = dashboard.active_alerts()[0].id.clone();

        assert!(dashboard.acknowledge_alert(&alert_id, "oncall"));
        // Repeat acknowledge is a no-op.
        assert!(!dashboard.acknowledge_alert(&alert_id, "oncall"));

        assert!(dashboard.resolve_alert(&alert_id));
        assert!(!dashboard.resolve_alert(&alert_id));
        // No acknowledging a resolved alert.
        assert!(!dashboard.acknowledge_alert(&alert_id, "oncall"));

        assert!(dashboard.active_alerts().is_empty());
        let resolved = &dashboard.alert_history()[0];
        assert!(resolved.resolved_at.is_some());
        assert_eq!(resolved.acknowledged_by.as_deref(), Some("oncall"));

        // Unknown ids are no-ops too.
        assert!(!dashboard.resolve_alert("nope"));
        assert!(!dashboard.acknowledge_alert("nope", "oncall"));
    }

    #[test]
    fn test_status_derivation() {
        let dashboard = PerformanceDashboard::new();
        dashboard.register_messenger(StubSource::new("settlement", calm_metrics()));
        dashboard.update_metrics();
        assert_eq!(dashboard.generate_report().status, DashboardStatus::Healthy);

        // High-severity alert: warning.
        dashboard.register_messenger(StubSource::new(
            "settlement",
            MessengerMetrics {
                average_latency_ms: 250.0,
                ..calm_metrics()
            },
        ));
        dashboard.update_metrics();
        assert_eq!(dashboard.generate_report().status, DashboardStatus::Warning);

        // Resolving it returns to healthy.
        for alert in dashboard.active_alerts() {
            dashboard.resolve_alert(&alert.id);
        }
        assert_eq!(dashboard.generate_report().status, DashboardStatus::Healthy);
    }

    #[tokio::test]
    async fn test_pulls_from_a_real_messenger() {
        use strand_messaging::test_utils::InMemoryChannel;
        use strand_messaging::{MessengerConfig, SendOptions, WorkerMessenger};
        use strand_rollout::{FeatureFlagManager, RolloutConfig};
        use strand_types::{kind, MessagePayload, SettlementUpdate};

        let messenger = WorkerMessenger::new(
            MessengerConfig::new("settlement", "dashboard"),
            Arc::new(InMemoryChannel::new()),
            Arc::new(FeatureFlagManager::from_config(RolloutConfig::standard())),
        );
        messenger
            .send(
                kind::SETTLEMENT_UPDATE,
                MessagePayload::SettlementUpdate(SettlementUpdate {
                    settlement_id: "PEN_001".to_string(),
                    amount: 166.67,
                    currency: None,
                    status: None,
                }),
                SendOptions::default(),
            )
            .await
            .unwrap();

        let dashboard = PerformanceDashboard::new();
        dashboard.register_messenger(messenger.clone());

        let aggregated = dashboard.update_metrics();
        assert_eq!(aggregated.messenger_count, 1);
        assert_eq!(aggregated.total_messages_sent, 1);
        assert_eq!(dashboard.generate_report().domains, vec!["settlement"]);
        messenger.destroy();
    }

    #[test]
    fn test_summary_counts() {
        let dashboard = PerformanceDashboard::new();
        dashboard.register_messenger(StubSource::new("settlement", calm_metrics()));
        dashboard.register_messenger(StubSource::new("vip", calm_metrics()));
        dashboard.update_metrics();

        let summary = dashboard.summary();
        assert_eq!(summary.messenger_count, 2);
        assert_eq!(summary.total_messages, 2000);

        let report = dashboard.generate_report();
        assert_eq!(report.domains, vec!["settlement", "vip"]);

        let json = report.to_json();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["metrics"]["totalMessagesSent"], 1000);
    }
}
