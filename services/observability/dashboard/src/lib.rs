//! # Strand Performance Dashboard
//!
//! Aggregates metrics from every registered worker messenger, runs alert
//! rules with per-rule cooldowns, maintains alert lifecycle, and produces
//! health and status reports.
//!
//! ## Pull model
//!
//! The dashboard has no internal timer: the owning process calls
//! [`PerformanceDashboard::update_metrics`] periodically. Metric pulls go
//! through the [`MetricsSource`] seam and are non-blocking snapshots; the
//! dashboard never controls messenger lifecycle.
//!
//! [`MetricsSource`]: strand_messaging::MetricsSource

pub mod alerts;
pub mod dashboard;
pub mod metrics;

pub use alerts::{
    default_rules, Alert, AlertRule, AlertSeverity, AlertSink, TracingAlertSink,
};
pub use dashboard::{DashboardReport, DashboardStatus, DashboardSummary, PerformanceDashboard};
pub use metrics::{AggregatedMetrics, ResourceUsage};
