//! Typed phase success criteria.
//!
//! Criteria arrive as free text in configuration ("latency improvement of
//! 30%", "no alerts for 48 hours") and are parsed exactly once into
//! [`Criterion`]. Evaluation is a pure function over [`PhaseMetrics`] so
//! promotion decisions are reproducible.

use serde::{Deserialize, Serialize};

/// Metrics observed over a phase's monitoring window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    /// Latency improvement over the legacy path, in percent.
    pub latency_improvement_pct: f64,
    /// Message error rate, in percent.
    pub error_rate_pct: f64,
    /// Messages per second across participating domains.
    pub throughput: f64,
    /// Currently active alerts attributed to the rollout.
    pub active_alerts: u32,
}

/// A named, parameterized condition verified against observed metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Criterion {
    /// Latency must have improved by at least this percentage.
    LatencyImprovement(f64),
    /// Error rate must be below this percentage.
    ErrorRateBelow(f64),
    /// Throughput must be at least this many messages per second.
    ThroughputAtLeast(f64),
    /// No active alerts attributed to the rollout.
    NoAlerts,
    /// Criterion text the parser did not recognize; always passes.
    AlwaysPass,
}

impl Criterion {
    /// Evaluate against observed metrics. Pure.
    pub fn evaluate(&self, metrics: &PhaseMetrics) -> bool {
        match self {
            Criterion::LatencyImprovement(target) => metrics.latency_improvement_pct >= *target,
            Criterion::ErrorRateBelow(limit) => metrics.error_rate_pct < *limit,
            Criterion::ThroughputAtLeast(floor) => metrics.throughput >= *floor,
            Criterion::NoAlerts => metrics.active_alerts == 0,
            Criterion::AlwaysPass => true,
        }
    }

    /// Parse free-text criterion phrasing from configuration.
    ///
    /// Latency targets follow the legacy phrasing rules: "70-80%" means a
    /// 70% floor, an explicit "30%" means 30, anything else defaults to 20.
    /// Unrecognized text becomes [`Criterion::AlwaysPass`].
    pub fn parse(text: &str) -> Criterion {
        let lowered = text.to_lowercase();

        if lowered.contains("latency improvement") {
            let target = if lowered.contains("70-80%") {
                70.0
            } else if lowered.contains("30%") {
                30.0
            } else {
                20.0
            };
            return Criterion::LatencyImprovement(target);
        }

        if lowered.contains("error rate") {
            return Criterion::ErrorRateBelow(first_percentage(&lowered).unwrap_or(1.0));
        }

        if lowered.contains("throughput") {
            return Criterion::ThroughputAtLeast(first_number(&lowered).unwrap_or(50.0));
        }

        if lowered.contains("alert") {
            return Criterion::NoAlerts;
        }

        Criterion::AlwaysPass
    }
}

/// Outcome of evaluating one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: Criterion,
    pub passed: bool,
}

/// Outcome of evaluating every criterion of a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaReport {
    pub phase: String,
    pub passed: bool,
    pub results: Vec<CriterionResult>,
}

/// First `N%` occurrence in the text, as a number.
fn first_percentage(text: &str) -> Option<f64> {
    let percent_pos = text.find('%')?;
    let head = &text[..percent_pos];
    let start = head
        .rfind(|c: char| !c.is_ascii_digit() && c != '.')
        .map(|i| i + 1)
        .unwrap_or(0);
    head[start..].parse().ok()
}

/// First integer or decimal literal in the text.
fn first_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let tail = &text[start..];
    let end = tail
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(tail.len());
    tail[..end].parse().ok()
}
