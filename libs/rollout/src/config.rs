//! TOML configuration surface for flags and rollout phases.
//!
//! Flags and phases are defined as static, named records at process start.
//! Validation is a reporting pass ([`RolloutConfig::validate_feature_flags`])
//! rather than something enforced at mutation time.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::criteria::Criterion;
use crate::flags::{flag_names, FeatureFlag, FeatureFlagManager, FlagConditions};
use crate::phases::{MonitoringLevel, RolloutPhase};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read rollout config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse rollout config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A problem found by the validation pass. Reported, never fatal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigIssue {
    pub flag: String,
    pub problem: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.flag, self.problem)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionsConfig {
    pub domain: Option<String>,
    pub environment: Option<String>,
    pub min_load: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rollout_percentage: u8,
    #[serde(default)]
    pub fallback: String,
    pub conditions: Option<ConditionsConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    #[serde(default)]
    pub domains: Vec<String>,
    pub percentage: u8,
    #[serde(default)]
    pub duration: String,
    #[serde(default = "default_monitoring")]
    pub monitoring: MonitoringLevel,
    /// Free-text criteria, parsed into [`Criterion`] when the manager is
    /// built.
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

fn default_monitoring() -> MonitoringLevel {
    MonitoringLevel::Standard
}

/// Static flag and phase definitions loaded at process start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default)]
    pub flags: Vec<FlagConfig>,
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
}

impl RolloutConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Report flags violating the schema constraints: percentage outside
    /// `[0, 100]` and empty descriptions.
    pub fn validate_feature_flags(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        for flag in &self.flags {
            if flag.rollout_percentage > 100 {
                issues.push(ConfigIssue {
                    flag: flag.name.clone(),
                    problem: format!(
                        "rollout_percentage {} outside [0, 100]",
                        flag.rollout_percentage
                    ),
                });
            }
            if flag.description.trim().is_empty() {
                issues.push(ConfigIssue {
                    flag: flag.name.clone(),
                    problem: "description must not be empty".to_string(),
                });
            }
        }
        issues
    }

    /// The built-in four-phase staged rollout plan and its managed flags.
    pub fn standard() -> Self {
        let flag = |name: &str, description: &str, enabled: bool, pct: u8, fallback: &str| {
            FlagConfig {
                name: name.to_string(),
                description: description.to_string(),
                enabled,
                rollout_percentage: pct,
                fallback: fallback.to_string(),
                conditions: None,
            }
        };

        let phase = |name: &str,
                     domains: &[&str],
                     percentage: u8,
                     duration: &str,
                     monitoring: MonitoringLevel,
                     criteria: &[&str]| PhaseConfig {
            name: name.to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
            percentage,
            duration: duration.to_string(),
            monitoring,
            success_criteria: criteria.iter().map(|c| c.to_string()).collect(),
        };

        RolloutConfig {
            flags: vec![
                flag(
                    flag_names::WORKER_MESSAGING,
                    "Route domain traffic onto the worker transport",
                    true,
                    10,
                    "legacy-dom-bridge",
                ),
                flag(
                    flag_names::BATCHING,
                    "Group outgoing envelopes into timed batches",
                    false,
                    0,
                    "immediate-send",
                ),
                flag(
                    flag_names::COMPRESSION,
                    "Wrap oversized envelopes behind the compression marker",
                    false,
                    0,
                    "plain-text",
                ),
                flag(
                    flag_names::METRICS_STREAMING,
                    "Push messenger metrics to the dashboard instead of pull",
                    false,
                    0,
                    "pull-snapshot",
                ),
            ],
            phases: vec![
                phase(
                    "internal-canary",
                    &["settlement"],
                    10,
                    "48h",
                    MonitoringLevel::Intensive,
                    &[
                        "No alerts for 48 hours",
                        "Latency improvement of 30% on settlement sends",
                    ],
                ),
                phase(
                    "low-traffic",
                    &["settlement", "vip"],
                    25,
                    "72h",
                    MonitoringLevel::Intensive,
                    &[
                        "Error rate stays under 0.5%",
                        "Latency improvement of 30% sustained",
                    ],
                ),
                phase(
                    "majority",
                    &["settlement", "vip", "commission"],
                    50,
                    "1w",
                    MonitoringLevel::Standard,
                    &[
                        "Latency improvement of 70-80% on batched sends",
                        "Throughput of at least 50 msg/s",
                    ],
                ),
                phase(
                    "full",
                    &["settlement", "vip", "commission", "balance"],
                    100,
                    "ongoing",
                    MonitoringLevel::Light,
                    &["No alerts for 7 days"],
                ),
            ],
        }
    }
}

impl From<FlagConfig> for FeatureFlag {
    fn from(config: FlagConfig) -> Self {
        FeatureFlag {
            name: config.name,
            description: config.description,
            enabled: config.enabled,
            rollout_percentage: config.rollout_percentage.min(100),
            fallback: config.fallback,
            conditions: config.conditions.map(|c| FlagConditions {
                domain: c.domain,
                environment: c.environment,
                min_load: c.min_load,
            }),
            domain_scope: None,
        }
    }
}

impl From<PhaseConfig> for RolloutPhase {
    fn from(config: PhaseConfig) -> Self {
        RolloutPhase {
            name: config.name,
            domains: config.domains.into_iter().collect(),
            percentage: config.percentage.min(100),
            duration_label: config.duration,
            monitoring_level: config.monitoring,
            success_criteria: config
                .success_criteria
                .iter()
                .map(|text| Criterion::parse(text))
                .collect(),
        }
    }
}

impl FeatureFlagManager {
    /// Build a manager from static configuration, parsing free-text
    /// criteria into their typed form.
    pub fn from_config(config: RolloutConfig) -> Self {
        for issue in config.validate_feature_flags() {
            tracing::warn!(%issue, "rollout config issue");
        }
        let flags = config.flags.into_iter().map(FeatureFlag::from).collect();
        let phases = config.phases.into_iter().map(RolloutPhase::from).collect();
        FeatureFlagManager::new(flags, phases)
    }
}
