//! Feature flag records and the dependency-injected flag manager.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use rand::Rng;
use tracing::{info, warn};

use crate::criteria::{CriteriaReport, CriterionResult, PhaseMetrics};
use crate::phases::{PhasePointer, RolloutPhase};

/// Names of the flags managed by the rollout schedule.
pub mod flag_names {
    /// Primary transport flag: routes traffic onto the worker transport.
    pub const WORKER_MESSAGING: &str = "enableWorkerMessaging";
    /// Unlocked at phase percentage >= 50.
    pub const BATCHING: &str = "enableBatching";
    /// Unlocked at phase percentage >= 100.
    pub const COMPRESSION: &str = "enableCompression";
    /// Unlocked at phase percentage >= 100.
    pub const METRICS_STREAMING: &str = "enableMetricsStreaming";
}

/// Optional conditions a context must satisfy for a flag to apply.
///
/// All specified conditions are conjunctive; absent fields impose no
/// constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagConditions {
    pub domain: Option<String>,
    pub environment: Option<String>,
    pub min_load: Option<f64>,
}

impl FlagConditions {
    fn is_empty(&self) -> bool {
        self.domain.is_none() && self.environment.is_none() && self.min_load.is_none()
    }

    fn matches(&self, ctx: Option<&EvalContext>) -> bool {
        if self.is_empty() {
            return true;
        }
        let Some(ctx) = ctx else {
            return false;
        };
        if let Some(domain) = &self.domain {
            if ctx.domain != *domain {
                return false;
            }
        }
        if let Some(environment) = &self.environment {
            if ctx.environment != *environment {
                return false;
            }
        }
        if let Some(min_load) = self.min_load {
            if ctx.load.unwrap_or(0.0) < min_load {
                return false;
            }
        }
        true
    }
}

/// Caller-supplied context a flag is evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalContext {
    pub domain: String,
    pub environment: String,
    pub load: Option<f64>,
}

impl EvalContext {
    pub fn new(domain: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            environment: environment.into(),
            load: None,
        }
    }

    pub fn with_load(mut self, load: f64) -> Self {
        self.load = Some(load);
        self
    }
}

/// A named, independently toggleable and percentage-gated behavior switch.
///
/// Mutable in place: updates keep the identity and merge fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFlag {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    /// Percentage of evaluations that sample as enabled, in `[0, 100]`.
    pub rollout_percentage: u8,
    /// Behavior callers fall back to when the flag samples off.
    pub fallback: String,
    pub conditions: Option<FlagConditions>,
    /// Domains the current rollout phase scopes this flag to. Empty scope
    /// means unrestricted. Maintained by the phase schedule, not callers.
    pub domain_scope: Option<HashSet<String>>,
}

impl FeatureFlag {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enabled: false,
            rollout_percentage: 0,
            fallback: String::new(),
            conditions: None,
            domain_scope: None,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn rollout_percentage(mut self, percentage: u8) -> Self {
        self.rollout_percentage = percentage;
        self
    }

    pub fn fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn conditions(mut self, conditions: FlagConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }
}

/// Partial update merged into an existing flag record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagUpdate {
    pub enabled: Option<bool>,
    pub rollout_percentage: Option<u8>,
    pub fallback: Option<String>,
    pub conditions: Option<FlagConditions>,
}

struct ManagerState {
    flags: HashMap<String, FeatureFlag>,
    phases: Vec<RolloutPhase>,
    pointer: PhasePointer,
}

/// Holds the managed flags and the rollout phase sequence.
///
/// Single-writer structure: the mutation API is synchronous and
/// non-reentrant; readers may evaluate flags concurrently through the
/// shared lock.
pub struct FeatureFlagManager {
    state: RwLock<ManagerState>,
}

impl std::fmt::Debug for FeatureFlagManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("FeatureFlagManager")
            .field("flags", &state.flags.len())
            .field("phases", &state.phases.len())
            .field("pointer", &state.pointer)
            .finish()
    }
}

impl FeatureFlagManager {
    pub fn new(flags: Vec<FeatureFlag>, phases: Vec<RolloutPhase>) -> Self {
        let flags = flags
            .into_iter()
            .map(|flag| (flag.name.clone(), flag))
            .collect();
        Self {
            state: RwLock::new(ManagerState {
                flags,
                phases,
                pointer: PhasePointer::Phase(0),
            }),
        }
    }

    /// Register or replace a flag by name.
    pub fn register_flag(&self, flag: FeatureFlag) {
        self.state.write().flags.insert(flag.name.clone(), flag);
    }

    /// Evaluate a flag against a caller-supplied context.
    ///
    /// Unknown or disabled flags are off. Enabled flags must satisfy the
    /// phase domain scope and every specified condition, then pass a
    /// uniform draw against the rollout percentage.
    pub fn is_enabled(&self, name: &str, ctx: Option<&EvalContext>) -> bool {
        let state = self.state.read();
        let Some(flag) = state.flags.get(name) else {
            warn!(flag = name, "evaluated unknown feature flag");
            return false;
        };
        if !flag.enabled {
            return false;
        }

        if let Some(scope) = &flag.domain_scope {
            if !scope.is_empty() {
                match ctx {
                    Some(ctx) if scope.contains(&ctx.domain) => {}
                    _ => return false,
                }
            }
        }

        if let Some(conditions) = &flag.conditions {
            if !conditions.matches(ctx) {
                return false;
            }
        }

        let draw = rand::thread_rng().gen_range(0..100u8);
        draw < flag.rollout_percentage
    }

    /// Merge partial fields into an existing flag. Returns false (and logs)
    /// if the flag is unknown.
    pub fn update_flag(&self, name: &str, update: FlagUpdate) -> bool {
        let mut state = self.state.write();
        let Some(flag) = state.flags.get_mut(name) else {
            warn!(flag = name, "update for unknown feature flag ignored");
            return false;
        };
        if let Some(enabled) = update.enabled {
            flag.enabled = enabled;
        }
        if let Some(percentage) = update.rollout_percentage {
            flag.rollout_percentage = percentage;
        }
        if let Some(fallback) = update.fallback {
            flag.fallback = fallback;
        }
        if let Some(conditions) = update.conditions {
            flag.conditions = Some(conditions);
        }
        true
    }

    /// Snapshot of a flag record.
    pub fn flag(&self, name: &str) -> Option<FeatureFlag> {
        self.state.read().flags.get(name).cloned()
    }

    /// The phase the pointer currently rests on, if any.
    pub fn current_phase(&self) -> Option<RolloutPhase> {
        let state = self.state.read();
        match state.pointer {
            PhasePointer::Phase(index) => state.phases.get(index).cloned(),
            PhasePointer::Rollback => None,
        }
    }

    pub fn pointer(&self) -> PhasePointer {
        self.state.read().pointer
    }

    /// Move to the next phase and derive flag percentages from it.
    ///
    /// Returns false at the last phase and in the rollback state; the
    /// pointer is unchanged in both cases.
    pub fn advance_phase(&self) -> bool {
        let mut state = self.state.write();
        let next = match state.pointer {
            PhasePointer::Rollback => return false,
            PhasePointer::Phase(index) => {
                if index + 1 >= state.phases.len() {
                    return false;
                }
                index + 1
            }
        };

        state.pointer = PhasePointer::Phase(next);
        let phase = state.phases[next].clone();
        info!(phase = %phase.name, percentage = phase.percentage, "advancing rollout phase");
        apply_phase_flags(&mut state, &phase);
        true
    }

    /// Disable every managed flag and park the pointer on the rollback
    /// sentinel. Reachable from any state, including rollback itself.
    pub fn emergency_rollback(&self) {
        let mut state = self.state.write();
        warn!("emergency rollback: disabling all managed flags");
        for flag in state.flags.values_mut() {
            flag.enabled = false;
            flag.rollout_percentage = 0;
        }
        state.pointer = PhasePointer::Rollback;
    }

    /// Evaluate a phase's success criteria against observed metrics. Pure.
    pub fn validate_phase_criteria(phase: &RolloutPhase, metrics: &PhaseMetrics) -> CriteriaReport {
        let results: Vec<CriterionResult> = phase
            .success_criteria
            .iter()
            .map(|criterion| CriterionResult {
                criterion: *criterion,
                passed: criterion.evaluate(metrics),
            })
            .collect();
        CriteriaReport {
            phase: phase.name.clone(),
            passed: results.iter().all(|r| r.passed),
            results,
        }
    }
}

/// Derived flag schedule applied when a phase is entered.
///
/// The primary transport flag takes the phase percentage scoped to the
/// phase domains; crossing 50 unlocks batching at 25, and reaching 100
/// unlocks compression at 50 and metrics streaming at 25. Unlocks never
/// lower a percentage already raised by hand.
fn apply_phase_flags(state: &mut ManagerState, phase: &RolloutPhase) {
    if let Some(primary) = state.flags.get_mut(flag_names::WORKER_MESSAGING) {
        primary.enabled = true;
        primary.rollout_percentage = phase.percentage;
        primary.domain_scope = Some(phase.domains.clone());
    }

    let unlocks: &[(&str, u8)] = if phase.percentage >= 100 {
        &[
            (flag_names::BATCHING, 25),
            (flag_names::COMPRESSION, 50),
            (flag_names::METRICS_STREAMING, 25),
        ]
    } else if phase.percentage >= 50 {
        &[(flag_names::BATCHING, 25)]
    } else {
        &[]
    };

    for (name, floor) in unlocks {
        if let Some(flag) = state.flags.get_mut(*name) {
            flag.enabled = true;
            flag.rollout_percentage = flag.rollout_percentage.max(*floor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RolloutConfig;
    use crate::criteria::Criterion;
    use crate::phases::MonitoringLevel;

    fn manager() -> FeatureFlagManager {
        FeatureFlagManager::from_config(RolloutConfig::standard())
    }

    fn ctx(domain: &str) -> EvalContext {
        EvalContext::new(domain, "production")
    }

    #[test]
    fn test_unknown_flag_is_off() {
        assert!(!manager().is_enabled("enableTimeTravel", None));
    }

    #[test]
    fn test_disabled_flag_is_off() {
        let manager = manager();
        assert!(!manager.is_enabled(flag_names::COMPRESSION, Some(&ctx("settlement"))));
    }

    #[test]
    fn test_full_percentage_always_samples_on() {
        let manager = manager();
        manager.update_flag(
            flag_names::WORKER_MESSAGING,
            FlagUpdate {
                enabled: Some(true),
                rollout_percentage: Some(100),
                ..FlagUpdate::default()
            },
        );
        for _ in 0..50 {
            assert!(manager.is_enabled(flag_names::WORKER_MESSAGING, Some(&ctx("settlement"))));
        }
    }

    #[test]
    fn test_zero_percentage_never_samples_on() {
        let manager = manager();
        manager.update_flag(
            flag_names::WORKER_MESSAGING,
            FlagUpdate {
                enabled: Some(true),
                rollout_percentage: Some(0),
                ..FlagUpdate::default()
            },
        );
        for _ in 0..50 {
            assert!(!manager.is_enabled(flag_names::WORKER_MESSAGING, Some(&ctx("settlement"))));
        }
    }

    #[test]
    fn test_conditions_are_conjunctive() {
        let manager = manager();
        manager.register_flag(
            FeatureFlag::new("gatedFlag", "gated test flag")
                .enabled(true)
                .rollout_percentage(100)
                .conditions(FlagConditions {
                    domain: Some("settlement".to_string()),
                    environment: Some("production".to_string()),
                    min_load: Some(0.5),
                }),
        );

        let good = ctx("settlement").with_load(0.7);
        assert!(manager.is_enabled("gatedFlag", Some(&good)));

        let wrong_domain = ctx("vip").with_load(0.7);
        assert!(!manager.is_enabled("gatedFlag", Some(&wrong_domain)));

        let low_load = ctx("settlement").with_load(0.1);
        assert!(!manager.is_enabled("gatedFlag", Some(&low_load)));

        // Conditions present but no context supplied.
        assert!(!manager.is_enabled("gatedFlag", None));
    }

    #[test]
    fn test_update_unknown_flag_returns_false() {
        assert!(!manager().update_flag("enableTimeTravel", FlagUpdate::default()));
    }

    #[test]
    fn test_update_merges_fields() {
        let manager = manager();
        assert!(manager.update_flag(
            flag_names::BATCHING,
            FlagUpdate {
                enabled: Some(true),
                rollout_percentage: Some(40),
                ..FlagUpdate::default()
            },
        ));
        let flag = manager.flag(flag_names::BATCHING).unwrap();
        assert!(flag.enabled);
        assert_eq!(flag.rollout_percentage, 40);
        // Untouched fields survive the merge.
        assert!(!flag.description.is_empty());
    }

    #[test]
    fn test_rollout_monotonicity() {
        let manager = manager();
        let phase_count = RolloutConfig::standard().phases.len();

        for _ in 0..phase_count - 1 {
            assert!(manager.advance_phase());
        }
        let last = manager.current_phase().unwrap();

        // N-th call fails and leaves the pointer alone.
        assert!(!manager.advance_phase());
        assert_eq!(manager.current_phase().unwrap(), last);
    }

    #[test]
    fn test_phase_schedule_unlocks() {
        let manager = manager();

        // Advance to the 50% phase: batching unlocks at 25.
        assert!(manager.advance_phase());
        assert!(manager.advance_phase());
        let batching = manager.flag(flag_names::BATCHING).unwrap();
        assert!(batching.enabled);
        assert_eq!(batching.rollout_percentage, 25);
        assert!(!manager.flag(flag_names::COMPRESSION).unwrap().enabled);

        // Advance to the 100% phase: compression and metrics unlock.
        assert!(manager.advance_phase());
        let compression = manager.flag(flag_names::COMPRESSION).unwrap();
        assert!(compression.enabled);
        assert_eq!(compression.rollout_percentage, 50);
        let streaming = manager.flag(flag_names::METRICS_STREAMING).unwrap();
        assert!(streaming.enabled);
        assert_eq!(streaming.rollout_percentage, 25);

        let primary = manager.flag(flag_names::WORKER_MESSAGING).unwrap();
        assert_eq!(primary.rollout_percentage, 100);
    }

    #[test]
    fn test_domain_scope_follows_phase() {
        let manager = manager();
        manager.advance_phase();

        let primary = manager.flag(flag_names::WORKER_MESSAGING).unwrap();
        let scope = primary.domain_scope.unwrap();
        assert!(scope.contains("settlement"));

        // Domains outside the phase scope sample off even at full percent.
        manager.update_flag(
            flag_names::WORKER_MESSAGING,
            FlagUpdate {
                rollout_percentage: Some(100),
                ..FlagUpdate::default()
            },
        );
        assert!(!manager.is_enabled(flag_names::WORKER_MESSAGING, Some(&ctx("treasury"))));
        assert!(manager.is_enabled(flag_names::WORKER_MESSAGING, Some(&ctx("settlement"))));
    }

    #[test]
    fn test_rollback_idempotence() {
        let manager = manager();
        manager.advance_phase();

        manager.emergency_rollback();
        let snapshot: Vec<_> = [
            flag_names::WORKER_MESSAGING,
            flag_names::BATCHING,
            flag_names::COMPRESSION,
            flag_names::METRICS_STREAMING,
        ]
        .iter()
        .map(|name| manager.flag(name).unwrap())
        .collect();
        for flag in &snapshot {
            assert!(!flag.enabled);
            assert_eq!(flag.rollout_percentage, 0);
        }
        assert!(manager.pointer().is_rollback());
        assert!(manager.current_phase().is_none());

        // Second rollback yields the identical state.
        manager.emergency_rollback();
        for flag in &snapshot {
            assert_eq!(manager.flag(&flag.name).unwrap(), *flag);
        }
        assert!(manager.pointer().is_rollback());

        // No promotion out of rollback.
        assert!(!manager.advance_phase());
    }

    #[test]
    fn test_validate_phase_criteria() {
        let phase = RolloutPhase {
            name: "canary".to_string(),
            domains: ["settlement".to_string()].into_iter().collect(),
            percentage: 10,
            duration_label: "48h".to_string(),
            monitoring_level: MonitoringLevel::Intensive,
            success_criteria: vec![Criterion::LatencyImprovement(30.0), Criterion::NoAlerts],
        };

        let passing = PhaseMetrics {
            latency_improvement_pct: 42.0,
            error_rate_pct: 0.1,
            throughput: 80.0,
            active_alerts: 0,
        };
        let report = FeatureFlagManager::validate_phase_criteria(&phase, &passing);
        assert!(report.passed);
        assert_eq!(report.results.len(), 2);

        let failing = PhaseMetrics {
            active_alerts: 1,
            ..passing
        };
        let report = FeatureFlagManager::validate_phase_criteria(&phase, &failing);
        assert!(!report.passed);
        assert_eq!(
            report.results.iter().filter(|r| !r.passed).count(),
            1
        );
    }
}
