//! Rollout phase definitions and the current-phase pointer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::criteria::Criterion;

/// How closely a phase is watched while active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitoringLevel {
    Intensive,
    Standard,
    Light,
}

/// A named stage in the staged deployment of the worker transport.
///
/// Phases form a fixed ordered sequence; only the manager's pointer moves.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutPhase {
    pub name: String,
    /// Domains participating in this phase.
    pub domains: HashSet<String>,
    /// Percentage applied to the primary transport flag on entry.
    pub percentage: u8,
    /// Human-readable intended duration, e.g. "48h". Informational only.
    pub duration_label: String,
    pub monitoring_level: MonitoringLevel,
    pub success_criteria: Vec<Criterion>,
}

/// Position in the phase sequence.
///
/// `Rollback` is a sentinel, not a phase: it is reachable from every state
/// (including itself) and only [`emergency_rollback`] enters it.
///
/// [`emergency_rollback`]: crate::FeatureFlagManager::emergency_rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhasePointer {
    Phase(usize),
    Rollback,
}

impl PhasePointer {
    pub fn is_rollback(&self) -> bool {
        matches!(self, PhasePointer::Rollback)
    }
}
