//! # Strand Rollout Control
//!
//! Feature flags with percentage gating, staged rollout phases, and an
//! emergency rollback path for the worker transport.
//!
//! ## Design
//!
//! - The [`FeatureFlagManager`] is explicitly constructed and passed to
//!   callers; there is no module-level singleton. Share it as
//!   `Arc<FeatureFlagManager>` — interior locking makes the mutation API
//!   safe from a single writer while readers evaluate flags concurrently.
//! - Rollout phases form a fixed ordered sequence with one current-phase
//!   pointer. Advancing a phase derives new flag percentages; the only
//!   transition reachable from every state is [`emergency_rollback`].
//! - Phase success criteria are typed ([`Criterion`]) and evaluated by a
//!   pure function over [`PhaseMetrics`]. Free-text criteria are parsed
//!   once, at the config boundary.
//!
//! [`emergency_rollback`]: FeatureFlagManager::emergency_rollback
//!
//! ```rust
//! use strand_rollout::{EvalContext, FeatureFlagManager, RolloutConfig};
//!
//! let manager = FeatureFlagManager::from_config(RolloutConfig::standard());
//! let ctx = EvalContext::new("settlement", "production").with_load(0.2);
//! let _ = manager.is_enabled(strand_rollout::flag_names::WORKER_MESSAGING, Some(&ctx));
//! ```

pub mod config;
pub mod criteria;
pub mod flags;
pub mod phases;

pub use config::{ConfigError, ConfigIssue, FlagConfig, PhaseConfig, RolloutConfig};
pub use criteria::{CriteriaReport, Criterion, CriterionResult, PhaseMetrics};
pub use flags::{flag_names, EvalContext, FeatureFlag, FeatureFlagManager, FlagConditions, FlagUpdate};
pub use phases::{MonitoringLevel, PhasePointer, RolloutPhase};
