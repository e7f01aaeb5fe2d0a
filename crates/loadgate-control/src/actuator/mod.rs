//! Resource-knob actuators with staged rollout
//!
//! An actuator is the sole writer of one resource knob. Every application is
//! clamped to hard bounds, and a Bernoulli rollout draw decides whether the
//! candidate value actually commits, so actuation can be canaried at a
//! fraction of opportunities.

use loadgate_common::ApplyOutcome;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

pub mod knobs;

pub use knobs::{BatchSizeActuator, ConcurrencyLimitActuator};

/// Registry name of the concurrency limit actuator
pub const CONCURRENCY_ACTUATOR: &str = "concurrency_limit";

/// Registry name of the batch size actuator
pub const BATCH_ACTUATOR: &str = "batch_size";

/// One adjustable resource knob
pub trait Actuator: Send {
    fn name(&self) -> &str;

    /// Apply a multiplicative adjustment, subject to bounds and rollout
    fn apply(&mut self, adjustment: f64, reason: &str) -> ApplyOutcome;

    fn status(&self) -> ActuatorStatus;

    fn set_enabled(&mut self, enabled: bool);
}

/// Introspection snapshot of one actuator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorStatus {
    pub name: String,
    pub enabled: bool,
    pub current_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub rollout_fraction: f64,
    /// Committed (non-skipped) applications since start
    pub adjustment_count: u64,
}

/// Injected source of rollout draws so tests can script exact
/// commit/skip sequences
pub trait RolloutSampler: Send {
    fn should_commit(&mut self, fraction: f64) -> bool;
}

/// Thread-local RNG sampler for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSampler;

impl RolloutSampler for ThreadRngSampler {
    fn should_commit(&mut self, fraction: f64) -> bool {
        if fraction >= 1.0 {
            return true;
        }
        if fraction <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_bool(fraction)
    }
}

/// Scripted sampler; commits once the script runs out
#[derive(Debug, Clone, Default)]
pub struct SequenceSampler {
    script: VecDeque<bool>,
}

impl SequenceSampler {
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl RolloutSampler for SequenceSampler {
    fn should_commit(&mut self, _fraction: f64) -> bool {
        self.script.pop_front().unwrap_or(true)
    }
}

/// Shared knob mechanics behind both concrete actuators
pub(crate) struct KnobCore {
    name: String,
    enabled: bool,
    current: f64,
    min: f64,
    max: f64,
    rollout_fraction: f64,
    adjustment_count: u64,
    sampler: Box<dyn RolloutSampler>,
}

impl KnobCore {
    pub(crate) fn new(
        name: &str,
        initial: f64,
        min: f64,
        max: f64,
        rollout_fraction: f64,
        sampler: Box<dyn RolloutSampler>,
    ) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            current: initial.clamp(min, max),
            min,
            max,
            rollout_fraction: rollout_fraction.clamp(0.0, 1.0),
            adjustment_count: 0,
            sampler,
        }
    }

    /// `round` integer-values the candidate before clamping
    pub(crate) fn apply(&mut self, adjustment: f64, reason: &str, round: bool) -> ApplyOutcome {
        if !self.enabled {
            return ApplyOutcome {
                actuator: self.name.clone(),
                ok: false,
                applied: false,
                rollout_decision: false,
                old_value: self.current,
                new_value: self.current,
                reason: reason.to_string(),
                adjustment_count: self.adjustment_count,
                error: Some("actuator_disabled".to_string()),
            };
        }

        let old_value = self.current;
        let mut candidate = self.current * adjustment;
        if round {
            candidate = candidate.round();
        }
        let candidate = candidate.clamp(self.min, self.max);

        let committed = self.sampler.should_commit(self.rollout_fraction);
        if committed {
            self.current = candidate;
            self.adjustment_count += 1;
            info!(
                actuator = %self.name,
                old_value,
                new_value = candidate,
                adjustment,
                reason,
                "knob adjusted"
            );
        } else {
            debug!(
                actuator = %self.name,
                would_be = candidate,
                adjustment,
                "rollout draw skipped commit"
            );
        }

        ApplyOutcome {
            actuator: self.name.clone(),
            ok: true,
            applied: committed,
            rollout_decision: committed,
            old_value,
            new_value: candidate,
            reason: reason.to_string(),
            adjustment_count: self.adjustment_count,
            error: None,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub(crate) fn status(&self) -> ActuatorStatus {
        ActuatorStatus {
            name: self.name.clone(),
            enabled: self.enabled,
            current_value: self.current,
            min_value: self.min,
            max_value: self.max,
            rollout_fraction: self.rollout_fraction,
            adjustment_count: self.adjustment_count,
        }
    }
}
