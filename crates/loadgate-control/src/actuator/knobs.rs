//! Concrete resource knobs: concurrency limit and batch size
//!
//! Both share the bounded, rollout-gated mechanics of
//! [`KnobCore`](super::KnobCore); batch size additionally rounds candidates
//! to whole items before clamping.

use super::{
    Actuator, ActuatorStatus, KnobCore, RolloutSampler, BATCH_ACTUATOR, CONCURRENCY_ACTUATOR,
};
use crate::config::KnobSettings;
use loadgate_common::ApplyOutcome;

/// Shapes the serving pipeline's in-flight request limit
pub struct ConcurrencyLimitActuator {
    core: KnobCore,
}

impl ConcurrencyLimitActuator {
    pub fn new(settings: &KnobSettings, sampler: Box<dyn RolloutSampler>) -> Self {
        Self {
            core: KnobCore::new(
                CONCURRENCY_ACTUATOR,
                settings.initial,
                settings.min_value,
                settings.max_value,
                settings.rollout_fraction,
                sampler,
            ),
        }
    }
}

impl Actuator for ConcurrencyLimitActuator {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn apply(&mut self, adjustment: f64, reason: &str) -> ApplyOutcome {
        self.core.apply(adjustment, reason, false)
    }

    fn status(&self) -> ActuatorStatus {
        self.core.status()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.core.set_enabled(enabled);
    }
}

/// Shapes the serving pipeline's batch size; candidates are rounded to an
/// integer before clamping
pub struct BatchSizeActuator {
    core: KnobCore,
}

impl BatchSizeActuator {
    pub fn new(settings: &KnobSettings, sampler: Box<dyn RolloutSampler>) -> Self {
        Self {
            core: KnobCore::new(
                BATCH_ACTUATOR,
                settings.initial,
                settings.min_value,
                settings.max_value,
                settings.rollout_fraction,
                sampler,
            ),
        }
    }
}

impl Actuator for BatchSizeActuator {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn apply(&mut self, adjustment: f64, reason: &str) -> ApplyOutcome {
        self.core.apply(adjustment, reason, true)
    }

    fn status(&self) -> ActuatorStatus {
        self.core.status()
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.core.set_enabled(enabled);
    }
}
