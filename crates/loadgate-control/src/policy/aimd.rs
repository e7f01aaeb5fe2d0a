//! AIMD policy: additive increase, multiplicative decrease
//!
//! The classic congestion-control rule applied to admission knobs. Biased
//! toward the worst signal: any one saturated metric is enough to back off.

use super::{Policy, AIMD_POLICY, REASON_COOLDOWN, REASON_NO_SIGNALS};
use crate::clock::Clock;
use crate::config::AimdSettings;
use chrono::{DateTime, Utc};
use loadgate_common::{Decision, DecisionAction};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct AimdPolicy {
    threshold: f64,
    increase_step: f64,
    decrease_factor: f64,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    last_decrease_at: Option<DateTime<Utc>>,
    last_decision: Option<Decision>,
}

impl AimdPolicy {
    pub fn new(settings: &AimdSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold: settings.threshold,
            increase_step: settings.increase_step,
            decrease_factor: settings.decrease_factor,
            cooldown: Duration::from_secs_f64(settings.cooldown_secs),
            clock,
            last_decrease_at: None,
            last_decision: None,
        }
    }

    /// Most recent decision, for introspection
    pub fn last_decision(&self) -> Option<&Decision> {
        self.last_decision.as_ref()
    }

    fn evaluate(&mut self, readings: &HashMap<String, f64>) -> Decision {
        if readings.is_empty() {
            return Decision::hold(AIMD_POLICY, REASON_NO_SIGNALS);
        }

        // Worst-case bias: act on the highest signal. Tie-break between
        // equal maxima follows map iteration order and is not load-bearing.
        let mut top_name = "";
        let mut max_signal = f64::NEG_INFINITY;
        for (name, value) in readings {
            if *value > max_signal {
                max_signal = *value;
                top_name = name;
            }
        }

        if max_signal > self.threshold {
            let now = self.clock.now();
            if let Some(last) = self.last_decrease_at {
                let since = (now - last).to_std().unwrap_or_default();
                if since < self.cooldown {
                    let remaining = self.cooldown - since;
                    return Decision::hold(AIMD_POLICY, REASON_COOLDOWN).with_diagnostics(json!({
                        "max_signal": max_signal,
                        "signal": top_name,
                        "cooldown_remaining_secs": remaining.as_secs_f64(),
                    }));
                }
            }

            self.last_decrease_at = Some(now);
            Decision::new(
                AIMD_POLICY,
                DecisionAction::Decrease,
                self.decrease_factor,
                format!(
                    "{} at {:.3} above threshold {:.2}",
                    top_name, max_signal, self.threshold
                ),
            )
            .with_diagnostics(json!({
                "max_signal": max_signal,
                "signal": top_name,
            }))
        } else {
            Decision::new(
                AIMD_POLICY,
                DecisionAction::Increase,
                1.0 + self.increase_step,
                format!("all signals within threshold {:.2}", self.threshold),
            )
            .with_diagnostics(json!({
                "max_signal": max_signal,
                "signal": top_name,
            }))
        }
    }
}

impl Policy for AimdPolicy {
    fn name(&self) -> &str {
        AIMD_POLICY
    }

    fn decide(&mut self, readings: &HashMap<String, f64>) -> Decision {
        let decision = self.evaluate(readings);
        self.last_decision = Some(decision.clone());
        decision
    }

    fn reset(&mut self) {
        self.last_decrease_at = None;
        self.last_decision = None;
    }
}
