//! PID-lite policy
//!
//! A simplified proportional-integral-derivative loop over the mean of all
//! signal readings (deliberately mean-based where AIMD is worst-case), with
//! the combined output clamped to a per-tick adjustment bound.

use super::{Policy, PID_POLICY, REASON_NO_SIGNALS};
use crate::clock::Clock;
use crate::config::PidSettings;
use chrono::{DateTime, Utc};
use loadgate_common::{Decision, DecisionAction};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// Output magnitudes below this are treated as hold
const HOLD_BAND: f64 = 0.01;

pub struct PidLitePolicy {
    target: f64,
    kp: f64,
    ki: f64,
    kd: f64,
    max_adjustment: f64,
    clock: Arc<dyn Clock>,
    integral: f64,
    last_error: Option<f64>,
    last_at: Option<DateTime<Utc>>,
    last_decision: Option<Decision>,
}

impl PidLitePolicy {
    pub fn new(settings: &PidSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            target: settings.target,
            kp: settings.kp,
            ki: settings.ki,
            kd: settings.kd,
            max_adjustment: settings.max_adjustment,
            clock,
            integral: 0.0,
            last_error: None,
            last_at: None,
            last_decision: None,
        }
    }

    /// Most recent decision, for introspection
    pub fn last_decision(&self) -> Option<&Decision> {
        self.last_decision.as_ref()
    }

    fn evaluate(&mut self, readings: &HashMap<String, f64>) -> Decision {
        if readings.is_empty() {
            return Decision::hold(PID_POLICY, REASON_NO_SIGNALS);
        }

        let observation = readings.values().sum::<f64>() / readings.len() as f64;
        let error = self.target - observation;

        let now = self.clock.now();
        let dt = match self.last_at {
            // Guard against a clock that stands still or runs backwards
            Some(last) => (((now - last).num_milliseconds() as f64) / 1000.0).max(0.001),
            None => 1.0,
        };

        self.integral += error * dt;
        let derivative = match self.last_error {
            Some(last_error) => (error - last_error) / dt,
            None => 0.0,
        };

        let raw_output = self.kp * error + self.ki * self.integral + self.kd * derivative;
        let output = raw_output.clamp(-self.max_adjustment, self.max_adjustment);

        self.last_error = Some(error);
        self.last_at = Some(now);

        let action = if output > HOLD_BAND {
            DecisionAction::Increase
        } else if output < -HOLD_BAND {
            DecisionAction::Decrease
        } else {
            DecisionAction::Hold
        };

        Decision::new(
            PID_POLICY,
            action,
            1.0 + output,
            format!("pid output {:.4} for observation {:.3}", output, observation),
        )
        .with_diagnostics(json!({
            "observation": observation,
            "error": error,
            "integral": self.integral,
            "derivative": derivative,
            "output": output,
            "dt_secs": dt,
        }))
    }
}

impl Policy for PidLitePolicy {
    fn name(&self) -> &str {
        PID_POLICY
    }

    fn decide(&mut self, readings: &HashMap<String, f64>) -> Decision {
        let decision = self.evaluate(readings);
        self.last_decision = Some(decision.clone());
        decision
    }

    fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
        self.last_at = None;
        self.last_decision = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;
    use std::time::Duration;

    fn policy(clock: Arc<ManualClock>) -> PidLitePolicy {
        PidLitePolicy::new(&PidSettings::default(), clock)
    }

    fn readings(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_at_target_holds() {
        let clock = Arc::new(ManualClock::new(0));
        let mut policy = policy(clock);

        let d = policy.decide(&readings(&[("p95_latency", 0.5)]));
        assert_eq!(d.action, DecisionAction::Hold);
        assert_eq!(d.adjustment, 1.0);
        assert_eq!(d.diagnostics["output"], 0.0);
    }

    #[test]
    fn test_overload_trajectory_with_defaults() {
        // target 0.5, kp 0.5, ki 0.1, kd 0.2; constant observation 0.9
        let clock = Arc::new(ManualClock::new(0));
        let mut policy = policy(clock.clone());
        let overloaded = readings(&[("p95_latency", 0.9)]);

        // First tick: dt=1, error=-0.4, integral=-0.4, derivative=0
        // output = 0.5*-0.4 + 0.1*-0.4 = -0.24
        let d1 = policy.decide(&overloaded);
        assert_eq!(d1.action, DecisionAction::Decrease);
        assert!((d1.adjustment - 0.76).abs() < 1e-9);

        // Second tick 1s later: integral=-0.8, derivative=0
        // output = -0.2 - 0.08 = -0.28
        clock.advance(Duration::from_secs(1));
        let d2 = policy.decide(&overloaded);
        assert!((d2.adjustment - 0.72).abs() < 1e-9);

        // Third tick: raw output -0.32 clamps at the ±0.3 bound
        clock.advance(Duration::from_secs(1));
        let d3 = policy.decide(&overloaded);
        assert!((d3.adjustment - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_mean_not_max() {
        let clock = Arc::new(ManualClock::new(0));
        let mut policy = policy(clock);

        // mean of 0.9 and 0.1 is the target: no output despite one hot signal
        let d = policy.decide(&readings(&[("p95_latency", 0.9), ("queue_depth", 0.1)]));
        assert_eq!(d.action, DecisionAction::Hold);
        assert_eq!(d.adjustment, 1.0);
    }

    #[test]
    fn test_reset_zeroes_accumulator() {
        let clock = Arc::new(ManualClock::new(0));
        let mut policy = policy(clock.clone());
        let overloaded = readings(&[("p95_latency", 0.9)]);

        for _ in 0..3 {
            policy.decide(&overloaded);
            clock.advance(Duration::from_secs(1));
        }

        policy.reset();
        assert!(policy.last_decision().is_none());

        // After reset the first tick looks exactly like a cold start
        let d = policy.decide(&overloaded);
        assert!((d.adjustment - 0.76).abs() < 1e-9);
    }

    #[test]
    fn test_no_signals_holds() {
        let clock = Arc::new(ManualClock::new(0));
        let mut policy = policy(clock);

        let d = policy.decide(&HashMap::new());
        assert_eq!(d.action, DecisionAction::Hold);
        assert_eq!(d.reason, REASON_NO_SIGNALS);
    }

    proptest! {
        #[test]
        fn prop_adjustment_stays_within_bound(
            values in proptest::collection::vec(0.0f64..5.0, 1..6),
            ticks in 1usize..20,
        ) {
            let clock = Arc::new(ManualClock::new(0));
            let mut policy = policy(clock.clone());
            let max_adjustment = PidSettings::default().max_adjustment;

            let map: HashMap<String, f64> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("signal_{}", i), *v))
                .collect();

            for _ in 0..ticks {
                let d = policy.decide(&map);
                prop_assert!((d.adjustment - 1.0).abs() <= max_adjustment + 1e-12);
                clock.advance(Duration::from_secs(1));
            }
        }
    }
}
