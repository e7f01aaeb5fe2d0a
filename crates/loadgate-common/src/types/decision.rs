//! Control decisions and the audit-log record
//!
//! A [`Decision`] is produced fresh on every control tick, immediately
//! consumed by the actuators and the decision log, and never mutated after
//! creation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of a control decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    /// Grow the resource knob
    Increase,
    /// Shrink the resource knob
    Decrease,
    /// Leave the knob alone
    Hold,
}

impl DecisionAction {
    /// Whether this decision should reach the actuators
    pub fn is_actionable(&self) -> bool {
        !matches!(self, DecisionAction::Hold)
    }
}

/// One control decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Direction
    pub action: DecisionAction,
    /// Multiplicative adjustment applied to each knob (1.0 = no change)
    pub adjustment: f64,
    /// Human-readable reason
    pub reason: String,
    /// Name of the policy that produced this decision
    pub policy: String,
    /// Policy-specific diagnostic fields (cooldown remaining, PID terms, ...)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub diagnostics: serde_json::Value,
}

impl Decision {
    /// Create a hold decision with adjustment 1.0
    pub fn hold(policy: &str, reason: &str) -> Self {
        Self {
            action: DecisionAction::Hold,
            adjustment: 1.0,
            reason: reason.to_string(),
            policy: policy.to_string(),
            diagnostics: serde_json::Value::Null,
        }
    }

    /// Create a decision with an explicit action and adjustment
    pub fn new(policy: &str, action: DecisionAction, adjustment: f64, reason: String) -> Self {
        Self {
            action,
            adjustment,
            reason,
            policy: policy.to_string(),
            diagnostics: serde_json::Value::Null,
        }
    }

    /// Attach policy-specific diagnostics
    pub fn with_diagnostics(mut self, diagnostics: serde_json::Value) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Result of applying a decision to one actuator.
///
/// `new_value` always reports what would have been committed, even when the
/// rollout draw skipped the commit, so dry-run comparison stays possible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Actuator name
    pub actuator: String,
    /// False only for structured failures (e.g. actuator disabled)
    pub ok: bool,
    /// Whether the candidate value was committed
    pub applied: bool,
    /// Outcome of the Bernoulli rollout draw
    pub rollout_decision: bool,
    /// Knob value before the call
    pub old_value: f64,
    /// Candidate value after rounding and clamping
    pub new_value: f64,
    /// Reason carried over from the decision
    pub reason: String,
    /// Monotone count of committed applications
    pub adjustment_count: u64,
    /// Structured failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Audit-log entry for one control tick.
///
/// Read-only once appended; stored in a fixed-capacity ring buffer that
/// evicts oldest entries first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// Tick timestamp (Unix millis)
    pub timestamp: i64,
    /// Successful signal readings used for this tick (name -> value)
    pub signal_readings: HashMap<String, f64>,
    /// Active policy at tick start
    pub policy: String,
    /// Decision for this tick; `None` when every signal failed and the
    /// tick was skipped without consulting the policy
    pub decision: Option<Decision>,
    /// Per-actuator outcomes (empty on hold or skipped ticks)
    pub actuator_results: Vec<ApplyOutcome>,
    /// Wall-clock duration of the tick in milliseconds
    pub tick_duration_ms: f64,
}

impl DecisionRecord {
    /// Whether this tick was skipped because no signal produced a reading
    pub fn skipped(&self) -> bool {
        self.decision.is_none()
    }
}
