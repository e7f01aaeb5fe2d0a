//! Decision policies
//!
//! A policy maps the current signal readings plus its own internal state to
//! exactly one [`Decision`] per tick. `decide()` never fails: an empty
//! reading map is a valid input that produces a hold.

use loadgate_common::Decision;
use std::collections::HashMap;

pub mod aimd;
pub mod pid;

pub use aimd::AimdPolicy;
pub use pid::PidLitePolicy;

/// Registry name of the AIMD policy
pub const AIMD_POLICY: &str = "aimd";

/// Registry name of the PID-lite policy
pub const PID_POLICY: &str = "pid";

/// Reason reported when a tick carries no signal readings
pub const REASON_NO_SIGNALS: &str = "no_signals";

/// Reason reported while a decrease cooldown is active
pub const REASON_COOLDOWN: &str = "cooldown";

/// One decision rule over signal readings
pub trait Policy: Send {
    fn name(&self) -> &str;

    /// Produce one decision from the readings and internal state
    fn decide(&mut self, readings: &HashMap<String, f64>) -> Decision;

    /// Zero all internal state (cooldown timers, accumulators). Invoked
    /// whenever the policy is (re-)activated so stale history never leaks
    /// across a switch.
    fn reset(&mut self);
}
