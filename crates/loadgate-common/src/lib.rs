//! # Loadgate Common
//!
//! Shared types and errors for the Loadgate admission/rate-shaping controller.
//!
//! ## Core Types
//!
//! - [`Decision`]: one control decision (direction + adjustment + reason)
//! - [`DecisionRecord`]: audit-log entry for a single control tick
//! - [`ApplyOutcome`]: result of applying a decision to one actuator
//!
//! ## Errors
//!
//! - [`LoadgateError`]: unified error taxonomy with [`ControlError`] and
//!   [`SignalError`] sub-domains

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ControlError, LoadgateError, Result, SignalError};
pub use types::decision::{ApplyOutcome, Decision, DecisionAction, DecisionRecord};

/// Loadgate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default control tick interval in seconds
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 10;

/// Default capacity of the in-memory decision log
pub const DECISION_LOG_CAPACITY: usize = 200;

/// Consecutive read failures before a signal auto-disables
pub const DEFAULT_MAX_SIGNAL_ERRORS: u32 = 3;

/// Neutral reading returned when a backend is reachable but has no data.
/// Signals normalize so that 1.0 means saturated; 0.5 is "no opinion".
pub const NEUTRAL_SIGNAL_VALUE: f64 = 0.5;

/// Default fraction of apply() calls that actually commit (staged rollout)
pub const DEFAULT_ROLLOUT_FRACTION: f64 = 0.10;

/// Default P95 latency target in milliseconds
pub const DEFAULT_P95_TARGET_MS: f64 = 100.0;

/// Default trailing latency window in seconds
pub const DEFAULT_LATENCY_WINDOW_SECS: u64 = 60;

/// Default queue depth treated as saturation
pub const DEFAULT_MAX_QUEUE_DEPTH: f64 = 100.0;
