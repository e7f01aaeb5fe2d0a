//! # Loadgate Control
//!
//! Runtime admission/rate-shaping controller. Observes live load signals,
//! decides whether the system is healthy or overloaded, and adjusts resource
//! knobs (concurrency limit, batch size) accordingly: the control-plane
//! analogue of TCP congestion control with pluggable parts.
//!
//! ## Closed loop
//!
//! - [`signal`]: polled health metrics normalized so ≈1.0 means saturated,
//!   wrapped with fail-safe auto-disable
//! - [`policy`]: decision rules ([`policy::AimdPolicy`],
//!   [`policy::PidLitePolicy`]) mapping readings to one [`Decision`] per tick
//! - [`actuator`]: bounded, optionally-staged application of an adjustment
//!   to one resource knob
//! - [`orchestrator`]: ticks the loop on a timer, hot-swaps policies, and
//!   keeps a bounded audit log of decisions
//!
//! Signal reads go through [`store::MetricsStore`]; time and randomness are
//! injected via [`clock::Clock`] and [`actuator::RolloutSampler`] so the
//! whole loop is deterministic under test.

pub mod actuator;
pub mod clock;
pub mod config;
pub mod orchestrator;
pub mod policy;
pub mod signal;
pub mod store;

pub use loadgate_common::{Decision, DecisionAction, DecisionRecord, LoadgateError, Result};
pub use orchestrator::{FlagUpdate, Orchestrator, PolicyChange, StatusReport};
