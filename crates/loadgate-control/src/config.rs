//! Controller configuration
//!
//! Static, read once at process start: signal windows and targets, policy
//! gains and cooldowns, actuator bounds and rollout fractions, the tick
//! interval, and the decision-log capacity. Not hot-reloadable; the enabled
//! sets and active policy are reconfigured at runtime through the
//! orchestrator instead.

use anyhow::Result;
use loadgate_common::{
    DECISION_LOG_CAPACITY, DEFAULT_LATENCY_WINDOW_SECS, DEFAULT_MAX_QUEUE_DEPTH,
    DEFAULT_MAX_SIGNAL_ERRORS, DEFAULT_P95_TARGET_MS, DEFAULT_ROLLOUT_FRACTION,
    DEFAULT_TICK_INTERVAL_SECS,
};
use serde::{Deserialize, Serialize};

/// Top-level controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Seconds between control ticks
    pub tick_interval_secs: u64,
    /// Capacity of the in-memory decision log
    pub history_capacity: usize,
    /// Redis URL of the metrics/state store; in-memory fallback when unset
    pub redis_url: Option<String>,
    /// Signal configuration
    pub signals: SignalSettings,
    /// Policy configuration
    pub policies: PolicySettings,
    /// Actuator configuration
    pub actuators: ActuatorSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            history_capacity: DECISION_LOG_CAPACITY,
            redis_url: None,
            signals: SignalSettings::default(),
            policies: PolicySettings::default(),
            actuators: ActuatorSettings::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment and .env file
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Ok(val) = std::env::var("LOADGATE_TICK_INTERVAL_SECS") {
            if let Ok(v) = val.parse() {
                cfg.tick_interval_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LOADGATE_HISTORY_CAPACITY") {
            if let Ok(v) = val.parse() {
                cfg.history_capacity = v;
            }
        }
        if let Ok(url) = std::env::var("LOADGATE_REDIS_URL") {
            cfg.redis_url = Some(url);
        } else if let Ok(url) = std::env::var("REDIS_URL") {
            cfg.redis_url = Some(url);
        }

        // Signal settings
        if let Ok(val) = std::env::var("LOADGATE_P95_TARGET_MS") {
            if let Ok(v) = val.parse() {
                cfg.signals.latency.target_p95_ms = v;
            }
        }
        if let Ok(val) = std::env::var("LOADGATE_LATENCY_WINDOW_SECS") {
            if let Ok(v) = val.parse() {
                cfg.signals.latency.window_secs = v;
            }
        }
        if let Ok(val) = std::env::var("LOADGATE_MAX_QUEUE_DEPTH") {
            if let Ok(v) = val.parse() {
                cfg.signals.queue.max_depth = v;
            }
        }

        // Policy settings
        if let Ok(val) = std::env::var("LOADGATE_ACTIVE_POLICY") {
            cfg.policies.active = val;
        }
        if let Ok(val) = std::env::var("LOADGATE_AIMD_THRESHOLD") {
            if let Ok(v) = val.parse() {
                cfg.policies.aimd.threshold = v;
            }
        }
        if let Ok(val) = std::env::var("LOADGATE_AIMD_COOLDOWN_SECS") {
            if let Ok(v) = val.parse() {
                cfg.policies.aimd.cooldown_secs = v;
            }
        }

        // Actuator settings
        if let Ok(val) = std::env::var("LOADGATE_ROLLOUT_FRACTION") {
            if let Ok(v) = val.parse::<f64>() {
                cfg.actuators.concurrency.rollout_fraction = v;
                cfg.actuators.batch.rollout_fraction = v;
            }
        }

        Ok(cfg)
    }
}

/// Per-signal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSettings {
    pub latency: LatencySignalSettings,
    pub queue: QueueSignalSettings,
}

impl Default for SignalSettings {
    fn default() -> Self {
        Self {
            latency: LatencySignalSettings::default(),
            queue: QueueSignalSettings::default(),
        }
    }
}

/// P95 latency signal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySignalSettings {
    /// Sorted-set key holding timestamp-scored latency samples
    pub key: String,
    /// Trailing window in seconds
    pub window_secs: u64,
    /// Latency target: p95 at this value reads as 1.0
    pub target_p95_ms: f64,
    /// Consecutive failures before auto-disable
    pub max_errors: u32,
}

impl Default for LatencySignalSettings {
    fn default() -> Self {
        Self {
            key: "loadgate:latency:samples".to_string(),
            window_secs: DEFAULT_LATENCY_WINDOW_SECS,
            target_p95_ms: DEFAULT_P95_TARGET_MS,
            max_errors: DEFAULT_MAX_SIGNAL_ERRORS,
        }
    }
}

/// Queue depth signal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSignalSettings {
    /// Numeric key holding the current queue depth
    pub key: String,
    /// Depth treated as saturation
    pub max_depth: f64,
    /// Consecutive failures before auto-disable
    pub max_errors: u32,
}

impl Default for QueueSignalSettings {
    fn default() -> Self {
        Self {
            key: "loadgate:queue:depth".to_string(),
            max_depth: DEFAULT_MAX_QUEUE_DEPTH,
            max_errors: DEFAULT_MAX_SIGNAL_ERRORS,
        }
    }
}

/// Policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Policy active at startup
    pub active: String,
    pub aimd: AimdSettings,
    pub pid: PidSettings,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            active: "aimd".to_string(),
            aimd: AimdSettings::default(),
            pid: PidSettings::default(),
        }
    }
}

/// AIMD policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AimdSettings {
    /// Worst signal above this is overload
    pub threshold: f64,
    /// Additive growth per healthy tick (0.05 = +5%)
    pub increase_step: f64,
    /// Multiplicative backoff on overload (0.7 = shrink to 70%)
    pub decrease_factor: f64,
    /// Minimum seconds between two decreases
    pub cooldown_secs: f64,
}

impl Default for AimdSettings {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            increase_step: 0.05,
            decrease_factor: 0.7,
            cooldown_secs: 30.0,
        }
    }
}

/// PID-lite policy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidSettings {
    /// Desired mean signal value
    pub target: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Per-tick clamp on the combined output (0.3 = ±30%)
    pub max_adjustment: f64,
}

impl Default for PidSettings {
    fn default() -> Self {
        Self {
            target: 0.5,
            kp: 0.5,
            ki: 0.1,
            kd: 0.2,
            max_adjustment: 0.3,
        }
    }
}

/// Actuator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorSettings {
    pub concurrency: KnobSettings,
    pub batch: KnobSettings,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            concurrency: KnobSettings {
                initial: 32.0,
                min_value: 1.0,
                max_value: 256.0,
                rollout_fraction: DEFAULT_ROLLOUT_FRACTION,
            },
            batch: KnobSettings {
                initial: 16.0,
                min_value: 1.0,
                max_value: 128.0,
                rollout_fraction: DEFAULT_ROLLOUT_FRACTION,
            },
        }
    }
}

/// Bounds and rollout for one resource knob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnobSettings {
    /// Knob value at startup
    pub initial: f64,
    /// Hard lower bound
    pub min_value: f64,
    /// Hard upper bound
    pub max_value: f64,
    /// Probability that an application commits
    pub rollout_fraction: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ControllerConfig::default();
        assert_eq!(cfg.tick_interval_secs, 10);
        assert_eq!(cfg.history_capacity, 200);
        assert_eq!(cfg.policies.active, "aimd");
        assert_eq!(cfg.policies.aimd.threshold, 0.8);
        assert_eq!(cfg.policies.pid.target, 0.5);
        assert_eq!(cfg.signals.latency.target_p95_ms, 100.0);
        assert_eq!(cfg.signals.queue.max_depth, 100.0);
        assert_eq!(cfg.actuators.batch.rollout_fraction, 0.10);
    }

    #[test]
    fn test_config_serializes() {
        let cfg = ControllerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ControllerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.policies.aimd.decrease_factor, 0.7);
    }
}
