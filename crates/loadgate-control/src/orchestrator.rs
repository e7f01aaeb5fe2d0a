//! Control-loop orchestrator
//!
//! Owns the enabled signals, the active policy, and the enabled actuators;
//! ticks the Signal → Policy → Actuator loop on a timer; keeps a bounded
//! audit log of decisions; and exposes hot reconfiguration.
//!
//! A tick runs under the single state lock, so reconfiguration and status
//! calls serialize with ticks: a tick in progress always sees a consistent
//! snapshot, and configuration changes land at tick boundaries.

use chrono::Utc;
use futures::future::join_all;
use loadgate_common::{ControlError, DecisionRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::actuator::{Actuator, ActuatorStatus};
use crate::policy::Policy;
use crate::signal::{SignalGuard, SignalStatus};

/// Atomic update of the enabled sets and/or active policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagUpdate {
    /// Replacement enabled-signal set
    pub signals: Option<Vec<String>>,
    /// Replacement enabled-actuator set
    pub actuators: Option<Vec<String>>,
    /// New active policy
    pub policy: Option<String>,
}

/// Result of a policy switch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyChange {
    pub old_policy: String,
    pub new_policy: String,
}

/// Introspection snapshot of the whole controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub enabled: bool,
    pub active_policy: String,
    pub available_policies: Vec<String>,
    pub signals: HashMap<String, SignalStatus>,
    pub enabled_signals: Vec<String>,
    pub actuators: HashMap<String, ActuatorStatus>,
    pub enabled_actuators: Vec<String>,
    pub decision_count: usize,
    pub tick_count: u64,
}

struct ControlState {
    signals: HashMap<String, SignalGuard>,
    policies: HashMap<String, Box<dyn Policy>>,
    actuators: HashMap<String, Box<dyn Actuator>>,
    active_policy: String,
    enabled_signals: HashSet<String>,
    enabled_actuators: HashSet<String>,
    history: VecDeque<DecisionRecord>,
    history_capacity: usize,
    enabled: bool,
    tick_count: u64,
}

/// The controller. Constructed once at process start by the composition
/// root and handed to whatever exposes the control API.
pub struct Orchestrator {
    state: Mutex<ControlState>,
    tick_interval: Duration,
}

impl Orchestrator {
    pub fn new(history_capacity: usize, tick_interval: Duration) -> Self {
        Self {
            state: Mutex::new(ControlState {
                signals: HashMap::new(),
                policies: HashMap::new(),
                actuators: HashMap::new(),
                active_policy: String::new(),
                enabled_signals: HashSet::new(),
                enabled_actuators: HashSet::new(),
                history: VecDeque::with_capacity(history_capacity),
                history_capacity: history_capacity.max(1),
                enabled: true,
                tick_count: 0,
            }),
            tick_interval,
        }
    }

    /// Register a signal; starts enabled
    pub async fn add_signal(&self, guard: SignalGuard) {
        let mut state = self.state.lock().await;
        let name = guard.name().to_string();
        state.enabled_signals.insert(name.clone());
        state.signals.insert(name, guard);
    }

    /// Register a policy; the first one registered becomes active
    pub async fn add_policy(&self, policy: Box<dyn Policy>) {
        let mut state = self.state.lock().await;
        let name = policy.name().to_string();
        if state.active_policy.is_empty() {
            state.active_policy = name.clone();
        }
        state.policies.insert(name, policy);
    }

    /// Register an actuator; starts enabled
    pub async fn add_actuator(&self, actuator: Box<dyn Actuator>) {
        let mut state = self.state.lock().await;
        let name = actuator.name().to_string();
        state.enabled_actuators.insert(name.clone());
        state.actuators.insert(name, actuator);
    }

    /// Run one control tick and return its audit record
    #[instrument(skip(self))]
    pub async fn tick(&self) -> DecisionRecord {
        let mut guard = self.state.lock().await;
        let started = Instant::now();
        let ControlState {
            signals,
            policies,
            actuators,
            active_policy,
            enabled_signals,
            enabled_actuators,
            history,
            history_capacity,
            tick_count,
            ..
        } = &mut *guard;

        // Enabled signals resolve concurrently; each guard owns its state
        let reads = join_all(
            signals
                .iter_mut()
                .filter(|(name, _)| enabled_signals.contains(name.as_str()))
                .map(|(name, guard)| async move { (name.clone(), guard.safe_read().await) }),
        )
        .await;

        let mut signal_readings = HashMap::new();
        for (name, reading) in reads {
            if let Some(value) = reading.value {
                signal_readings.insert(name, value);
            }
        }

        let (decision, actuator_results) = if signal_readings.is_empty() {
            debug!("no healthy signal readings, skipping tick");
            (None, Vec::new())
        } else {
            match policies.get_mut(active_policy.as_str()) {
                Some(policy) => {
                    let decision = policy.decide(&signal_readings);
                    let results = if decision.action.is_actionable() {
                        info!(
                            policy = %decision.policy,
                            action = ?decision.action,
                            adjustment = decision.adjustment,
                            reason = %decision.reason,
                            "applying decision"
                        );
                        actuators
                            .iter_mut()
                            .filter(|(name, _)| enabled_actuators.contains(name.as_str()))
                            .map(|(_, actuator)| {
                                actuator.apply(decision.adjustment, &decision.reason)
                            })
                            .collect()
                    } else {
                        debug!(reason = %decision.reason, "holding");
                        Vec::new()
                    };
                    (Some(decision), results)
                }
                None => {
                    error!(policy = %active_policy, "active policy missing from registry");
                    (None, Vec::new())
                }
            }
        };

        *tick_count += 1;
        let record = DecisionRecord {
            timestamp: Utc::now().timestamp_millis(),
            signal_readings,
            policy: active_policy.clone(),
            decision,
            actuator_results,
            tick_duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        history.push_back(record.clone());
        while history.len() > *history_capacity {
            history.pop_front();
        }

        record
    }

    /// Drive the loop on the configured interval. Never returns; callers
    /// race it against a shutdown future.
    pub async fn run(&self) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.tick_interval.as_secs_f64(),
            "control loop started"
        );

        loop {
            ticker.tick().await;
            if !self.state.lock().await.enabled {
                debug!("controller disabled, skipping tick");
                continue;
            }
            self.tick().await;
        }
    }

    /// Switch the active policy, resetting its internal state so stale
    /// cooldowns and accumulators never leak across a switch
    pub async fn set_policy(&self, name: &str) -> Result<PolicyChange> {
        let mut state = self.state.lock().await;
        if !state.policies.contains_key(name) {
            return Err(ControlError::UnknownPolicy {
                requested: name.to_string(),
                available: sorted_keys(&state.policies),
            }
            .into());
        }

        let old_policy = std::mem::replace(&mut state.active_policy, name.to_string());
        if let Some(policy) = state.policies.get_mut(name) {
            policy.reset();
        }
        info!(old = %old_policy, new = %name, "active policy switched");

        Ok(PolicyChange {
            old_policy,
            new_policy: name.to_string(),
        })
    }

    /// Atomically update the enabled sets and/or active policy. Every name
    /// is validated before any state changes; unknown names reject the
    /// whole update.
    pub async fn set_flags(&self, update: FlagUpdate) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;

        if let Some(names) = &update.signals {
            for name in names {
                if !state.signals.contains_key(name) {
                    return Err(ControlError::UnknownSignal {
                        requested: name.clone(),
                        available: sorted_keys(&state.signals),
                    }
                    .into());
                }
            }
        }
        if let Some(names) = &update.actuators {
            for name in names {
                if !state.actuators.contains_key(name) {
                    return Err(ControlError::UnknownActuator {
                        requested: name.clone(),
                        available: sorted_keys(&state.actuators),
                    }
                    .into());
                }
            }
        }
        if let Some(name) = &update.policy {
            if !state.policies.contains_key(name) {
                return Err(ControlError::UnknownPolicy {
                    requested: name.clone(),
                    available: sorted_keys(&state.policies),
                }
                .into());
            }
        }

        let mut changes = Vec::new();

        if let Some(names) = update.signals {
            let mut sorted = names.clone();
            sorted.sort();
            state.enabled_signals = names.into_iter().collect();
            changes.push(format!("enabled_signals: {:?}", sorted));
        }
        if let Some(names) = update.actuators {
            let mut sorted = names.clone();
            sorted.sort();
            state.enabled_actuators = names.into_iter().collect();
            changes.push(format!("enabled_actuators: {:?}", sorted));
        }
        if let Some(name) = update.policy {
            if name != state.active_policy {
                let old = std::mem::replace(&mut state.active_policy, name.clone());
                if let Some(policy) = state.policies.get_mut(&name) {
                    policy.reset();
                }
                changes.push(format!("active_policy: {} -> {}", old, name));
            }
        }

        info!(?changes, "flags updated");
        Ok(changes)
    }

    /// Re-arm a signal that auto-disabled
    pub async fn reset_signal(&self, name: &str) -> Result<SignalStatus> {
        let mut state = self.state.lock().await;
        match state.signals.get_mut(name) {
            Some(guard) => {
                guard.reset();
                Ok(guard.status())
            }
            None => Err(ControlError::UnknownSignal {
                requested: name.to_string(),
                available: sorted_keys(&state.signals),
            }
            .into()),
        }
    }

    /// Master switch; a disabled controller skips ticks entirely
    pub async fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        if state.enabled != enabled {
            warn!(enabled, "controller toggled");
        }
        state.enabled = enabled;
    }

    /// Snapshot the whole controller for status endpoints
    pub async fn status(&self) -> StatusReport {
        let state = self.state.lock().await;

        let mut enabled_signals: Vec<String> = state.enabled_signals.iter().cloned().collect();
        enabled_signals.sort();
        let mut enabled_actuators: Vec<String> = state.enabled_actuators.iter().cloned().collect();
        enabled_actuators.sort();

        StatusReport {
            enabled: state.enabled,
            active_policy: state.active_policy.clone(),
            available_policies: sorted_keys(&state.policies),
            signals: state
                .signals
                .iter()
                .map(|(name, guard)| (name.clone(), guard.status()))
                .collect(),
            enabled_signals,
            actuators: state
                .actuators
                .iter()
                .map(|(name, actuator)| (name.clone(), actuator.status()))
                .collect(),
            enabled_actuators,
            decision_count: state.history.len(),
            tick_count: state.tick_count,
        }
    }

    /// Most recent decision records, newest first
    pub async fn decisions(&self, limit: usize) -> Vec<DecisionRecord> {
        let state = self.state.lock().await;
        state.history.iter().rev().take(limit).cloned().collect()
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{BatchSizeActuator, ConcurrencyLimitActuator, SequenceSampler};
    use crate::clock::ManualClock;
    use crate::config::{AimdSettings, KnobSettings, PidSettings};
    use crate::policy::{AimdPolicy, PidLitePolicy};
    use crate::signal::{SignalGuard, SignalSource};
    use async_trait::async_trait;
    use loadgate_common::{DecisionAction, LoadgateError};
    use std::sync::Arc;

    struct StaticSource(f64);

    #[async_trait]
    impl SignalSource for StaticSource {
        async fn read(&self) -> loadgate_common::Result<f64> {
            Ok(self.0)
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SignalSource for FailingSource {
        async fn read(&self) -> loadgate_common::Result<f64> {
            Err(LoadgateError::Store("backend down".to_string()))
        }
    }

    fn knob(initial: f64, min: f64, max: f64) -> KnobSettings {
        KnobSettings {
            initial,
            min_value: min,
            max_value: max,
            rollout_fraction: 1.0,
        }
    }

    async fn overloaded_controller(clock: Arc<ManualClock>) -> Orchestrator {
        let orchestrator = Orchestrator::new(200, Duration::from_secs(10));
        orchestrator
            .add_signal(SignalGuard::new("p95_latency", Box::new(StaticSource(0.9))))
            .await;
        orchestrator
            .add_signal(SignalGuard::new("queue_depth", Box::new(StaticSource(0.3))))
            .await;
        orchestrator
            .add_policy(Box::new(AimdPolicy::new(
                &AimdSettings::default(),
                clock.clone(),
            )))
            .await;
        orchestrator
            .add_policy(Box::new(PidLitePolicy::new(&PidSettings::default(), clock)))
            .await;
        orchestrator
            .add_actuator(Box::new(ConcurrencyLimitActuator::new(
                &knob(32.0, 1.0, 256.0),
                Box::new(SequenceSampler::default()),
            )))
            .await;
        orchestrator
            .add_actuator(Box::new(BatchSizeActuator::new(
                &knob(16.0, 1.0, 128.0),
                Box::new(SequenceSampler::default()),
            )))
            .await;
        orchestrator
    }

    #[tokio::test]
    async fn test_overloaded_tick_applies_to_all_actuators() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = overloaded_controller(clock).await;

        let record = orchestrator.tick().await;
        let decision = record.decision.as_ref().unwrap();
        assert_eq!(decision.action, DecisionAction::Decrease);
        assert_eq!(decision.adjustment, 0.7);
        assert_eq!(record.signal_readings.len(), 2);
        assert_eq!(record.actuator_results.len(), 2);
        for outcome in &record.actuator_results {
            assert!(outcome.applied);
        }

        let status = orchestrator.status().await;
        assert_eq!(
            status.actuators["concurrency_limit"].current_value,
            32.0 * 0.7
        );
        // 16 * 0.7 = 11.2 rounds to 11
        assert_eq!(status.actuators["batch_size"].current_value, 11.0);
    }

    #[tokio::test]
    async fn test_cooldown_hold_skips_actuators() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = overloaded_controller(clock.clone()).await;

        orchestrator.tick().await;
        clock.advance(Duration::from_secs(1));

        let record = orchestrator.tick().await;
        let decision = record.decision.as_ref().unwrap();
        assert_eq!(decision.action, DecisionAction::Hold);
        assert_eq!(decision.reason, "cooldown");
        assert!(record.actuator_results.is_empty());

        let status = orchestrator.status().await;
        assert_eq!(status.actuators["concurrency_limit"].adjustment_count, 1);
    }

    #[tokio::test]
    async fn test_all_signals_failing_skips_but_records() {
        let orchestrator = Orchestrator::new(200, Duration::from_secs(10));
        orchestrator
            .add_signal(
                SignalGuard::new("p95_latency", Box::new(FailingSource)).with_max_errors(1),
            )
            .await;
        let clock = Arc::new(ManualClock::new(0));
        orchestrator
            .add_policy(Box::new(AimdPolicy::new(&AimdSettings::default(), clock)))
            .await;
        orchestrator
            .add_actuator(Box::new(ConcurrencyLimitActuator::new(
                &knob(32.0, 1.0, 256.0),
                Box::new(SequenceSampler::default()),
            )))
            .await;

        let record = orchestrator.tick().await;
        assert!(record.skipped());
        assert!(record.signal_readings.is_empty());
        assert!(record.actuator_results.is_empty());

        let status = orchestrator.status().await;
        assert!(!status.signals["p95_latency"].enabled);
        assert_eq!(status.actuators["concurrency_limit"].current_value, 32.0);
        assert_eq!(status.decision_count, 1);
    }

    #[tokio::test]
    async fn test_history_evicts_oldest() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = Orchestrator::new(3, Duration::from_secs(10));
        orchestrator
            .add_signal(SignalGuard::new("p95_latency", Box::new(StaticSource(0.2))))
            .await;
        orchestrator
            .add_policy(Box::new(AimdPolicy::new(&AimdSettings::default(), clock)))
            .await;

        for _ in 0..5 {
            orchestrator.tick().await;
        }

        let status = orchestrator.status().await;
        assert_eq!(status.decision_count, 3);
        assert_eq!(status.tick_count, 5);

        let recent = orchestrator.decisions(10).await;
        assert_eq!(recent.len(), 3);
        // Newest first
        assert!(recent[0].timestamp >= recent[2].timestamp);
    }

    #[tokio::test]
    async fn test_unknown_policy_rejected_with_available() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = overloaded_controller(clock).await;

        let err = orchestrator.set_policy("bandit").await.unwrap_err();
        match err {
            LoadgateError::Control(ControlError::UnknownPolicy {
                requested,
                available,
            }) => {
                assert_eq!(requested, "bandit");
                assert_eq!(available, vec!["aimd".to_string(), "pid".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let status = orchestrator.status().await;
        assert_eq!(status.active_policy, "aimd");
    }

    #[tokio::test]
    async fn test_policy_switch_resets_incoming_state() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = overloaded_controller(clock.clone()).await;

        // First tick decreases and arms the AIMD cooldown
        orchestrator.tick().await;
        clock.advance(Duration::from_secs(1));

        // Bounce through pid and back; the cooldown must not survive
        orchestrator.set_policy("pid").await.unwrap();
        let change = orchestrator.set_policy("aimd").await.unwrap();
        assert_eq!(change.old_policy, "pid");
        assert_eq!(change.new_policy, "aimd");

        let record = orchestrator.tick().await;
        assert_eq!(
            record.decision.as_ref().unwrap().action,
            DecisionAction::Decrease
        );
    }

    #[tokio::test]
    async fn test_set_flags_is_all_or_nothing() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = overloaded_controller(clock).await;

        let err = orchestrator
            .set_flags(FlagUpdate {
                signals: Some(vec!["p95_latency".to_string()]),
                actuators: Some(vec!["warp_drive".to_string()]),
                policy: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadgateError::Control(ControlError::UnknownActuator { .. })
        ));

        // The valid half of the rejected update must not have landed
        let status = orchestrator.status().await;
        assert_eq!(status.enabled_signals.len(), 2);
    }

    #[tokio::test]
    async fn test_set_flags_narrows_signal_set() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = overloaded_controller(clock).await;

        let changes = orchestrator
            .set_flags(FlagUpdate {
                signals: Some(vec!["queue_depth".to_string()]),
                actuators: None,
                policy: Some("pid".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(changes.len(), 2);

        // Only the healthy queue signal remains: mean 0.3, pid increases
        let record = orchestrator.tick().await;
        assert_eq!(record.signal_readings.len(), 1);
        assert_eq!(record.policy, "pid");
        assert_eq!(
            record.decision.as_ref().unwrap().action,
            DecisionAction::Increase
        );
    }

    #[tokio::test]
    async fn test_reset_signal_rearms() {
        let orchestrator = Orchestrator::new(200, Duration::from_secs(10));
        orchestrator
            .add_signal(
                SignalGuard::new("p95_latency", Box::new(FailingSource)).with_max_errors(1),
            )
            .await;
        let clock = Arc::new(ManualClock::new(0));
        orchestrator
            .add_policy(Box::new(AimdPolicy::new(&AimdSettings::default(), clock)))
            .await;

        orchestrator.tick().await;
        assert!(!orchestrator.status().await.signals["p95_latency"].enabled);

        let status = orchestrator.reset_signal("p95_latency").await.unwrap();
        assert!(status.enabled);
        assert_eq!(status.error_count, 0);

        assert!(orchestrator.reset_signal("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_controller_skips_run_ticks() {
        let clock = Arc::new(ManualClock::new(0));
        let orchestrator = Arc::new(overloaded_controller(clock).await);
        orchestrator.set_enabled(false).await;

        // Paused tokio time: drive the loop over a few intervals
        tokio::time::pause();
        let runner = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run().await })
        };
        tokio::time::advance(Duration::from_secs(35)).await;
        tokio::task::yield_now().await;
        runner.abort();

        assert_eq!(orchestrator.status().await.tick_count, 0);
    }
}
