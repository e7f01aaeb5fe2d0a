//! Load signals with fail-safe auto-disable
//!
//! A signal polls one external health metric and normalizes it to a
//! dimensionless scalar where ≈1.0 means saturated. Every source is owned by
//! a [`SignalGuard`] whose `safe_read()` is the only entry the control loop
//! uses. A backing failure is self-limiting: at most `max_errors`
//! consecutive failed polls before the signal stops being polled at all,
//! until an explicit `reset()`.

use async_trait::async_trait;
use chrono::Utc;
use loadgate_common::{Result, SignalError, DEFAULT_MAX_SIGNAL_ERRORS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod latency;
pub mod queue;

pub use latency::P95LatencySignal;
pub use queue::QueueDepthSignal;

/// One polled health metric, normalized so ≈1.0 means saturated
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Poll the backend. Must fail (not default) when the backend is
    /// unreachable so the guard's error counting applies.
    async fn read(&self) -> Result<f64>;
}

/// Outcome of a guarded read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafeReading {
    pub ok: bool,
    pub value: Option<f64>,
    pub error: Option<String>,
}

/// Introspection snapshot of one signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalStatus {
    pub name: String,
    pub enabled: bool,
    pub error_count: u32,
    pub max_errors: u32,
    pub last_error: Option<String>,
    pub last_value: Option<f64>,
    /// Unix millis of the most recent successful read
    pub last_read_at: Option<i64>,
}

/// Fail-safe wrapper around a [`SignalSource`].
///
/// Once `error_count` reaches `max_errors` the guard disables itself and
/// never calls the underlying source again until `reset()`.
pub struct SignalGuard {
    name: String,
    source: Box<dyn SignalSource>,
    enabled: bool,
    error_count: u32,
    max_errors: u32,
    last_error: Option<String>,
    last_value: Option<f64>,
    last_read_at: Option<i64>,
}

impl SignalGuard {
    pub fn new(name: &str, source: Box<dyn SignalSource>) -> Self {
        Self {
            name: name.to_string(),
            source,
            enabled: true,
            error_count: 0,
            max_errors: DEFAULT_MAX_SIGNAL_ERRORS,
            last_error: None,
            last_value: None,
            last_read_at: None,
        }
    }

    /// Override the consecutive-failure budget
    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The only read entry the control loop uses. Never fails outward;
    /// failures are absorbed into the guard's own state.
    pub async fn safe_read(&mut self) -> SafeReading {
        if !self.enabled {
            return SafeReading {
                ok: false,
                value: None,
                error: Some(SignalError::Disabled.to_string()),
            };
        }

        match self.source.read().await {
            Ok(value) => {
                self.error_count = 0;
                self.last_value = Some(value);
                self.last_read_at = Some(Utc::now().timestamp_millis());
                debug!(signal = %self.name, value, "signal read ok");
                SafeReading {
                    ok: true,
                    value: Some(value),
                    error: None,
                }
            }
            Err(err) => {
                self.error_count += 1;
                let message = err.to_string();
                self.last_error = Some(message.clone());

                if self.error_count >= self.max_errors {
                    self.enabled = false;
                    warn!(
                        signal = %self.name,
                        errors = self.error_count,
                        "signal auto-disabled after consecutive failures"
                    );
                } else {
                    warn!(
                        signal = %self.name,
                        errors = self.error_count,
                        error = %message,
                        "signal read failed"
                    );
                }

                SafeReading {
                    ok: false,
                    value: None,
                    error: Some(message),
                }
            }
        }
    }

    /// Re-arm a disabled signal. Idempotent.
    pub fn reset(&mut self) {
        self.enabled = true;
        self.error_count = 0;
        self.last_error = None;
        info!(signal = %self.name, "signal reset");
    }

    pub fn status(&self) -> SignalStatus {
        SignalStatus {
            name: self.name.clone(),
            enabled: self.enabled,
            error_count: self.error_count,
            max_errors: self.max_errors,
            last_error: self.last_error.clone(),
            last_value: self.last_value,
            last_read_at: self.last_read_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgate_common::LoadgateError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Source that fails the first `fail_first` reads, then succeeds,
    /// counting every invocation.
    struct FlakySource {
        fail_first: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SignalSource for FlakySource {
        async fn read(&self) -> Result<f64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(LoadgateError::Store("backend down".to_string()))
            } else {
                Ok(0.42)
            }
        }
    }

    fn flaky(fail_first: u32) -> (SignalGuard, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let guard = SignalGuard::new(
            "flaky",
            Box::new(FlakySource {
                fail_first,
                calls: calls.clone(),
            }),
        );
        (guard, calls)
    }

    #[tokio::test]
    async fn test_auto_disable_after_max_errors() {
        let (mut guard, calls) = flaky(u32::MAX);

        for _ in 0..3 {
            let reading = guard.safe_read().await;
            assert!(!reading.ok);
        }
        assert!(!guard.is_enabled());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        // Fourth call must short-circuit without touching the source
        let reading = guard.safe_read().await;
        assert!(!reading.ok);
        assert_eq!(reading.error.as_deref(), Some("signal_disabled"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_resets_error_count() {
        let (mut guard, _) = flaky(2);

        assert!(!guard.safe_read().await.ok);
        assert!(!guard.safe_read().await.ok);
        assert_eq!(guard.status().error_count, 2);
        assert!(guard.is_enabled());

        let reading = guard.safe_read().await;
        assert!(reading.ok);
        assert_eq!(reading.value, Some(0.42));

        let status = guard.status();
        assert_eq!(status.error_count, 0);
        assert_eq!(status.last_value, Some(0.42));
        assert!(status.last_read_at.is_some());
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let (mut guard, _) = flaky(u32::MAX);
        for _ in 0..3 {
            guard.safe_read().await;
        }
        assert!(!guard.is_enabled());

        guard.reset();
        guard.reset();

        let status = guard.status();
        assert!(status.enabled);
        assert_eq!(status.error_count, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn test_custom_max_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut guard = SignalGuard::new(
            "flaky",
            Box::new(FlakySource {
                fail_first: u32::MAX,
                calls: calls.clone(),
            }),
        )
        .with_max_errors(1);

        guard.safe_read().await;
        assert!(!guard.is_enabled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
