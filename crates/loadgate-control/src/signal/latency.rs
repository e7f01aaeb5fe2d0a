//! Trailing-window P95 latency signal

use super::SignalSource;
use crate::config::LatencySignalSettings;
use crate::store::MetricsStore;
use async_trait::async_trait;
use chrono::Utc;
use loadgate_common::{Result, NEUTRAL_SIGNAL_VALUE};
use std::sync::Arc;

/// Reads a trailing window of request latencies from the metrics store,
/// computes the 95th percentile by nearest rank, and normalizes against the
/// latency target: a reading of 1.0 means p95 sits exactly at target.
///
/// An unreachable backend propagates as an error (the guard counts it); a
/// reachable backend with an empty window yields the neutral value instead.
pub struct P95LatencySignal {
    store: Arc<dyn MetricsStore>,
    key: String,
    window_ms: i64,
    target_ms: f64,
}

impl P95LatencySignal {
    pub fn new(store: Arc<dyn MetricsStore>, settings: &LatencySignalSettings) -> Self {
        Self {
            store,
            key: settings.key.clone(),
            window_ms: settings.window_secs as i64 * 1000,
            target_ms: settings.target_p95_ms,
        }
    }
}

#[async_trait]
impl SignalSource for P95LatencySignal {
    async fn read(&self) -> Result<f64> {
        let now = Utc::now().timestamp_millis();
        let from = now - self.window_ms;

        let mut samples = self.store.latency_samples(&self.key, from, now).await?;
        if samples.is_empty() {
            return Ok(NEUTRAL_SIGNAL_VALUE);
        }

        Ok(nearest_rank_p95(&mut samples) / self.target_ms)
    }
}

/// 95th percentile by nearest rank: the ceil(0.95·n)-th smallest sample
fn nearest_rank_p95(samples: &mut [f64]) -> f64 {
    samples.sort_by(f64::total_cmp);
    let rank = ((samples.len() as f64) * 0.95).ceil() as usize;
    samples[rank.clamp(1, samples.len()) - 1]
}
