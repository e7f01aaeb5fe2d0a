//! Queue depth signal

use super::SignalSource;
use crate::config::QueueSignalSettings;
use crate::store::MetricsStore;
use async_trait::async_trait;
use loadgate_common::{Result, NEUTRAL_SIGNAL_VALUE};
use std::sync::Arc;

/// Reads the current depth of one work queue and normalizes against the
/// depth treated as saturation: 1.0 means the queue is full.
///
/// A missing key on a reachable backend is the neutral value, not a failure.
pub struct QueueDepthSignal {
    store: Arc<dyn MetricsStore>,
    key: String,
    max_depth: f64,
}

impl QueueDepthSignal {
    pub fn new(store: Arc<dyn MetricsStore>, settings: &QueueSignalSettings) -> Self {
        Self {
            store,
            key: settings.key.clone(),
            max_depth: settings.max_depth,
        }
    }
}

#[async_trait]
impl SignalSource for QueueDepthSignal {
    async fn read(&self) -> Result<f64> {
        match self.store.read_gauge(&self.key).await? {
            Some(depth) => Ok(depth / self.max_depth),
            None => Ok(NEUTRAL_SIGNAL_VALUE),
        }
    }
}
