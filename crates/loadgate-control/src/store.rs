//! Metrics/state store client
//!
//! Signals read live load data from a key-value/sorted-set capable store:
//! a range query over timestamp-scored latency samples, and a point read of
//! a single numeric key. Unreachability surfaces as an error so the signal
//! read path can count it toward auto-disable, never a silent default.

use async_trait::async_trait;
use dashmap::DashMap;
use loadgate_common::{LoadgateError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Read-side contract the signals consume
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Latency samples (milliseconds) with timestamp score in
    /// `[from_ms, to_ms]`, oldest first
    async fn latency_samples(&self, key: &str, from_ms: i64, to_ms: i64) -> Result<Vec<f64>>;

    /// Point read of a single numeric key; `None` when the key is absent
    async fn read_gauge(&self, key: &str) -> Result<Option<f64>>;
}

/// Redis-backed metrics store.
///
/// Latency samples live in a sorted set scored by Unix-millis timestamp;
/// members are `"<value>"` or `"<value>:<nonce>"` (the nonce keeps
/// duplicate readings distinct). Gauges are plain numeric keys.
pub struct RedisMetricsStore {
    client: Client,
    connection: Arc<RwLock<Option<MultiplexedConnection>>>,
}

impl RedisMetricsStore {
    /// Connect to Redis and hold a multiplexed connection
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| LoadgateError::Config(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LoadgateError::Store(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client,
            connection: Arc::new(RwLock::new(Some(connection))),
        })
    }

    /// Get a connection, reconnecting if the cached one was dropped
    async fn get_connection(&self) -> Result<MultiplexedConnection> {
        let guard = self.connection.read().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        drop(guard);

        let mut guard = self.connection.write().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LoadgateError::Store(format!("Failed to reconnect to Redis: {}", e)))?;

        *guard = Some(connection.clone());
        Ok(connection)
    }
}

#[async_trait]
impl MetricsStore for RedisMetricsStore {
    async fn latency_samples(&self, key: &str, from_ms: i64, to_ms: i64) -> Result<Vec<f64>> {
        let mut conn = self.get_connection().await?;

        let members: Vec<String> = conn
            .zrangebyscore(key, from_ms, to_ms)
            .await
            .map_err(|e| LoadgateError::Store(format!("Redis ZRANGEBYSCORE failed: {}", e)))?;

        let mut samples = Vec::with_capacity(members.len());
        for member in &members {
            let raw = member.split(':').next().unwrap_or(member);
            match raw.parse::<f64>() {
                Ok(v) => samples.push(v),
                Err(_) => warn!(key, member = %member, "skipping unparseable latency sample"),
            }
        }

        debug!(key, count = samples.len(), "fetched latency window");
        Ok(samples)
    }

    async fn read_gauge(&self, key: &str) -> Result<Option<f64>> {
        let mut conn = self.get_connection().await?;

        let value: Option<f64> = conn
            .get(key)
            .await
            .map_err(|e| LoadgateError::Store(format!("Redis GET failed: {}", e)))?;

        Ok(value)
    }
}

/// In-memory metrics store for tests and local runs.
///
/// `set_unreachable(true)` makes every read fail, simulating a crashed
/// backend for the auto-disable path.
#[derive(Default)]
pub struct InMemoryMetricsStore {
    samples: DashMap<String, Vec<(i64, f64)>>,
    gauges: DashMap<String, f64>,
    unreachable: AtomicBool,
}

impl InMemoryMetricsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one latency sample at the given Unix-millis timestamp
    pub fn record_latency(&self, key: &str, ts_ms: i64, value_ms: f64) {
        self.samples
            .entry(key.to_string())
            .or_default()
            .push((ts_ms, value_ms));
    }

    /// Set a gauge value
    pub fn set_gauge(&self, key: &str, value: f64) {
        self.gauges.insert(key.to_string(), value);
    }

    /// Remove a gauge
    pub fn clear_gauge(&self, key: &str) {
        self.gauges.remove(key);
    }

    /// Make every subsequent read fail (or recover)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(LoadgateError::Store(
                "in-memory store marked unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn latency_samples(&self, key: &str, from_ms: i64, to_ms: i64) -> Result<Vec<f64>> {
        self.check_reachable()?;

        let samples = self
            .samples
            .get(key)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|(ts, _)| *ts >= from_ms && *ts <= to_ms)
                    .map(|(_, v)| *v)
                    .collect()
            })
            .unwrap_or_default();

        Ok(samples)
    }

    async fn read_gauge(&self, key: &str) -> Result<Option<f64>> {
        self.check_reachable()?;
        Ok(self.gauges.get(key).map(|v| *v))
    }
}
