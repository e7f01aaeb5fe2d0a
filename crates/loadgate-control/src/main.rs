//! Loadgate daemon
//!
//! Composition root: wires the metrics store, signals, policies, and
//! actuators into an orchestrator and drives the control loop until ctrl-c.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loadgate_common::VERSION;
use loadgate_control::actuator::{BatchSizeActuator, ConcurrencyLimitActuator, ThreadRngSampler};
use loadgate_control::clock::SystemClock;
use loadgate_control::config::ControllerConfig;
use loadgate_control::orchestrator::Orchestrator;
use loadgate_control::policy::{AimdPolicy, PidLitePolicy};
use loadgate_control::signal::{P95LatencySignal, QueueDepthSignal, SignalGuard};
use loadgate_control::store::{InMemoryMetricsStore, MetricsStore, RedisMetricsStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting loadgate controller v{}", VERSION);

    let config = ControllerConfig::load()?;
    info!("Loaded configuration: {:?}", config);

    let store: Arc<dyn MetricsStore> = match &config.redis_url {
        Some(url) => {
            info!(url = %url, "using redis metrics store");
            Arc::new(RedisMetricsStore::new(url).await?)
        }
        None => {
            info!("no redis url configured, using in-memory metrics store");
            Arc::new(InMemoryMetricsStore::new())
        }
    };

    let clock = Arc::new(SystemClock);

    let orchestrator = Orchestrator::new(
        config.history_capacity,
        Duration::from_secs(config.tick_interval_secs),
    );

    orchestrator
        .add_signal(
            SignalGuard::new(
                "p95_latency",
                Box::new(P95LatencySignal::new(
                    store.clone(),
                    &config.signals.latency,
                )),
            )
            .with_max_errors(config.signals.latency.max_errors),
        )
        .await;
    orchestrator
        .add_signal(
            SignalGuard::new(
                "queue_depth",
                Box::new(QueueDepthSignal::new(store.clone(), &config.signals.queue)),
            )
            .with_max_errors(config.signals.queue.max_errors),
        )
        .await;

    orchestrator
        .add_policy(Box::new(AimdPolicy::new(
            &config.policies.aimd,
            clock.clone(),
        )))
        .await;
    orchestrator
        .add_policy(Box::new(PidLitePolicy::new(&config.policies.pid, clock)))
        .await;
    if config.policies.active != "aimd" {
        orchestrator.set_policy(&config.policies.active).await?;
    }

    orchestrator
        .add_actuator(Box::new(ConcurrencyLimitActuator::new(
            &config.actuators.concurrency,
            Box::new(ThreadRngSampler),
        )))
        .await;
    orchestrator
        .add_actuator(Box::new(BatchSizeActuator::new(
            &config.actuators.batch,
            Box::new(ThreadRngSampler),
        )))
        .await;

    let status = orchestrator.status().await;
    info!(
        active_policy = %status.active_policy,
        signals = ?status.enabled_signals,
        actuators = ?status.enabled_actuators,
        "controller initialized"
    );

    tokio::select! {
        _ = orchestrator.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    let status = orchestrator.status().await;
    info!(
        ticks = status.tick_count,
        decisions = status.decision_count,
        "Shutting down loadgate controller"
    );
    Ok(())
}
