// SPDX-FileCopyrightText: 2026 Noema Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `noema serve` command implementation.
//!
//! Constructs every component explicitly at startup — storage, providers,
//! cache, bus, broker, pipeline, gateway — and wires them together; no
//! globals. Shutdown is cooperative: a signal stops the consumer from
//! polling, in-flight pipeline runs get the configured drain deadline, and
//! anything force-cancelled is recovered later by the sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use noema_broker::{ThoughtConsumer, ThoughtProducer, WorkHandler};
use noema_bus::RedisBus;
use noema_cache::SemanticCache;
use noema_config::NoemaConfig;
use noema_core::{NoemaError, ProgressBus};
use noema_gateway::{ConnectionGauge, GatewayState};
use noema_pipeline::{Orchestrator, StageRunner, Sweeper};
use noema_providers::build_providers;
use noema_storage::{Database, ThoughtStore, UserStore};

/// Runs the `noema serve` command until a shutdown signal.
pub async fn run_serve(config: NoemaConfig) -> Result<(), NoemaError> {
    init_tracing(&config.runtime.log_level);
    info!("starting noema serve");

    // Storage.
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;
    let sink = ThoughtStore::new(&db);
    let users = UserStore::new(&db);

    // Providers.
    let providers = build_providers(&config.provider, config.cache.embedding_dimension)?;
    let cache = Arc::new(SemanticCache::new(
        &db,
        config.cache.clone(),
        providers.embedder.clone(),
    ));

    // Fan-out bus.
    let bus: Arc<dyn ProgressBus> = Arc::new(
        RedisBus::connect(&config.fanout.bus_url, config.fanout.channel_prefix.clone()).await?,
    );

    // Broker.
    let producer = Arc::new(ThoughtProducer::new(&config.broker)?);

    // Pipeline.
    let grace_seconds = config.pipeline.stuck_grace_minutes * 60;
    let runner = StageRunner::new(
        providers.chat.clone(),
        config.provider.max_output_tokens,
        config.pipeline.agent_internal_retries,
    );
    let orchestrator = Arc::new(Orchestrator::new(
        sink.clone(),
        users.clone(),
        cache.clone(),
        runner,
        bus.clone(),
        grace_seconds,
    ));

    let consumer = ThoughtConsumer::new(
        &config.broker,
        &config.pipeline,
        producer.clone(),
        bus.clone(),
        sink.clone(),
    )?;

    // When the producer is disabled, the sweeper drives recovered work
    // orders through the orchestrator directly (batch fallback).
    let fallback: Option<Arc<dyn WorkHandler>> = if producer.is_enabled() {
        None
    } else {
        Some(orchestrator.clone() as Arc<dyn WorkHandler>)
    };
    let sweeper = Arc::new(Sweeper::new(
        sink.clone(),
        producer.clone(),
        bus.clone(),
        fallback,
        Duration::from_secs(config.pipeline.sweep_interval_seconds),
        grace_seconds,
        config.pipeline.pipeline_max_attempts,
    ));

    // Gateway.
    let gateway_state = GatewayState {
        sink: sink.clone(),
        producer: producer.clone(),
        bus: bus.clone(),
        connections: Arc::new(ConnectionGauge::new(
            config.fanout.max_connections_per_instance,
        )),
        heartbeat: Duration::from_secs(config.fanout.heartbeat_interval_seconds),
        start_time: Instant::now(),
    };

    // Shutdown plumbing.
    let shutdown = install_signal_handler();
    let drain = Duration::from_secs(config.pipeline.drain_seconds);

    let consumer_token = shutdown.clone();
    let handler: Arc<dyn WorkHandler> = orchestrator;
    let mut consumer_task = tokio::spawn(async move {
        if let Err(e) = consumer.run(handler, consumer_token).await {
            error!(error = %e, "consumer loop failed");
        }
    });

    let sweeper_token = shutdown.clone();
    let sweeper_task = tokio::spawn(async move {
        sweeper.run(sweeper_token).await;
    });

    let gateway_token = shutdown.clone();
    let host = config.gateway.host.clone();
    let port = config.gateway.port;
    let gateway_task = tokio::spawn(async move {
        if let Err(e) = noema_gateway::start_server(&host, port, gateway_state, gateway_token).await
        {
            error!(error = %e, "gateway failed");
        }
    });

    info!("noema serve running; press Ctrl+C to stop");
    shutdown.cancelled().await;

    // Drain: the consumer finishes its in-flight run, then exits its loop.
    // Past the deadline, the run is force-cancelled; the row stays in
    // `processing` and the sweeper re-drives it.
    info!(drain_s = drain.as_secs(), "shutdown signal received; draining in-flight work");
    if tokio::time::timeout(drain, &mut consumer_task).await.is_err() {
        warn!("drain deadline exceeded; force-cancelling the consumer");
        consumer_task.abort();
    }

    let _ = sweeper_task.await;
    let _ = gateway_task.await;

    db.close().await?;
    info!("noema serve stopped");
    Ok(())
}

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] cancelled when either signal arrives.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
                _ = sigterm.recv() => {
                    info!("received SIGTERM, initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("noema={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
