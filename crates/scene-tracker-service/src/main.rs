//! Scene tracker service entry point.
//!
//! Startup order: CLI → config (validated against the operator schema) →
//! logging → scenes → registry → healthcheck server → bus client →
//! message handler. Shutdown is the two-phase cooperative protocol: flip
//! readiness, stop the handler, drain and disconnect the bus, then stop
//! the healthcheck server.
//!
//! Exit codes: 0 on clean shutdown or a permanent bus failure (the
//! supervisor should not restart), 1 on configuration errors or transient
//! bus failures (the supervisor should restart).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scene_tracker_service::bus::{
    BusClient, LoopbackBroker, ManagedBusClient, DEFAULT_DRAIN_TIMEOUT,
};
use scene_tracker_service::cli::{Cli, Commands};
use scene_tracker_service::config::load_config;
use scene_tracker_service::handler::{MessageHandler, TrackingParams};
use scene_tracker_service::health::{
    bind_health, run_healthcheck_command, serve_health, HealthState,
};
use scene_tracker_service::registry::SceneRegistry;
use scene_tracker_service::scenes::load_scenes;

fn init_logging(level: &str) {
    // "warning" is accepted in config files; the filter speaks "warn".
    let level = if level == "warning" { "warn" } else { level };
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run() -> i32 {
    let cli = Cli::parse();

    // Healthcheck probe mode skips config loading entirely.
    if let Some(Commands::Healthcheck { port, endpoint }) = cli.command {
        return run_healthcheck_command(&endpoint, port).await;
    }

    let (Some(config_path), Some(schema_path)) = (cli.config, cli.schema) else {
        eprintln!("Error: --config and --schema are required in service mode");
        return 1;
    };

    let config = match load_config(&config_path, &schema_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return 1;
        }
    };

    init_logging(&config.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "Tracker service starting");

    let scenes = match load_scenes(&config.scenes, &config.config_dir) {
        Ok(scenes) => scenes,
        Err(e) => {
            error!(error = %e, "Failed to load scenes");
            return 1;
        }
    };

    let mut registry = SceneRegistry::new();
    if let Err(e) = registry.register_scenes(scenes) {
        error!(error = %e, error.kind = e.kind(), "Scene registration failed");
        return 1;
    }
    let registry = Arc::new(registry);
    info!(
        scenes = registry.scene_count(),
        cameras = registry.camera_count(),
        "Scene registry ready"
    );

    // Healthcheck server.
    let health = Arc::new(HealthState::new());
    let listener = match bind_health(config.healthcheck_port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to start healthcheck server");
            return 1;
        }
    };
    let (health_shutdown_tx, health_shutdown_rx) = tokio::sync::oneshot::channel();
    let health_task = tokio::spawn(serve_health(
        listener,
        Arc::clone(&health),
        health_shutdown_rx,
    ));
    health.liveness.store(true, Ordering::SeqCst);

    // Bus client. The deployable broker transport links in here; this
    // build wires the in-process loopback.
    let broker = LoopbackBroker::new();
    let bus = Arc::new(ManagedBusClient::new(broker.transport()));
    info!(
        client_id = bus.client_id(),
        host = %config.bus.host,
        port = config.bus.port,
        insecure = config.bus.insecure,
        transport = "loopback",
        "Bus client initializing"
    );
    if let Err(e) = bus.connect() {
        error!(error = %e, "Initial bus connect failed");
        return 1;
    }

    let handler = Arc::new(MessageHandler::new(
        Arc::clone(&bus) as Arc<dyn BusClient>,
        Arc::clone(&registry),
        config.schema_validation,
        TrackingParams::default(),
    ));
    handler.start();
    health.readiness.store(true, Ordering::SeqCst);
    info!("Tracker service ready");

    shutdown_signal().await;
    info!("Tracker service shutting down gracefully");

    // Phase 1: stop taking traffic, drain in-flight callbacks.
    health.readiness.store(false, Ordering::SeqCst);
    handler.stop();
    bus.disconnect(DEFAULT_DRAIN_TIMEOUT);

    // Phase 2: stop the healthcheck collaborator.
    health.liveness.store(false, Ordering::SeqCst);
    let _ = health_shutdown_tx.send(());
    let _ = health_task.await;

    bus.exit_code()
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}
