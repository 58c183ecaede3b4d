use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use beacon_core::{
    logging, Config, EventPublisher, InMemoryMetadataStore, SharedHealthCheckConfig,
    TaskExecuteEngine,
};
use beacon_naming::{AlwaysResponsible, ClientManager, HealthCheckContext, HealthCheckReactor};

#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(about = "Beacon service registry node", long_about = None)]
struct Args {
    /// Path to a YAML or TOML configuration file
    #[arg(long, env = "BEACON_CONFIG")]
    config: Option<String>,

    /// Node ID (auto-generated from hostname if not provided)
    #[arg(long, env = "BEACON_NODE_ID")]
    node_id: Option<String>,
}

/// Generate a node id from the hostname plus a random suffix
fn generate_node_id() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let suffix = nanoid::nanoid!(6);

    format!("{hostname}-{suffix}")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration (fail fast on misconfigurations)
    let config = Config::load_validated(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    let node_id = args.node_id.unwrap_or_else(generate_node_id);
    info!(node_id = %node_id, "Beacon node starting...");
    if config.health_check.has_inverted_timeouts() {
        warn!(
            heart_beat_timeout_ms = config.health_check.default_heart_beat_timeout_ms,
            ip_delete_timeout_ms = config.health_check.default_ip_delete_timeout_ms,
            "Unhealthy timeout exceeds delete timeout; instances will be evicted before being marked unhealthy"
        );
    }

    // 3. Event publisher
    let publisher = EventPublisher::default();
    let event_log = spawn_event_logger(&publisher);
    let sink = Arc::new(publisher);

    // 4. Registry state
    let health_config = SharedHealthCheckConfig::new(config.health_check.clone());
    let metadata = Arc::new(InMemoryMetadataStore::new());
    let clients = Arc::new(ClientManager::new(sink.clone()));

    // 5. Task engine and health checking
    let engine = Arc::new(TaskExecuteEngine::from_config(&config.engine));

    let context = Arc::new(HealthCheckContext::with_defaults(
        metadata,
        sink,
        health_config.clone(),
        Arc::new(AlwaysResponsible),
    ));
    let reactor = HealthCheckReactor::new(clients.clone(), engine.clone(), context, health_config);
    let reactor_handle = reactor.start();

    info!(
        node_id = %node_id,
        workers = engine.workers_count(),
        "Beacon node started"
    );

    // 6. Run until signalled
    shutdown_signal().await;
    info!("Shutting down gracefully...");

    reactor.shutdown();
    if let Err(e) = reactor_handle.await {
        error!("Health check reactor terminated abnormally: {}", e);
    }

    if let Err(e) = engine.shutdown() {
        error!("Task engine shutdown reported failures: {}", e);
    }
    engine.join().await;
    debug!(status = %engine.workers_status(), "Task workers stopped");

    event_log.abort();
    info!(clients = clients.len(), "Beacon node stopped");
    Ok(())
}

/// Log every registry event at debug level
fn spawn_event_logger(publisher: &EventPublisher) -> tokio::task::JoinHandle<()> {
    let mut events = publisher.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    debug!(event_type = event.event_type(), event = ?event, "Naming event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind");
                }
                Err(RecvError::Closed) => return,
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
