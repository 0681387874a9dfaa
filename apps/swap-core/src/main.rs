//! Swap Orchestration Core Binary
//!
//! Starts the Order Monitor, DCA Scheduler, and Limit-Order Worker alongside
//! the boundary REST API.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin swap-core
//! ```
//!
//! # Environment Variables
//!
//! - `SWAP_CORE_CONFIG`: path to the YAML config file (default `config.yaml`)
//! - `RUST_LOG`: log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use swap_core::application::ports::{NoOpNotifier, NotifierPort, OrderTracker};
use swap_core::infrastructure::auth::JwtVerifier;
use swap_core::infrastructure::config;
use swap_core::infrastructure::persistence::{
    SwapDatabase, TursoAdminLedger, TursoDcaPlanRepository, TursoLimitOrderRepository, TursoOrderRepository,
    TursoPriceSnapshotRepository, TursoUserRepository,
};
use swap_core::{
    AppState, DcaScheduler, HttpAggregatorClient, LimitOrderSettlementListener, LimitOrderWorker, OrderMonitor,
    build_router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }

    swap_core::infrastructure::telemetry::init();

    tracing::info!("starting swap orchestration core");

    let config_path = std::env::var("SWAP_CORE_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = match config::load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(path = %config_path, error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        bind = %config.server.bind_address,
        port = config.server.port,
        database = %config.database.url,
        "configuration loaded"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let db = SwapDatabase::new_local(&config.database.url).await?;

    let order_repo = Arc::new(TursoOrderRepository::new(db.clone()));
    let dca_repo = Arc::new(TursoDcaPlanRepository::new(db.clone()));
    let limit_repo = Arc::new(TursoLimitOrderRepository::new(db.clone()));
    let price_repo = Arc::new(TursoPriceSnapshotRepository::new(db.clone()));
    let user_repo = Arc::new(TursoUserRepository::new(db.clone()));
    let admin_ledger = Arc::new(TursoAdminLedger::new(db.clone()));

    let aggregator: Arc<dyn swap_core::AggregatorPort> =
        Arc::new(HttpAggregatorClient::new(config.aggregator.to_client_config())?);

    let notifier: Arc<dyn NotifierPort> = Arc::new(NoOpNotifier);

    let monitor = Arc::new(OrderMonitor::new(
        Arc::clone(&aggregator),
        Arc::clone(&order_repo) as _,
        Arc::clone(&order_repo) as _,
        Arc::clone(&order_repo) as _,
        config.monitor.to_monitor_config(),
    ));

    let loaded = monitor.load_pending().await?;
    tracing::info!(loaded, "seeded order monitor from persisted state");

    monitor.subscribe(Arc::new(LimitOrderSettlementListener::new(Arc::clone(&limit_repo) as _))).await;

    let tracker: Arc<dyn OrderTracker> = Arc::clone(&monitor) as _;

    let dca_scheduler = Arc::new(DcaScheduler::new(
        Arc::clone(&dca_repo) as _,
        Arc::clone(&user_repo) as _,
        Arc::clone(&aggregator),
        Arc::clone(&tracker),
        config.dca.to_scheduler_config(),
    ));

    let limit_worker = Arc::new(LimitOrderWorker::new(
        Arc::clone(&limit_repo) as _,
        Arc::clone(&order_repo) as _,
        Arc::clone(&price_repo) as _,
        Arc::clone(&user_repo) as _,
        Arc::clone(&aggregator),
        Arc::clone(&tracker),
        Arc::clone(&notifier),
        config.limit.to_worker_config(),
    ));

    monitor.start().await;
    dca_scheduler.start().await;
    limit_worker.start().await;

    tracing::info!("order monitor, dca scheduler, and limit-order worker started");

    let jwt = Arc::new(JwtVerifier::new(config.auth.token_issuer.clone(), config.auth.jwks_url.clone()));

    let state = AppState { orders: Arc::clone(&order_repo), users: Arc::clone(&user_repo), admin_ledger, jwt };
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.bind_address, config.server.port).parse()?;

    tracing::info!(%addr, "http server starting");
    tracing::info!("endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /api/swap-history");
    tracing::info!("  POST /api/chat/history");
    tracing::info!("  GET  /api/user/settings");
    tracing::info!("  POST /api/admin/coins/adjust");
    tracing::info!("  GET  /api/admin/coins/stats");
    tracing::info!("  POST /api/admin/coins/gift-all");

    let listener = TcpListener::bind(addr).await?;
    let http_server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()));

    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.await {
            tracing::error!("http server error: {e}");
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::info!("http server stopped");
        }
    }

    monitor.stop().await;
    dca_scheduler.stop().await;
    limit_worker.stop().await;

    tracing::info!("swap orchestration core stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    let _ = shutdown_tx.send(());

    tracing::info!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "graceful shutdown started");
}
