//! Connectivity Broker
//!
//! Brokers WebRTC ICE/TURN connectivity credentials for peer-to-peer game
//! sessions and keeps a cloud firewall in sync with the set of active
//! peers.

use cb_service::config::Config;
use cb_service::firewall::{AllowlistService, HttpFirewallClient};
use cb_service::observability::metrics;
use cb_service::providers::{CoturnSessionHandler, SessionHandler};
use cb_service::relay::{EventRelay, RedisEventBridge};
use cb_service::repositories::{
    PgCoturnServerStore, PgGameSessionStore, PgGameUserStatsStore, PgWhitelistStore,
};
use cb_service::routes::{self, AppState};
use cb_service::services::SessionService;
use cb_service::sync::{RedisSyncQueue, SyncCoordinator, SyncWorker};
use cb_service::tasks;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cb_service=debug,tower_http=debug".into());
    let json_logs = std::env::var("JSON_LOGS").is_ok_and(|v| v == "true");
    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting Connectivity Broker");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        firewall_configured = config.firewall.firewall_id.is_some(),
        "Configuration loaded successfully"
    );

    // Install the Prometheus recorder before anything records metrics
    let metrics_handle = metrics::init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    // Initialize database connection pool
    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.postgres_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run database migrations: {}", e);
            e
        })?;

    info!("Database migrations applied");

    // Redis connections: sync channel, event bridge, readiness probe
    let sync_queue = Arc::new(RedisSyncQueue::new(&config.redis.url).await?);
    let event_bridge = Arc::new(RedisEventBridge::new(&config.redis.url).await?);
    let redis_conn = redis::Client::open(config.redis.url.as_str())?
        .get_multiplexed_async_connection()
        .await?;

    // Repositories
    let whitelist = Arc::new(PgWhitelistStore::new(db_pool.clone()));
    let sessions = Arc::new(PgGameSessionStore::new(db_pool.clone()));
    let stats = Arc::new(PgGameUserStatsStore::new(db_pool.clone()));
    let coturn_servers = Arc::new(PgCoturnServerStore::new(db_pool.clone()));

    // Firewall sync engine
    let coordinator = Arc::new(SyncCoordinator::new(
        sync_queue.clone(),
        config.firewall.ack_timeout,
    ));
    let allowlist = Arc::new(AllowlistService::new(
        whitelist.clone(),
        coordinator.clone(),
    ));
    let firewall_client = Arc::new(HttpFirewallClient::new(
        &config.firewall.api_base_url,
        &config.firewall.api_token,
    )?);
    let worker = SyncWorker::new(
        sync_queue.clone(),
        whitelist.clone(),
        firewall_client,
        config.firewall.firewall_id.clone(),
        config.firewall.max_ips_per_rule,
        config.firewall.sync_tick,
    );

    // Relay and session orchestration
    let relay = Arc::new(EventRelay::new(event_bridge));
    let handlers: Vec<Arc<dyn SessionHandler>> = vec![Arc::new(CoturnSessionHandler::new(
        coturn_servers,
        allowlist,
        config.session.token_lifetime,
    ))];
    let session_service = Arc::new(SessionService::new(
        handlers,
        relay.clone(),
        sessions,
        stats,
        config.session.max_session_lifetime,
    ));

    // Background tasks
    let cancel_token = CancellationToken::new();

    let ack_coordinator = coordinator.clone();
    let ack_cancel = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = ack_coordinator.run_ack_listener(ack_cancel).await {
            error!("Sync ack listener terminated: {}", e);
        }
    });

    let bridge_relay = relay.clone();
    let bridge_cancel = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = bridge_relay.run_bridge(bridge_cancel).await {
            error!("Relay bridge terminated: {}", e);
        }
    });

    let worker_cancel = cancel_token.clone();
    tokio::spawn(async move {
        worker.run(worker_cancel).await;
    });

    tokio::spawn(tasks::start_session_expiry_sweep(
        session_service,
        config.session.expiry_sweep_interval,
        cancel_token.clone(),
    ));

    // Parse bind address before moving config
    let bind_address = config.bind_address.clone();

    // Create application state
    let state = Arc::new(AppState {
        pool: db_pool,
        redis: redis_conn,
        config,
    });

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Connectivity Broker listening on {}", addr);

    // Start server with graceful shutdown support
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cancel_token.cancel();

    info!("Connectivity Broker shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
