use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use certchain_server::config::{Config, StoreBackend};
use certchain_server::ledger::{HttpLedgerRpc, StaticSignerSource};
use certchain_server::store::{MemoryStore, PgStore, Store};
use certchain_server::{create_router, db, AppState};

/// How often the audit outbox retries records that failed to write.
const OUTBOX_RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certchain_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(ledger = ?config.ledger, backend = ?config.store_backend, "Loaded configuration");

    let store: Arc<dyn Store> = match config.store_backend {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = db::create_pool(url)
                .await
                .context("failed to connect to the database")?;
            db::run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let rpc = Arc::new(HttpLedgerRpc::new(
        config.ledger.rpc_url.clone(),
        config.ledger.friendbot_url.clone(),
    )?);
    let signers = Arc::new(StaticSignerSource::from_secret_hex(
        &config.ledger.service_secret,
    )?);

    let state = AppState::new(&config, store, rpc, signers);
    state
        .artifacts
        .ensure_dirs()
        .await
        .context("failed to create the upload directory")?;

    let worker = tokio::spawn(state.outbox.clone().run(OUTBOX_RETRY_INTERVAL));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("certchain server listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.abort();
    let report = state.outbox.drain().await;
    info!(?report, "Flushed audit outbox");
    let remaining = state.outbox.pending();
    if remaining > 0 {
        error!(remaining, "Audit records still pending at shutdown");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
