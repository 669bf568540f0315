mod config;
mod scheduler;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use rollcall_api::auth::{AppState, AppStateInner};
use rollcall_db::Database;
use rollcall_proof::ProofVerifier;
use rollcall_proof::token::CheckinTokens;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        verifier: ProofVerifier::new(CheckinTokens::new(config.jwt_secret.as_bytes())),
        jwt_secret: config.jwt_secret.clone(),
        public_url: config.public_url.clone(),
    });

    // Scheduler
    let status_task = tokio::spawn(scheduler::run_status_loop(db.clone(), config.status_tick));
    let daily_task = tokio::spawn(scheduler::run_daily_loop(
        db.clone(),
        config.daily_at,
        config.retention_days,
    ));
    info!(
        "Scheduler started: status every {}s, daily run at {}",
        config.status_tick.as_secs(),
        config.daily_at
    );

    let app = rollcall_api::router(app_state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Rollcall server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    status_task.abort();
    daily_task.abort();
    info!("Rollcall server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
