//! # Lighthouse Audit Service
//!
//! Reads its configuration from the environment (and `.env`), waits for
//! PostgreSQL, applies migrations and serves the audit API until Ctrl+C or
//! SIGTERM.

use lighthouse_audit_service::{start_server, ServerOptions};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lighthouse_audit_service=debug,tower_http=info,sqlx=warn".into()
            }),
        )
        .init();

    let options = ServerOptions::from_env();
    info!(port = options.port, cors = options.cors, "Starting Lighthouse audit service");

    let log = tracing::info_span!("las", port = options.port);
    let server = start_server(&options, None, log).await?;

    shutdown_signal().await;
    server.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting shutdown");
        }
    }
}
