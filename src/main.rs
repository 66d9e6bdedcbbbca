//! Tesseract API - HTTP front end for command-line OCR.

mod config;
mod error;
mod image;
mod ocr;
mod routes;
mod staging;

use config::Settings;
use ocr::TesseractCli;
use routes::AppState;
use staging::StagingArea;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tesseract_api=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    info!("Using recognizer {:?} (timeout {:?})", settings.tesseract_path, settings.ocr_timeout);

    // Staging directories, plus anything a previous crash left behind
    let staging = StagingArea::new(&settings.upload_dir, &settings.output_dir);
    staging.ensure_dirs().await?;
    info!("Staging in {:?} and {:?}", staging.upload_dir(), staging.output_dir());
    staging.sweep().await;

    let state = AppState {
        staging: staging.clone(),
        recognizer: Arc::new(TesseractCli::from_settings(&settings)),
    };
    let app = routes::router(state, settings.body_limit_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight requests have drained; nothing is using the staging dirs now.
    staging.sweep().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining requests");
}
