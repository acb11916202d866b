use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photo_archive_server::{create_router, utils::cli::Cli, utils::config::AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photo_archive_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting photo archive server");

    // Load configuration
    let config = AppConfig::from_env().with_cli(&cli);
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(config.clone());

    if !app_state.locator.root_exists().await {
        tracing::warn!(
            "Photos directory {} does not exist; every archive request will 404",
            config.photos_dir.display()
        );
    }

    match app_state.archiver.resolve() {
        Some(path) => tracing::info!("Using archiver at {}", path.display()),
        None => tracing::warn!(
            "Archiver '{}' not found; archive requests will fail",
            config.archiver
        ),
    }

    let shutdown = app_state.shutdown.clone();
    let app = create_router(app_state);

    // Parse the bind address
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Ends in-flight archive streams so their archivers are killed
            // instead of holding the shutdown open.
            shutdown.cancel();
        })
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
