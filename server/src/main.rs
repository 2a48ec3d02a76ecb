use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tether_server::config::{generate_config_template, Config};
use tether_server::connections::sweeper::spawn_expiry_sweeper;
use tether_server::routes;
use tether_server::state::AppState;
use tether_server::users::cache;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging; RUST_LOG wins over --log-level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_filter())?,
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Tether server v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        session_timeout = config.session_timeout,
        sweep_interval_secs = config.sweep_interval_secs,
        user_cache = %config.user_cache,
        user_management = config.user_management,
        "Effective configuration"
    );

    let state = AppState::from_config(&config);

    // A broken cache file shouldn't keep the server down; the cache ops will report it again.
    if config.preload_user_cache {
        if let Err(e) = cache::preload(&state.user_cache, &state.users).await {
            tracing::warn!("Failed to preload user cache {}: {}", config.user_cache, e);
        }
    }

    let sweeper = spawn_expiry_sweeper(
        state.connections.clone(),
        config.session_timeout,
        config.sweep_interval_secs,
    );

    // Build router
    let app = routes::build_router(state);

    // Bind and serve
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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

    tracing::info!("Shutdown signal received");
}
