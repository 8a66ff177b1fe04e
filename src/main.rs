use tokio::net::TcpListener;

use stagelink_server::config::{generate_config_template, Config};
use stagelink_server::relay::RelayState;
use stagelink_server::routes;
use stagelink_server::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "stagelink_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "stagelink_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("StageLink relay server v{} starting", env!("CARGO_PKG_VERSION"));

    // Build the relay core and start its liveness sweep
    let relay = RelayState::new(config.relay.clone().unwrap_or_default());
    relay.start();

    let app = routes::build_router(AppState {
        relay: relay.clone(),
    });

    // Bind and serve until a shutdown signal closes the listener
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    relay.stop();
    tracing::info!("StageLink relay server stopped");

    Ok(())
}

/// Resolve on SIGINT (Ctrl+C) or SIGTERM so the listener can close
/// gracefully instead of dying mid-accept.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
