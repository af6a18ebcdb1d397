//! Main Entrypoint for the Avatar API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the viewer page template.
//! 3. Building the remote transport and the shared avatar clients.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use avatar_api::{config::Config, router::create_router, state::AppState};
use avatar_core::{
    transport::{HttpTransport, Transport},
    viewer::ViewerTemplate,
};
use secrecy::{ExposeSecret, SecretString};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Load the Viewer Template ---
    let viewer = ViewerTemplate::load(&config.viewer_template_path).with_context(|| {
        format!(
            "Failed to read viewer template at {}",
            config.viewer_template_path.display()
        )
    })?;
    let missing = viewer.missing_placeholders();
    if !missing.is_empty() {
        warn!(?missing, "Viewer template lacks placeholders; the page will not connect");
    }

    // --- 4. Initialize Shared Clients ---
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
        &config.base_url,
        SecretString::from(config.api_key.expose_secret().to_owned()),
        config.request_timeout,
    )?);

    let base_url = config.base_url.clone();
    let bind_address = config.bind_address;
    let app_state = Arc::new(AppState::new(config, transport, viewer));
    let capability = app_state.backend.capability();
    let live_streaming = app_state.backend.supports_live_streaming();
    let batch_render = app_state.backend.supports_batch_render();

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        capability = %capability,
        live_streaming,
        batch_render,
        base_url = %base_url,
        bind_address = %bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
