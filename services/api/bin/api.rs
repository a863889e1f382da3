//! Main Entrypoint for the Groundwire API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the session policy and the retrieval client.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use groundwire_api::{
    config::{Config, VoiceBackend},
    router::create_router,
    search::{Retriever, SearchClient},
    state::AppState,
};
use groundwire_core::{
    policy::{SessionPolicy, search_tool_schema},
    variant::{ProviderVariant, RealtimeApi, VoiceAgentApi},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
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

    // --- 3. Build Session Policy and Retrieval Client ---
    let variant: Arc<dyn ProviderVariant> = match config.backend {
        VoiceBackend::Realtime => Arc::new(RealtimeApi),
        VoiceBackend::VoiceAgent => Arc::new(VoiceAgentApi),
    };
    let policy = SessionPolicy::new(
        variant,
        config.instructions.clone(),
        config.voice_choice.clone(),
        config.transcription_model.clone(),
        config.vad.clone(),
        vec![search_tool_schema()],
    )
    .with_temperature(config.temperature)
    .with_max_response_output_tokens(config.max_response_output_tokens);

    let retriever: Arc<dyn Retriever> = Arc::new(SearchClient::new(config.search.clone()));

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        policy: Arc::new(policy),
        retriever,
    });

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = create_router(app_state).layer(cors);

    // --- 5. Start Server ---
    info!(
        backend = ?config.backend,
        search_index = %config.search.index,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
