use anyhow::Result;
use session_bff::{config::SessionVerification, web, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting session BFF");

    // Load configuration from environment
    let config = session_bff::config::Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        hydra_public_url = %config.hydra_public_url,
        client_id = %config.client_id,
        session_verification = ?config.session_verification,
        cookie_secure = config.cookie_secure,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::new(config)?);

    // Prefetch JWKS so /readyz passes immediately; Hydra may still be starting
    if state.config.session_verification == SessionVerification::Jwks {
        match state.id_token_verifier.prefetch_jwks().await {
            Ok(()) => tracing::info!("JWKS prefetched successfully - readiness check will pass"),
            Err(e) => tracing::warn!(error = %e, "JWKS prefetch failed, will retry on demand"),
        }
    }

    let bind_address = state.config.bind_address();
    let app = web::create_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Session BFF listening on {}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
