use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use npat::{api, broadcast, llm, referee::ValidationGateway, state::AppState, types::GameSettings};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "npat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Name Place Animal Thing server...");

    let settings = GameSettings::from_env();
    tracing::info!(
        "Rounds: {} x {:?}, settle {:?}",
        settings.default_rounds,
        settings.round_time,
        settings.settle_delay
    );

    // Arbiter chain; without any provider the game runs on the heuristic alone
    let arbiter_config = llm::ArbiterConfig::from_env();
    let referee = match arbiter_config.build_manager() {
        Ok(manager) => ValidationGateway::from_config(&arbiter_config, &manager),
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM providers: {}. Answers will only be checked for the starting letter.",
                e
            );
            ValidationGateway::offline()
        }
    };
    tracing::info!("Referee chain: {}", referee.tier_names().join(" -> "));

    let state = Arc::new(AppState::new(referee, settings));

    broadcast::spawn_room_reaper(state.clone());

    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid BIND_ADDR '{}': {}", bind, e);
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
