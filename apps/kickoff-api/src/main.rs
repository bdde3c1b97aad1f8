use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kickoff_api::config::Config;
use kickoff_api::store::PgStore;
use kickoff_api::AppState;
use kickoff_common::SnowflakeGenerator;

#[tokio::main]
async fn main() {
    // Load .env if present; env vars may also be set externally.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = match kickoff_api::db::pool::connect(&config.database_url).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(%err, "database unavailable, refusing to start");
            std::process::exit(1);
        }
    };

    let snowflake = Arc::new(SnowflakeGenerator::new(config.worker_id));
    let store = Arc::new(PgStore::new(db, snowflake));

    tracing::info!(
        worker_id = config.worker_id,
        outbound_capacity = config.gateway.outbound_capacity,
        allow_zone_change = config.gateway.allow_zone_change,
        "kickoff-api configured"
    );

    let state = AppState::new(config, store);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(kickoff_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "kickoff-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
