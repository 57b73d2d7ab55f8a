mod config;
mod db;
mod routes;
mod services;
mod state;
mod store;

use std::sync::Arc;

use config::{ServerConfig, StoreKind};
use store::{BoardStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env().expect("invalid configuration");

    let store: Arc<dyn BoardStore> = match (config.store, config.database_url.as_deref()) {
        (StoreKind::Postgres, Some(database_url)) => {
            let pool = db::init_pool(database_url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgStore::new(pool, config.layer_max_bytes))
        }
        _ => {
            tracing::warn!("using in-memory store; boards are lost on restart");
            Arc::new(MemoryStore::new(config.layer_max_bytes))
        }
    };

    let port = config.port;
    tracing::info!(
        %port,
        store = ?config.store,
        layers = config.board_layer_count,
        layer_max_bytes = config.layer_max_bytes,
        "layerboard configured"
    );

    let state = state::AppState::new(store, config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "layerboard listening");
    axum::serve(listener, app).await.expect("server failed");
}
