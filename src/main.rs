mod db;
mod error;
mod llm;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::optimize::{LlmOptimizer, OptimizeSettings, Optimizer};
use services::store::{MemoryVersionStore, PgVersionStore, VersionStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let store: Arc<dyn VersionStore> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = db::init_pool(&database_url)
                .await
                .expect("database init failed");
            tracing::info!("using postgres version store");
            Arc::new(PgVersionStore::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; diagrams are kept in memory only");
            Arc::new(MemoryVersionStore::new())
        }
    };

    // Non-fatal: optimization endpoints answer 503 if config is missing.
    let optimizer: Option<Arc<dyn Optimizer>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            let settings = OptimizeSettings::from_env();
            tracing::info!(
                model = client.model(),
                max_tokens = settings.max_tokens,
                temperature = settings.temperature,
                "LLM client initialized"
            );
            Some(Arc::new(LlmOptimizer::new(Arc::new(client), settings)))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured; optimization disabled");
            None
        }
    };

    let state = state::AppState::new(store, optimizer);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "flowvault listening");
    axum::serve(listener, app).await.expect("server failed");
}
