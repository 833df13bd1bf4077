pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export engine and logic types
pub use error::{Error, Result};
pub use events::{CapturingBus, EventBus, LogBus};
pub use logic::{ElementEngine, FindOptions, SearchOptions, SnapshotStore, Validators};

// Export all model types
pub use model::*;

// Export store types
pub use store::{ElementFilter, MemoryStore, PostgresStore, Store};

// Function for integration testing
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with INFO level only (suppress DEBUG logs)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    // Load configuration
    let config = crate::config::AppConfig::load()?;

    // Connect to PostgreSQL
    let database_url = config.database_url()?;
    let postgres_store = crate::store::PostgresStore::new(&database_url).await?;

    // Run migrations
    postgres_store.migrate().await?;

    let engine = Arc::new(ElementEngine::new(
        Arc::new(postgres_store),
        Arc::new(events::LogBus),
        config.data.dir.clone(),
    ));

    // Create router with state
    let app = crate::api::routes::create_router().with_state(engine);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;

    serve(listener, app).await?;

    Ok(())
}
