use axum::serve;
use mbee_core::api::routes::create_router;
use mbee_core::config::AppConfig;
use mbee_core::events::LogBus;
use mbee_core::logic::ElementEngine;
use mbee_core::store::PostgresStore;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Initialize logging with explicit filter to suppress sqlx debug logs
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .init();

    println!("MBEE Core: Model Element Server");

    // Load configuration
    let config = AppConfig::load()?;
    println!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    println!("Connecting to PostgreSQL...");
    let database_url = config.database_url()?;
    let postgres_store = PostgresStore::new(&database_url).await?;

    println!("Running database migrations...");
    postgres_store.migrate().await?;
    println!("Database ready");

    let engine = Arc::new(ElementEngine::new(
        Arc::new(postgres_store),
        Arc::new(LogBus),
        config.data.dir.clone(),
    ));

    run_server(create_router().with_state(engine), &config).await?;

    Ok(())
}

async fn run_server(app: axum::Router, config: &AppConfig) -> anyhow::Result<()> {
    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    println!("MBEE Core server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
