use meme_marketplace::{config::Config, errors::AppError, routes::create_router, startup};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Config first: it loads .env, which may carry RUST_LOG.
    let config = Config::load()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "meme_marketplace=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_address = config.bind_address;
    tracing::info!(backend = ?config.storage_backend, "Starting meme marketplace");

    let state = startup::build_state(config).await?;
    startup::seed(&state).await?;

    let app = create_router(Arc::new(state));

    tracing::info!("Server listening on http://{}", bind_address);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
