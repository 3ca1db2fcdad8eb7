use std::sync::Arc;

use enrollment_server::config::Config;
use enrollment_server::io::ImageStore;
use enrollment_server::store::PgStore;
use enrollment_server::token::TokenService;
use enrollment_server::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::from_env()?;

    let store = PgStore::connect(&config.database_url).await?;
    store.ensure_schema().await?;

    let images = ImageStore::new(config.upload_dir.clone());
    images.prepare().await?;

    let tokens = TokenService::new(config.secret_key.as_bytes(), config.token_algorithm()?)?;

    let app = app(AppState {
        store: Arc::new(store),
        tokens: Arc::new(tokens),
        images,
    });

    log::info!("Starting enrollment HTTP server on http://{}", config.bind_addr);
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
