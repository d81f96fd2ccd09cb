use imgbucket::{
    api::{router, AppState},
    config::Config,
    error::Result,
    logging,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init();

    let config = Config::from_env()?;
    let state = AppState::new(&config);
    state.store().ensure_root().await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(
        addr = %config.bind_addr(),
        media = %config.media_dir.display(),
        "listening"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}
