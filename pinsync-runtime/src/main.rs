use std::sync::Arc;

use anyhow::Context;
use pinsync::config::Config;
use pinsync::main_loop::reconcile_loop;
use pinsync::source_client::SourceClient;
use pinsync::store_client::StoreClient;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG may come from .env, so load it before building the filter.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            tracing::warn!("Ignoring unreadable .env file: {}", e);
        }
    }

    tracing::info!("Starting pinsync runtime");

    let config = Config::from_env().context("Failed to load configuration")?;

    let source: Arc<dyn SourceClient> =
        Arc::new(config.github_client().context("Failed to build GitHub client")?);
    let store: Arc<dyn StoreClient> =
        Arc::new(config.strapi_client().context("Failed to build Strapi client")?);

    tracing::info!(
        login = %config.github_login,
        store = %config.strapi_api_url,
        "Clients initialized"
    );

    let cancel = CancellationToken::new();
    let reconciler = tokio::spawn(reconcile_loop(
        source,
        store,
        config.sync_interval,
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Received Ctrl-C, shutting down...");

    cancel.cancel();
    reconciler.await.context("Reconcile loop panicked")?;

    Ok(())
}
