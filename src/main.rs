use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_owner::config::Config;
use feed_owner::engine::{EngineConfig, OwnershipEngine};
use feed_owner::feed::BotApiClient;
use feed_owner::offset::FileOffsetStore;
use feed_owner::runner::LogUpdateHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_owner=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let token = config.require_token()?.clone();
    let client = BotApiClient::new(&config.api_base, token, config.account.proxy.as_deref())
        .context("failed to build HTTP client")?;
    let store = Arc::new(FileOffsetStore::new(&config.state_dir));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                on_signal.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });

    let engine = OwnershipEngine::new(
        config.account,
        client,
        store,
        Arc::new(LogUpdateHandler),
        EngineConfig::default().with_concurrency(config.max_concurrent),
        cancel,
    );

    let state = engine.run().await?;
    tracing::info!(
        last_update_id = ?state.last_update_id,
        restarts = state.restart_attempts,
        conflicts = state.conflict_attempts,
        "Exiting"
    );
    Ok(())
}
