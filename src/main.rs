//! Watcher binary — wires the subscription store, the YouTube source client
//! and the Discord notifier, then runs the poll scheduler until ctrl-c.
//!
//! Required env: YOUTUBE_API_KEY, DISCORD_BOT_TOKEN. Everything else has
//! defaults; see `config.rs`.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use channel_update_notifier::notify::discord::DiscordNotifier;
use channel_update_notifier::source::youtube::YouTubeClient;
use channel_update_notifier::{
    Notifier, SourceClient, SubscriptionStore, WatchConfig, WatchService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cfg = WatchConfig::from_env();
    tracing::info!(
        poll_interval_secs = cfg.poll_interval.as_secs(),
        state_path = %cfg.state_path.display(),
        "starting watcher"
    );

    let store = Arc::new(
        SubscriptionStore::open(&cfg.state_path)
            .await
            .context("opening subscription store")?,
    );
    let source: Arc<dyn SourceClient> =
        Arc::new(YouTubeClient::from_env().context("configuring youtube client")?);
    let notifier: Arc<dyn Notifier> =
        Arc::new(DiscordNotifier::from_env().context("configuring discord notifier")?);

    let service = WatchService::new(store, source, notifier, cfg);
    let scheduler = service.spawn_scheduler();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    tracing::info!("shutting down");
    scheduler.abort();
    Ok(())
}
