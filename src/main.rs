//! MailDropHQ backend - HTTP server entry point.

use maildrophq::{api, Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maildrophq=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(
        "Loaded configuration: cooldown={}s, upstream_timeout={}s, mailbox_ttl={}s",
        config.provider_cooldown.as_secs(),
        config.upstream_timeout.as_secs(),
        config.mailbox_ttl.as_secs()
    );

    api::serve(config).await?;
    Ok(())
}
