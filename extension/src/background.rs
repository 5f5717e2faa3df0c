// Background context of the wallet extension.
// Launched by the browser as a native-messaging host: envelopes arrive on
// stdin, replies leave on stdout, logs go to stderr.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wallet_extension::config::ConfigFile;
use wallet_extension::context::BackgroundContext;
use wallet_extension::transport;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries native-messaging frames
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wallet_extension=info,extension_router=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "extension.toml".to_string());
    tracing::info!("Loading configuration from: {}", config_path);

    let config = ConfigFile::load(&config_path)?;
    config.validate()?;

    let context = BackgroundContext::init(&config).await?;

    tokio::select! {
        result = transport::serve_stdio(&context.port) => {
            result.context("Native messaging transport failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    context.shutdown().await;
    Ok(())
}
