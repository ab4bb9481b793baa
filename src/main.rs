#![deny(clippy::all)]

mod chat;
mod cli;
mod client;
mod config;
mod error;
mod events;
mod fallback;
mod session;
mod storage;
mod stream;
#[cfg(test)]
mod test_support;
mod transcript;

use client::HttpAnswerClient;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the transcript on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config()?;
    info!(base_url = %config.service.base_url, "Configuration loaded");

    let client = HttpAnswerClient::new(&config.service)?;
    match client.health().await {
        Ok(status) => info!(
            message = %status.message,
            key_loaded = status.gemini_key_loaded,
            "Answering service reachable"
        ),
        Err(e) => warn!("Answering service health check failed: {}", e),
    }

    let mut chat = chat::Chat::new(client, config.service.first_frame_timeout());
    cli::run(&mut chat, &config).await
}
