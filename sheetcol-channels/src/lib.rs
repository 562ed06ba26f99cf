//! sheetcol channels - Front-ends of the spreadsheet column collector.
//!
//! Users upload spreadsheets through a channel; the first-column values of
//! every upload are accumulated per session and returned as one text file on
//! `/process`.
//!
//! - Telegram (long polling, or webhook behind a public https URL)
//! - CLI (for local use)
//!
//! ## Architecture
//!
//! ```text
//! Telegram ─ poll/webhook ─┐
//!                          ├─► queue ─► dispatcher ─► session lane ─► BotHandler ─► SessionAggregator
//! stdin ───────────────────┘                                  │
//! User ◄──────────────── Channel::send ◄───────── replies ◄───┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod dispatch;
pub mod handler;
pub mod message;
pub mod routes;
pub mod telegram;
pub mod traits;

// Re-export commonly used types
pub use cli::CliChannel;
pub use dispatch::{
    spawn_dispatcher, spawn_dispatcher_with_idle_timeout, Dispatcher, LANE_IDLE_TIMEOUT,
};
pub use handler::BotHandler;
pub use message::{
    Attachment, AttachmentType, ChannelMessage, ChannelType, MessageContent, OutgoingContent,
    OutgoingMessage,
};
pub use routes::{build_router, create_state, ChannelsState};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult, MessageHandler};

use anyhow::Context;
use sheetcol_common::util::redact_secret;
use sheetcol_common::{CliChannelConfig, Config, TelegramConfig, Validate};
use sheetcol_core::SessionAggregator;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::mpsc;

/// How Telegram updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Long polling with `getUpdates`.
    Polling,
    /// Telegram posts updates to `public_url`.
    Webhook { public_url: String },
}

/// Pick the transport for a Telegram configuration.
///
/// Webhook mode needs both `webhook.enabled` and a public URL; enabled
/// without a URL falls back to polling.
pub fn select_transport(config: &TelegramConfig) -> Transport {
    if !config.webhook.enabled {
        return Transport::Polling;
    }

    match config.webhook.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Transport::Webhook {
            public_url: url.trim_end_matches('/').to_string(),
        },
        _ => {
            tracing::warn!("Webhook enabled but no public URL configured, falling back to polling");
            Transport::Polling
        }
    }
}

/// URL registered with `setWebhook`: the public base plus the bot token.
pub fn webhook_endpoint(public_url: &str, bot_token: &str) -> String {
    format!("{}/{bot_token}", public_url.trim_end_matches('/'))
}

/// Run every enabled channel until they finish or the process is interrupted.
pub async fn start(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    let aggregator = Arc::new(SessionAggregator::new());

    tokio::select! {
        res = run_channels(config, aggregator) => res,
        () = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    }
}

async fn run_channels(config: &Config, aggregator: Arc<SessionAggregator>) -> anyhow::Result<()> {
    let telegram = config.channels.telegram.as_ref().filter(|t| t.enabled);
    let cli = config.channels.cli.as_ref().filter(|c| c.enabled);

    match (telegram, cli) {
        (Some(telegram), Some(cli)) => {
            tokio::try_join!(
                run_telegram(config, telegram, aggregator.clone()),
                run_cli(config, cli, aggregator),
            )?;
            Ok(())
        }
        (Some(telegram), None) => run_telegram(config, telegram, aggregator).await,
        (None, Some(cli)) => run_cli(config, cli, aggregator).await,
        (None, None) => anyhow::bail!("No channel enabled"),
    }
}

async fn run_telegram(
    config: &Config,
    telegram: &TelegramConfig,
    aggregator: Arc<SessionAggregator>,
) -> anyhow::Result<()> {
    let token = telegram
        .bot_token
        .as_deref()
        .context("Telegram bot token is not configured")?;

    let mut channel = TelegramChannel::new(token.to_string(), telegram.allowed_users.clone())
        .with_poll_timeout(telegram.poll_timeout_secs);
    channel.init().await?;
    let channel = Arc::new(channel);

    let handler = Arc::new(BotHandler::new(
        channel.clone(),
        aggregator,
        config.extraction.clone(),
    ));

    match select_transport(telegram) {
        Transport::Webhook { public_url } => {
            let (state, rx) = create_state(Some(channel.clone()));
            let dispatcher = spawn_dispatcher(channel.clone(), handler, rx);

            let endpoint = webhook_endpoint(&public_url, token);
            channel
                .set_webhook(&endpoint)
                .await
                .context("Failed to register Telegram webhook")?;

            let bind: IpAddr = config
                .network
                .bind
                .parse()
                .with_context(|| format!("Invalid bind address: {}", config.network.bind))?;
            let addr = SocketAddr::from((bind, telegram.webhook.port));

            tracing::info!(
                "Starting webhook server on {addr} for {}",
                redact_secret(&endpoint, token)
            );

            let listener = tokio::net::TcpListener::bind(addr).await?;
            let served = axum::serve(listener, build_router(state)).await;

            dispatcher.abort();
            channel.shutdown().await?;
            served?;
        }
        Transport::Polling => {
            let (tx, rx) = mpsc::unbounded_channel();
            let dispatcher = spawn_dispatcher(channel.clone(), handler, rx);

            channel
                .listen(move |msg| {
                    if tx.send(msg).is_err() {
                        tracing::error!("Dispatcher stopped, dropping Telegram message");
                    }
                })
                .await?;

            // Let queued messages finish once polling stops.
            let _ = dispatcher.join().await;
            channel.shutdown().await?;
        }
    }

    Ok(())
}

async fn run_cli(
    config: &Config,
    cli: &CliChannelConfig,
    aggregator: Arc<SessionAggregator>,
) -> anyhow::Result<()> {
    let mut channel = CliChannel::new(cli.output_dir.clone(), cli.user_id.clone());
    channel.init().await?;
    let channel = Arc::new(channel);

    let handler = Arc::new(BotHandler::new(
        channel.clone(),
        aggregator,
        config.extraction.clone(),
    ));

    let (tx, rx) = mpsc::unbounded_channel();
    let dispatcher = spawn_dispatcher(channel.clone(), handler, rx);

    tracing::info!(
        output_dir = %cli.output_dir.display(),
        "CLI channel ready: /load <file>..., /process, /reset, /help, /quit"
    );

    channel
        .listen(move |msg| {
            if tx.send(msg).is_err() {
                tracing::error!("Dispatcher stopped, dropping CLI message");
            }
        })
        .await?;

    // stdin closed: finish what was already typed before exiting.
    let _ = dispatcher.join().await;
    channel.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetcol_common::WebhookConfig;

    fn telegram(enabled: bool, url: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: Some("123:ABC".into()),
            webhook: WebhookConfig {
                enabled,
                url: url.map(String::from),
                ..WebhookConfig::default()
            },
            ..TelegramConfig::default()
        }
    }

    #[test]
    fn polling_by_default() {
        assert_eq!(select_transport(&telegram(false, None)), Transport::Polling);
        assert_eq!(
            select_transport(&telegram(false, Some("https://bot.example.com"))),
            Transport::Polling
        );
    }

    #[test]
    fn webhook_needs_url() {
        assert_eq!(select_transport(&telegram(true, None)), Transport::Polling);
        assert_eq!(select_transport(&telegram(true, Some("  "))), Transport::Polling);
        assert_eq!(
            select_transport(&telegram(true, Some("https://bot.example.com/"))),
            Transport::Webhook {
                public_url: "https://bot.example.com".into()
            }
        );
    }

    #[test]
    fn webhook_endpoint_appends_token() {
        assert_eq!(
            webhook_endpoint("https://bot.example.com/", "123:ABC"),
            "https://bot.example.com/123:ABC"
        );
    }
}
