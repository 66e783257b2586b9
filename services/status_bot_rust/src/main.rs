//! Spectate Bot Service
//!
//! Responsibilities:
//! - Accept tracking commands from Telegram (/spectate, /list, /stop)
//! - Poll vimetop.ru for every tracked player's status on a fixed interval
//! - Notify all subscribers when a player's status changes

mod commands;
mod config;
mod telegram;

use anyhow::{Context, Result};
use config::Config;
use dotenv::dotenv;
use spectate_rust_core::fetch::VimetopFetcher;
use spectate_rust_core::store::{
    create_pool, init_schema, SqliteStatusStore, SqliteSubscriptionStore,
};
use spectate_rust_core::TrackerEngine;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(25);

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Spectate Bot Service...");

    let config = Config::from_env()?;

    // Database
    let pool = create_pool(&config.database_url).await?;
    init_schema(&pool)
        .await
        .context("Failed to initialize database schema")?;

    // Collaborators
    let subscriptions = Arc::new(SqliteSubscriptionStore::new(pool.clone()));
    let statuses = Arc::new(SqliteStatusStore::new(pool));
    let fetcher = Arc::new(VimetopFetcher::new(
        config.vimetop_base_url.clone(),
        config.fetch_timeout,
    ));
    let telegram = Arc::new(TelegramClient::new(
        config.telegram_api_base_url.clone(),
        config.bot_token.clone(),
        LONG_POLL_TIMEOUT,
    ));

    let engine = Arc::new(TrackerEngine::new(
        subscriptions,
        statuses,
        fetcher,
        telegram.clone(),
    ));

    // Poll loop: one recurring background task, cycles strictly sequential.
    let poll_engine = engine.clone();
    let poll_interval = config.poll_interval;
    tokio::spawn(async move {
        info!(
            "Status poll loop started (interval: {}s)",
            poll_interval.as_secs()
        );
        loop {
            if let Err(e) = poll_engine.run_poll_cycle().await {
                error!("Poll cycle failed: {e:#}");
            }
            tokio::time::sleep(poll_interval).await;
        }
    });

    // Command loop: long-poll Telegram for messages.
    info!("Bot started, waiting for messages...");
    let mut offset: i64 = 0;
    loop {
        let updates = match telegram.get_updates(offset, LONG_POLL_TIMEOUT).await {
            Ok(updates) => updates,
            Err(e) => {
                error!("getUpdates failed: {e:#}");
                tokio::time::sleep(Duration::from_secs(3)).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            // Subscriptions and notifications key off the sender; replies go
            // back to the chat the command arrived in.
            let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(message.chat.id);

            if let Some(reply) = commands::handle(&engine, user_id, text).await {
                if let Err(e) = telegram.send_message(message.chat.id, &reply).await {
                    error!(chat_id = message.chat.id, "Failed to send reply: {e:#}");
                }
            }
        }
    }
}
