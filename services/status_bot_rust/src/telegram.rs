//! Telegram Bot API client
//!
//! Thin HTTP client over `getUpdates` long-polling and `sendMessage`. Also
//! the production `NotificationSink`: a status-change notification is just a
//! `sendMessage` to the subscriber's chat.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use spectate_rust_core::notify::NotificationSink;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

impl TelegramClient {
    pub fn new(base_url: String, token: String, long_poll_timeout: Duration) -> Self {
        Self {
            http: Client::builder()
                // Must outlive the long-poll window held open by Telegram.
                .timeout(long_poll_timeout + Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
            token,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }

    /// Long-poll for new updates. `offset` must be one past the last
    /// update_id already handled.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>> {
        let url = self.api_url("getUpdates");
        let body = json!({
            "offset": offset,
            "timeout": timeout.as_secs(),
            "allowed_updates": ["message"],
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram getUpdates request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram getUpdates non-2xx: {status} body={text}");
        }

        let parsed: UpdatesResponse = resp
            .json()
            .await
            .context("Telegram getUpdates returned invalid JSON")?;
        if !parsed.ok {
            anyhow::bail!("Telegram getUpdates returned ok=false");
        }
        Ok(parsed.result)
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = self.api_url("sendMessage");
        let body = json!({
            "chat_id": chat_id,
            "text": text,
        });

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Telegram sendMessage request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage non-2xx: {status} body={text}");
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for TelegramClient {
    async fn deliver(&self, user_id: i64, message: &str) -> Result<()> {
        self.send_message(user_id, message).await
    }
}
