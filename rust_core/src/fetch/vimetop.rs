//! vimetop.ru profile page status source
//!
//! Fetches `https://vimetop.ru/player/{nickname}` and extracts the text of
//! the `profile-session` element. An empty session text means the player is
//! offline; a missing element or any transport error is a failed lookup.

use super::{StatusFetcher, StatusResult};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::warn;

/// Status shown when the profile session element is present but empty.
pub const OFFLINE_STATUS: &str = "Оффлайн";

const DEFAULT_BASE_URL: &str = "https://vimetop.ru";

#[derive(Debug, Clone)]
pub struct VimetopFetcher {
    client: Client,
    base_url: String,
    session_re: Regex,
}

impl VimetopFetcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into(),
            // Text content of the element carrying id="profile-session".
            session_re: Regex::new(r#"id="profile-session"[^>]*>\s*([^<]*)"#)
                .expect("static regex"),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_BASE_URL, Duration::from_secs(10))
    }

    async fn fetch_page(&self, nickname: &str) -> Result<String> {
        let url = format!(
            "{}/player/{}",
            self.base_url.trim_end_matches('/'),
            nickname
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("vimetop request failed: {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("vimetop non-2xx for {url}: {status}"));
        }
        resp.text()
            .await
            .with_context(|| format!("vimetop body read failed: {url}"))
    }

    /// Extract the session status from the profile page body. `None` means
    /// the element is absent (unknown player or an error page).
    fn extract_status(&self, body: &str) -> Option<String> {
        let captured = self.session_re.captures(body)?;
        let text = captured.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if text.is_empty() {
            Some(OFFLINE_STATUS.to_string())
        } else {
            Some(text.to_string())
        }
    }
}

#[async_trait]
impl StatusFetcher for VimetopFetcher {
    async fn fetch(&self, nickname: &str) -> StatusResult {
        let body = match self.fetch_page(nickname).await {
            Ok(body) => body,
            Err(e) => {
                warn!(nickname, "status fetch failed: {e:#}");
                return StatusResult::Failed;
            }
        };

        match self.extract_status(&body) {
            Some(status) => StatusResult::Observed(status),
            None => {
                warn!(nickname, "profile page has no session element");
                StatusResult::Failed
            }
        }
    }

    fn fetcher_name(&self) -> &str {
        "vimetop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> VimetopFetcher {
        VimetopFetcher::with_defaults()
    }

    #[test]
    fn test_fetcher_name() {
        assert_eq!(fetcher().fetcher_name(), "vimetop");
    }

    #[test]
    fn test_extracts_session_text() {
        let body = r#"<div class="card"><span id="profile-session" class="text-success">
            Играет на SkyWars</span></div>"#;
        assert_eq!(
            fetcher().extract_status(body),
            Some("Играет на SkyWars".to_string())
        );
    }

    #[test]
    fn test_empty_session_is_offline() {
        let body = r#"<span id="profile-session"></span>"#;
        assert_eq!(
            fetcher().extract_status(body),
            Some(OFFLINE_STATUS.to_string())
        );
    }

    #[test]
    fn test_whitespace_only_session_is_offline() {
        let body = "<span id=\"profile-session\">\n   </span>";
        assert_eq!(
            fetcher().extract_status(body),
            Some(OFFLINE_STATUS.to_string())
        );
    }

    #[test]
    fn test_missing_element_is_none() {
        let body = r#"<html><body><h1>404</h1></body></html>"#;
        assert_eq!(fetcher().extract_status(body), None);
    }
}
