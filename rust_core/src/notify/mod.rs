//! Notification delivery seam and message rendering
//!
//! The engine hands fully rendered message text to a `NotificationSink`;
//! delivery is best-effort and independent per recipient. The production
//! sink is the Telegram client in the bot service.

use anyhow::Result;
use async_trait::async_trait;

/// Rendered in place of a status that was never observed.
pub const UNKNOWN_STATUS: &str = "unknown";

/// Delivers one message to one user. Failures are the caller's to log and
/// must never affect delivery to other recipients.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, user_id: i64, message: &str) -> Result<()>;
}

/// Render the status-change notification sent to every subscriber.
pub fn format_status_change(nickname: &str, previous: Option<&str>, current: &str) -> String {
    format!(
        "⚡ Status change!\nPlayer: {}\nWas: {}\nNow: {}",
        nickname,
        previous.unwrap_or(UNKNOWN_STATUS),
        current
    )
}
