//! Chat command handling
//!
//! Parses inbound bot commands and renders engine outcomes as reply text.
//! Every handler failure is caught here: the user gets a generic error reply
//! and the bot keeps running.

use spectate_rust_core::models::{SubscribeOutcome, UnsubscribeOutcome};
use spectate_rust_core::notify::UNKNOWN_STATUS;
use spectate_rust_core::{TrackerEngine, TrackerError};
use tracing::error;

const WELCOME_TEXT: &str = "👋 Player status tracker for VimeWorld\n\n\
    📋 Commands:\n\
    /spectate <nickname> - start tracking a player\n\
    /list - show your tracked players\n\
    /stop <nickname> - stop tracking a player";

const GENERIC_ERROR_TEXT: &str = "❌ Something went wrong, try again later";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Spectate(String),
    SpectateUsage,
    List,
    Stop(String),
    StopUsage,
}

/// Parse a message text into a command. Returns `None` for plain chatter and
/// commands this bot does not know.
pub fn parse(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?;
    if !head.starts_with('/') {
        return None;
    }
    // Commands may arrive addressed as /spectate@BotName in group chats.
    let command = head.split('@').next().unwrap_or(head);
    let argument = parts.next();

    match (command, argument) {
        ("/start" | "/help", _) => Some(Command::Start),
        ("/spectate", Some(nickname)) => Some(Command::Spectate(nickname.to_string())),
        ("/spectate", None) => Some(Command::SpectateUsage),
        ("/list", _) => Some(Command::List),
        ("/stop", Some(nickname)) => Some(Command::Stop(nickname.to_string())),
        ("/stop", None) => Some(Command::StopUsage),
        _ => None,
    }
}

/// Dispatch one message to the engine, returning the reply text to send.
/// `None` means the message was not a command and needs no reply.
pub async fn handle(engine: &TrackerEngine, user_id: i64, text: &str) -> Option<String> {
    let reply = match parse(text)? {
        Command::Start => WELCOME_TEXT.to_string(),
        Command::SpectateUsage => "❌ Usage: /spectate <nickname>".to_string(),
        Command::StopUsage => "❌ Usage: /stop <nickname>".to_string(),
        Command::Spectate(nickname) => spectate(engine, user_id, &nickname).await,
        Command::List => list(engine, user_id).await,
        Command::Stop(nickname) => stop(engine, user_id, &nickname).await,
    };
    Some(reply)
}

async fn spectate(engine: &TrackerEngine, user_id: i64, nickname: &str) -> String {
    match engine.subscribe(user_id, nickname).await {
        Ok(SubscribeOutcome::Subscribed { status }) => {
            format!("✅ Now tracking {nickname}\n📊 Current status: {status}")
        }
        Ok(SubscribeOutcome::AlreadyTracking) => {
            "⚠️ You are already tracking this player".to_string()
        }
        Err(TrackerError::PlayerNotFound(_)) => {
            "❌ Player not found or the status check failed".to_string()
        }
        Err(TrackerError::Validation(_)) => "❌ Usage: /spectate <nickname>".to_string(),
        Err(TrackerError::Store(e)) => {
            error!(user_id, nickname, "spectate command failed: {e:#}");
            GENERIC_ERROR_TEXT.to_string()
        }
    }
}

async fn list(engine: &TrackerEngine, user_id: i64) -> String {
    let players = match engine.list_for_user(user_id).await {
        Ok(players) => players,
        Err(e) => {
            error!(user_id, "list command failed: {e:#}");
            return GENERIC_ERROR_TEXT.to_string();
        }
    };

    if players.is_empty() {
        return "📝 You are not tracking any players".to_string();
    }

    let lines: Vec<String> = players
        .iter()
        .map(|p| {
            format!(
                "• {} - {}",
                p.nickname,
                p.last_status.as_deref().unwrap_or(UNKNOWN_STATUS)
            )
        })
        .collect();
    format!("📋 Your tracked players:\n{}", lines.join("\n"))
}

async fn stop(engine: &TrackerEngine, user_id: i64, nickname: &str) -> String {
    match engine.unsubscribe(user_id, nickname).await {
        Ok(UnsubscribeOutcome::Unsubscribed) => format!("🛑 Stopped tracking {nickname}"),
        Ok(UnsubscribeOutcome::NotTracking) => {
            "⚠️ You are not tracking this player".to_string()
        }
        Err(e) => {
            error!(user_id, nickname, "stop command failed: {e:#}");
            GENERIC_ERROR_TEXT.to_string()
        }
    }
}
