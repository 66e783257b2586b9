// Shared models for the Spectate tracker services
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Subscription & Status Records
// ============================================================================

/// A (user, player) tracking pair. The pair is unique in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: i64,
    pub player_nickname: String,
}

/// Last successfully observed status for a player. At most one record per
/// nickname; absence means the player was never successfully observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub player_nickname: String,
    pub last_status: String,
    pub last_checked: DateTime<Utc>,
}

/// One row of a user's tracking list: nickname plus the last known status,
/// `None` when the status store has no record yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPlayer {
    pub nickname: String,
    pub last_status: Option<String>,
}

// ============================================================================
// Command Outcomes
// ============================================================================

/// Result of a subscribe command. `AlreadyTracking` is a normal user-facing
/// outcome, not a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Newly subscribed; carries the status observed while validating the
    /// player, which was also written as the diff baseline.
    Subscribed { status: String },
    AlreadyTracking,
}

/// Result of an unsubscribe command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Unsubscribed,
    NotTracking,
}

// ============================================================================
// Poll Cycle Reporting
// ============================================================================

/// Outcome of one player's processing within a poll cycle. "Unchanged" and
/// "fetch failed" both leave the stores untouched but stay distinguishable
/// here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlayerOutcome {
    /// Fetched status equals the stored one; no write, no notification.
    Unchanged,
    /// Status changed: store updated, subscribers notified.
    Changed {
        previous: Option<String>,
        current: String,
        notified: usize,
        delivery_failures: usize,
    },
    /// The fetch failed or the player page was unreadable; retried naturally
    /// on the next cycle.
    FetchFailed,
    /// Unexpected failure while processing this player; logged and skipped.
    Error { message: String },
}

/// Aggregate statistics for one completed poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub players_checked: usize,
    pub changes_detected: usize,
    /// Players skipped this cycle (fetch failure or unexpected error); the
    /// `outcomes` list keeps the two distinguishable.
    pub players_failed: usize,
    pub notifications_sent: usize,
    pub delivery_failures: usize,
    pub outcomes: Vec<(String, PlayerOutcome)>,
}

impl CycleReport {
    /// Tally one player's outcome into the aggregate counters.
    pub fn record(&mut self, nickname: String, outcome: PlayerOutcome) {
        self.players_checked += 1;
        match &outcome {
            PlayerOutcome::Unchanged => {}
            PlayerOutcome::Changed {
                notified,
                delivery_failures,
                ..
            } => {
                self.changes_detected += 1;
                self.notifications_sent += notified;
                self.delivery_failures += delivery_failures;
            }
            PlayerOutcome::FetchFailed | PlayerOutcome::Error { .. } => {
                self.players_failed += 1
            }
        }
        self.outcomes.push((nickname, outcome));
    }
}
