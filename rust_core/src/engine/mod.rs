//! Tracker engine
//!
//! Owns the poll cycle: enumerate tracked players, fetch each status,
//! diff against the stored value, update the store on change, and fan the
//! notification out to every subscriber. Also serves the subscribe /
//! unsubscribe / list commands. Collaborators are injected as trait
//! objects so tests can substitute in-memory fakes.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::fetch::{StatusFetcher, StatusResult};
use crate::models::{
    CycleReport, PlayerOutcome, SubscribeOutcome, TrackedPlayer, UnsubscribeOutcome,
};
use crate::notify::{format_status_change, NotificationSink};
use crate::store::{StatusStore, SubscriptionStore};

/// Faults surfaced to the command caller. AlreadyTracking / NotTracking are
/// not here; they are normal outcomes carried in the outcome enums.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("invalid nickname: {0}")]
    Validation(String),

    #[error("player not found: {0}")]
    PlayerNotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct TrackerEngine {
    subscriptions: Arc<dyn SubscriptionStore>,
    statuses: Arc<dyn StatusStore>,
    fetcher: Arc<dyn StatusFetcher>,
    sink: Arc<dyn NotificationSink>,
    // Single-flight guard: a trigger arriving while a cycle runs is skipped.
    cycle_guard: Mutex<()>,
}

impl TrackerEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        statuses: Arc<dyn StatusStore>,
        fetcher: Arc<dyn StatusFetcher>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            subscriptions,
            statuses,
            fetcher,
            sink,
            cycle_guard: Mutex::new(()),
        }
    }

    /// Start tracking a player for a user.
    ///
    /// Validates the player by fetching its status once; the fetched status
    /// becomes the diff baseline for a newly created pair, so the next poll
    /// cycle has nothing spurious to report.
    pub async fn subscribe(
        &self,
        user_id: i64,
        nickname: &str,
    ) -> Result<SubscribeOutcome, TrackerError> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(TrackerError::Validation(
                "player nickname must not be empty".to_string(),
            ));
        }

        let status = match self.fetcher.fetch(nickname).await {
            StatusResult::Observed(status) => status,
            StatusResult::Failed => {
                return Err(TrackerError::PlayerNotFound(nickname.to_string()))
            }
        };

        if !self.subscriptions.add(user_id, nickname).await? {
            return Ok(SubscribeOutcome::AlreadyTracking);
        }

        self.statuses.set(nickname, &status).await?;
        info!(user_id, nickname, %status, "subscription added");
        Ok(SubscribeOutcome::Subscribed { status })
    }

    /// Stop tracking a player for a user. Other users' subscriptions and the
    /// player's stored status are untouched (lazy retention).
    pub async fn unsubscribe(
        &self,
        user_id: i64,
        nickname: &str,
    ) -> Result<UnsubscribeOutcome, TrackerError> {
        let nickname = nickname.trim();
        if self.subscriptions.remove(user_id, nickname).await? {
            info!(user_id, nickname, "subscription removed");
            Ok(UnsubscribeOutcome::Unsubscribed)
        } else {
            Ok(UnsubscribeOutcome::NotTracking)
        }
    }

    /// All of a user's subscriptions with the last known status for each.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<TrackedPlayer>, TrackerError> {
        let nicknames = self.subscriptions.subscriptions_for_user(user_id).await?;
        let mut players = Vec::with_capacity(nicknames.len());
        for nickname in nicknames {
            let last_status = self.statuses.get(&nickname).await?;
            players.push(TrackedPlayer {
                nickname,
                last_status,
            });
        }
        Ok(players)
    }

    /// Run one poll cycle over the tracked player set.
    ///
    /// Returns `None` when a previous cycle is still in flight: the trigger
    /// is skipped rather than queued, so cycles never overlap.
    pub async fn run_poll_cycle(&self) -> Result<Option<CycleReport>, TrackerError> {
        let Ok(_guard) = self.cycle_guard.try_lock() else {
            warn!("previous poll cycle still in flight, skipping trigger");
            return Ok(None);
        };

        // Snapshot at cycle start; pairs added mid-cycle are picked up next
        // cycle (the fan-out read below is fresh, though).
        let players = self.subscriptions.distinct_players().await?;

        let mut report = CycleReport::default();
        for nickname in players {
            let outcome = self.check_player(&nickname).await;
            report.record(nickname, outcome);
        }

        info!(
            checked = report.players_checked,
            changed = report.changes_detected,
            failed = report.players_failed,
            notified = report.notifications_sent,
            "poll cycle complete"
        );
        Ok(Some(report))
    }

    /// Process one player in isolation: any failure here is logged and
    /// reported but never aborts the enclosing cycle.
    async fn check_player(&self, nickname: &str) -> PlayerOutcome {
        let current = match self.fetcher.fetch(nickname).await {
            StatusResult::Observed(status) => status,
            StatusResult::Failed => {
                warn!(nickname, "status fetch failed, retrying next cycle");
                return PlayerOutcome::FetchFailed;
            }
        };

        let previous = match self.statuses.get(nickname).await {
            Ok(previous) => previous,
            Err(e) => {
                error!(nickname, "status read failed: {e:#}");
                return PlayerOutcome::Error {
                    message: e.to_string(),
                };
            }
        };

        // Exact, case-sensitive comparison; an empty string is a real status.
        if previous.as_deref() == Some(current.as_str()) {
            return PlayerOutcome::Unchanged;
        }

        if let Err(e) = self.statuses.set(nickname, &current).await {
            error!(nickname, "status write failed: {e:#}");
            return PlayerOutcome::Error {
                message: e.to_string(),
            };
        }
        info!(
            nickname,
            previous = previous.as_deref().unwrap_or("<none>"),
            current = %current,
            "status change detected"
        );

        // Fresh fan-out read: a user subscribed after the cycle snapshot
        // still gets this notification.
        let recipients = match self.subscriptions.users_tracking(nickname).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(nickname, "subscriber read failed: {e:#}");
                return PlayerOutcome::Changed {
                    previous,
                    current,
                    notified: 0,
                    delivery_failures: 0,
                };
            }
        };

        let message = format_status_change(nickname, previous.as_deref(), &current);
        let mut notified = 0;
        let mut delivery_failures = 0;
        for user_id in recipients {
            match self.sink.deliver(user_id, &message).await {
                Ok(()) => notified += 1,
                Err(e) => {
                    delivery_failures += 1;
                    error!(user_id, nickname, "notification delivery failed: {e:#}");
                }
            }
        }

        PlayerOutcome::Changed {
            previous,
            current,
            notified,
            delivery_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStatusStore, MemorySubscriptionStore};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    /// Scripted fetcher: per-nickname responses, unknown nicknames fail.
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: SyncMutex<HashMap<String, StatusResult>>,
        delay: Option<Duration>,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self::default()
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        fn observe(&self, nickname: &str, status: &str) {
            self.responses.lock().insert(
                nickname.to_string(),
                StatusResult::Observed(status.to_string()),
            );
        }

        fn fail(&self, nickname: &str) {
            self.responses
                .lock()
                .insert(nickname.to_string(), StatusResult::Failed);
        }
    }

    #[async_trait]
    impl StatusFetcher for ScriptedFetcher {
        async fn fetch(&self, nickname: &str) -> StatusResult {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .get(nickname)
                .cloned()
                .unwrap_or(StatusResult::Failed)
        }

        fn fetcher_name(&self) -> &str {
            "scripted"
        }
    }

    /// Recording sink with an optional per-user failure set.
    #[derive(Default)]
    struct RecordingSink {
        delivered: SyncMutex<Vec<(i64, String)>>,
        failing_users: SyncMutex<HashSet<i64>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self::default()
        }

        fn fail_for(&self, user_id: i64) {
            self.failing_users.lock().insert(user_id);
        }

        fn delivered(&self) -> Vec<(i64, String)> {
            self.delivered.lock().clone()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, user_id: i64, message: &str) -> anyhow::Result<()> {
            if self.failing_users.lock().contains(&user_id) {
                return Err(anyhow!("delivery refused for {user_id}"));
            }
            self.delivered
                .lock()
                .push((user_id, message.to_string()));
            Ok(())
        }
    }

    struct Harness {
        engine: Arc<TrackerEngine>,
        subscriptions: Arc<MemorySubscriptionStore>,
        statuses: Arc<MemoryStatusStore>,
        fetcher: Arc<ScriptedFetcher>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        harness_with_fetcher(ScriptedFetcher::new())
    }

    fn harness_with_fetcher(fetcher: ScriptedFetcher) -> Harness {
        let subscriptions = Arc::new(MemorySubscriptionStore::new());
        let statuses = Arc::new(MemoryStatusStore::new());
        let fetcher = Arc::new(fetcher);
        let sink = Arc::new(RecordingSink::new());
        let engine = Arc::new(TrackerEngine::new(
            subscriptions.clone(),
            statuses.clone(),
            fetcher.clone(),
            sink.clone(),
        ));
        Harness {
            engine,
            subscriptions,
            statuses,
            fetcher,
            sink,
        }
    }

    #[tokio::test]
    async fn test_subscribe_writes_baseline() {
        let h = harness();
        h.fetcher.observe("Steve", "Оффлайн");

        let outcome = h.engine.subscribe(1, "Steve").await.unwrap();
        assert_eq!(
            outcome,
            SubscribeOutcome::Subscribed {
                status: "Оффлайн".to_string()
            }
        );
        assert_eq!(
            h.statuses.get("Steve").await.unwrap(),
            Some("Оффлайн".to_string())
        );

        // Baseline established: the very next cycle stays quiet.
        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.changes_detected, 0);
        assert!(h.sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_twice_is_already_tracking() {
        let h = harness();
        h.fetcher.observe("Steve", "Онлайн");

        h.engine.subscribe(1, "Steve").await.unwrap();
        let second = h.engine.subscribe(1, "Steve").await.unwrap();
        assert_eq!(second, SubscribeOutcome::AlreadyTracking);
        assert_eq!(
            h.subscriptions.subscriptions_for_user(1).await.unwrap(),
            vec!["Steve"]
        );
    }

    #[tokio::test]
    async fn test_subscribe_trims_and_rejects_empty() {
        let h = harness();
        h.fetcher.observe("Steve", "Онлайн");

        let outcome = h.engine.subscribe(1, "  Steve  ").await.unwrap();
        assert!(matches!(outcome, SubscribeOutcome::Subscribed { .. }));

        let err = h.engine.subscribe(1, "   ").await.unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
        // Validation rejects before any side effects.
        assert_eq!(
            h.subscriptions.subscriptions_for_user(1).await.unwrap(),
            vec!["Steve"]
        );
    }

    #[tokio::test]
    async fn test_subscribe_unknown_player_leaves_no_state() {
        let h = harness();
        h.fetcher.fail("Ghost");

        let err = h.engine.subscribe(1, "Ghost").await.unwrap_err();
        assert!(matches!(err, TrackerError::PlayerNotFound(_)));
        assert!(h.subscriptions.subscriptions_for_user(1).await.unwrap().is_empty());
        assert_eq!(h.statuses.get("Ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsubscribe_outcomes() {
        let h = harness();
        h.fetcher.observe("Steve", "Онлайн");
        h.engine.subscribe(1, "Steve").await.unwrap();

        assert_eq!(
            h.engine.unsubscribe(1, "Steve").await.unwrap(),
            UnsubscribeOutcome::Unsubscribed
        );
        assert_eq!(
            h.engine.unsubscribe(1, "Steve").await.unwrap(),
            UnsubscribeOutcome::NotTracking
        );
        // Lazy retention: the status record stays.
        assert_eq!(
            h.statuses.get("Steve").await.unwrap(),
            Some("Онлайн".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_for_user_marks_unknown() {
        let h = harness();
        h.fetcher.observe("Steve", "Онлайн");
        h.engine.subscribe(1, "Steve").await.unwrap();
        // A pair created without a baseline (added-but-never-confirmed path).
        h.subscriptions.add(1, "Alex").await.unwrap();

        let players = h.engine.list_for_user(1).await.unwrap();
        assert_eq!(
            players,
            vec![
                TrackedPlayer {
                    nickname: "Steve".to_string(),
                    last_status: Some("Онлайн".to_string()),
                },
                TrackedPlayer {
                    nickname: "Alex".to_string(),
                    last_status: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unchanged_status_is_quiet() {
        let h = harness();
        h.fetcher.observe("Steve", "Онлайн");
        h.engine.subscribe(1, "Steve").await.unwrap();

        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.players_checked, 1);
        assert_eq!(report.changes_detected, 0);
        assert_eq!(report.outcomes[0].1, PlayerOutcome::Unchanged);
        assert!(h.sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_change_updates_store_and_notifies() {
        let h = harness();
        h.fetcher.observe("Steve", "Онлайн");
        h.engine.subscribe(1, "Steve").await.unwrap();

        h.fetcher.observe("Steve", "Оффлайн");
        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();

        assert_eq!(report.changes_detected, 1);
        assert_eq!(
            h.statuses.get("Steve").await.unwrap(),
            Some("Оффлайн".to_string())
        );
        let delivered = h.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 1);
        assert!(delivered[0].1.contains("Was: Онлайн"));
        assert!(delivered[0].1.contains("Now: Оффлайн"));
    }

    #[tokio::test]
    async fn test_absent_baseline_counts_as_change() {
        let h = harness();
        // Subscription exists but no status was ever observed.
        h.subscriptions.add(1, "Steve").await.unwrap();
        h.fetcher.observe("Steve", "Онлайн");

        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.changes_detected, 1);
        let delivered = h.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].1.contains("Was: unknown"));
    }

    #[tokio::test]
    async fn test_empty_status_is_valid_observation() {
        let h = harness();
        h.subscriptions.add(1, "Steve").await.unwrap();
        h.statuses.set("Steve", "Онлайн").await.unwrap();
        h.fetcher.observe("Steve", "");

        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.changes_detected, 1);
        assert_eq!(h.statuses.get("Steve").await.unwrap(), Some(String::new()));

        // And an empty status held steady is not a change.
        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.changes_detected, 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_isolated_from_other_players() {
        let h = harness();
        h.fetcher.observe("Alpha", "Онлайн");
        h.fetcher.observe("Bravo", "Онлайн");
        h.engine.subscribe(1, "Alpha").await.unwrap();
        h.engine.subscribe(2, "Bravo").await.unwrap();

        h.fetcher.fail("Alpha");
        h.fetcher.observe("Bravo", "Оффлайн");

        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.players_checked, 2);
        assert_eq!(report.players_failed, 1);
        assert_eq!(report.changes_detected, 1);

        // Alpha untouched, Bravo updated and notified.
        assert_eq!(
            h.statuses.get("Alpha").await.unwrap(),
            Some("Онлайн".to_string())
        );
        assert_eq!(
            h.statuses.get("Bravo").await.unwrap(),
            Some("Оффлайн".to_string())
        );
        let delivered = h.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 2);
    }

    #[tokio::test]
    async fn test_fan_out_with_partial_delivery_failure() {
        let h = harness();
        h.fetcher.observe("Alex", "Онлайн");
        h.engine.subscribe(1, "Alex").await.unwrap();
        h.engine.subscribe(2, "Alex").await.unwrap();

        h.sink.fail_for(1);
        h.fetcher.observe("Alex", "Оффлайн");
        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();

        assert_eq!(report.changes_detected, 1);
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.delivery_failures, 1);
        // The failed delivery does not roll back the store update.
        assert_eq!(
            h.statuses.get("Alex").await.unwrap(),
            Some("Оффлайн".to_string())
        );
        let delivered = h.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 2);
    }

    #[tokio::test]
    async fn test_unsubscribed_user_not_notified() {
        let h = harness();
        h.fetcher.observe("Nick", "Онлайн");
        h.engine.subscribe(1, "Nick").await.unwrap();
        h.engine.subscribe(2, "Nick").await.unwrap();
        h.engine.unsubscribe(1, "Nick").await.unwrap();

        h.fetcher.observe("Nick", "Оффлайн");
        h.engine.run_poll_cycle().await.unwrap().unwrap();

        let delivered = h.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 2);
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let h = harness_with_fetcher(ScriptedFetcher::with_delay(Duration::from_millis(200)));
        h.fetcher.observe("Steve", "Онлайн");
        h.engine.subscribe(1, "Steve").await.unwrap();

        let engine = h.engine.clone();
        let slow = tokio::spawn(async move { engine.run_poll_cycle().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Second trigger while the first cycle is mid-fetch.
        let skipped = h.engine.run_poll_cycle().await.unwrap();
        assert!(skipped.is_none());

        let report = slow.await.unwrap().unwrap().unwrap();
        assert_eq!(report.players_checked, 1);
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let h = harness();
        h.fetcher.observe("Steve", "Online");

        let outcome = h.engine.subscribe(1, "Steve").await.unwrap();
        assert_eq!(
            outcome,
            SubscribeOutcome::Subscribed {
                status: "Online".to_string()
            }
        );
        assert_eq!(
            h.statuses.get("Steve").await.unwrap(),
            Some("Online".to_string())
        );

        // No real change: quiet cycle.
        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.changes_detected, 0);
        assert!(h.sink.delivered().is_empty());

        // Status flips: user 1 notified with both values, store updated.
        h.fetcher.observe("Steve", "Offline");
        let report = h.engine.run_poll_cycle().await.unwrap().unwrap();
        assert_eq!(report.changes_detected, 1);
        assert_eq!(
            h.statuses.get("Steve").await.unwrap(),
            Some("Offline".to_string())
        );
        let delivered = h.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, 1);
        assert!(delivered[0].1.contains("Was: Online"));
        assert!(delivered[0].1.contains("Now: Offline"));
    }
}
