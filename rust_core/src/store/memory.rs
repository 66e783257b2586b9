//! In-memory stores
//!
//! Trait-complete substitutes for the SQLite stores, used by engine tests
//! and available for ephemeral deployments where persistence across
//! restarts does not matter.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{StatusStore, SubscriptionStore};
use crate::models::{PlayerStatus, Subscription};

#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    // Insertion-ordered, mirroring the SQLite store's rowid ordering.
    pairs: RwLock<Vec<Subscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn add(&self, user_id: i64, nickname: &str) -> Result<bool> {
        let mut pairs = self.pairs.write();
        if pairs
            .iter()
            .any(|s| s.user_id == user_id && s.player_nickname == nickname)
        {
            return Ok(false);
        }
        pairs.push(Subscription {
            user_id,
            player_nickname: nickname.to_string(),
        });
        Ok(true)
    }

    async fn remove(&self, user_id: i64, nickname: &str) -> Result<bool> {
        let mut pairs = self.pairs.write();
        let before = pairs.len();
        pairs.retain(|s| !(s.user_id == user_id && s.player_nickname == nickname));
        Ok(pairs.len() < before)
    }

    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<String>> {
        Ok(self
            .pairs
            .read()
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.player_nickname.clone())
            .collect())
    }

    async fn distinct_players(&self) -> Result<Vec<String>> {
        let mut players: Vec<String> = Vec::new();
        for subscription in self.pairs.read().iter() {
            if !players.contains(&subscription.player_nickname) {
                players.push(subscription.player_nickname.clone());
            }
        }
        Ok(players)
    }

    async fn users_tracking(&self, nickname: &str) -> Result<Vec<i64>> {
        Ok(self
            .pairs
            .read()
            .iter()
            .filter(|s| s.player_nickname == nickname)
            .map(|s| s.user_id)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    statuses: RwLock<HashMap<String, PlayerStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, nickname: &str) -> Result<Option<String>> {
        Ok(self
            .statuses
            .read()
            .get(nickname)
            .map(|record| record.last_status.clone()))
    }

    async fn get_record(&self, nickname: &str) -> Result<Option<PlayerStatus>> {
        Ok(self.statuses.read().get(nickname).cloned())
    }

    async fn set(&self, nickname: &str, status: &str) -> Result<()> {
        self.statuses.write().insert(
            nickname.to_string(),
            PlayerStatus {
                player_nickname: nickname.to_string(),
                last_status: status.to_string(),
                last_checked: Utc::now(),
            },
        );
        Ok(())
    }
}
