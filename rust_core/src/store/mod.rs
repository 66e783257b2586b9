//! Persistence seams for subscriptions and player statuses
//!
//! Two small relations back the tracker: (user, player) subscription pairs
//! and the last observed status per player. Production uses the SQLite
//! stores; tests substitute the in-memory ones through the same traits.
//! Every operation is its own transaction; no cross-store coordination is
//! required.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::PlayerStatus;

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryStatusStore, MemorySubscriptionStore};
pub use sqlite::{create_pool, init_schema, SqliteStatusStore, SqliteSubscriptionStore};

/// Registry of (user, player) tracking pairs. The pair is unique; `add` is
/// idempotent and reports whether a new pair was created.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Add a tracking pair. Returns `false` if the pair already existed.
    async fn add(&self, user_id: i64, nickname: &str) -> Result<bool>;

    /// Remove a tracking pair. Returns `false` if the pair was absent.
    async fn remove(&self, user_id: i64, nickname: &str) -> Result<bool>;

    /// Nicknames tracked by one user, in insertion order.
    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<String>>;

    /// Distinct nicknames across all subscriptions (the tracked player set).
    async fn distinct_players(&self) -> Result<Vec<String>>;

    /// All users tracking one nickname.
    async fn users_tracking(&self, nickname: &str) -> Result<Vec<i64>>;
}

/// Last known status per player, keyed by nickname.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Last observed status text, `None` if never observed.
    async fn get(&self, nickname: &str) -> Result<Option<String>>;

    /// Full status record including the observation timestamp.
    async fn get_record(&self, nickname: &str) -> Result<Option<PlayerStatus>>;

    /// Upsert the status for a player, stamping the check time.
    async fn set(&self, nickname: &str, status: &str) -> Result<()>;
}
