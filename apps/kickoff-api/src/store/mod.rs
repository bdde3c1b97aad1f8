//! Storage capabilities the coordinators and account routes depend on.
//!
//! The traits are object-safe and held as `Arc<dyn …>` in `AppState`, so the
//! concurrency core runs unchanged against Postgres or the in-memory fake.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::{ApiError, CoreError};
use crate::models::account::{Account, NewAccount};
use crate::models::chat_message::ChatMessage;
use crate::models::enrollment::Enrollment;
use crate::models::sport_match::{Match, MatchView, NewMatch};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of a successful capacity-checked join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Player count right after the join committed.
    pub player_count: i32,
    /// Full roster in enrollment order.
    pub roster: Vec<Enrollment>,
}

/// Transactional match, roster and chat storage.
///
/// `join_match` must serialize concurrent joins on the same match (row lock on
/// the match record) and run its checks in this order: match exists, seat
/// available, participant exists, participant not yet enrolled.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    async fn join_match(
        &self,
        match_id: &str,
        participant_id: &str,
        display_name: &str,
    ) -> Result<JoinOutcome, CoreError>;

    /// Insert the match with `player_count = 1` and the creator's enrollment
    /// atomically.
    async fn create_match(&self, new_match: NewMatch) -> Result<(Match, Enrollment), CoreError>;

    /// Persist a chat line, then read it back with the sender's current
    /// display name.
    async fn save_message(
        &self,
        match_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<ChatMessage, CoreError>;

    async fn read_roster(&self, match_id: &str) -> Result<Vec<Enrollment>, CoreError>;

    /// Chat history, oldest first.
    async fn read_history(&self, match_id: &str) -> Result<Vec<ChatMessage>, CoreError>;

    /// Every match in the zone, newest first, each with roster and history.
    async fn read_zone_snapshot(&self, zone_id: &str) -> Result<Vec<MatchView>, CoreError>;
}

/// Account persistence used by the registration and login endpoints.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account. A taken username is a conflict.
    async fn create_account(&self, account: NewAccount) -> Result<Account, ApiError>;
    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, ApiError>;
}
