//! In-process storage with the same locking semantics as the Postgres store.
//!
//! Every match record sits behind its own async mutex, held for the whole
//! join "transaction" the way `SELECT … FOR UPDATE` holds the row lock, so
//! concurrent joins on one match are serialized while joins on different
//! matches proceed independently. Used by the test suites.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kickoff_common::id::{prefix, prefixed_ulid};
use kickoff_common::SnowflakeGenerator;
use parking_lot::Mutex;

use crate::error::{ApiError, CoreError};
use crate::models::account::{Account, NewAccount};
use crate::models::chat_message::ChatMessage;
use crate::models::enrollment::Enrollment;
use crate::models::sport_match::{Match, MatchView, NewMatch};

use super::{AccountStore, CapacityStore, JoinOutcome};

struct MatchRecord {
    /// Insertion order, newest-first tiebreak for snapshots.
    seq: u64,
    game: Match,
    roster: Vec<Enrollment>,
}

struct MessageRow {
    id: i64,
    match_id: String,
    sender_id: String,
    body: String,
    created_at: DateTime<Utc>,
}

pub struct MemoryStore {
    accounts: DashMap<String, Account>,
    usernames: DashMap<String, String>,
    matches: DashMap<String, Arc<tokio::sync::Mutex<MatchRecord>>>,
    messages: Mutex<Vec<MessageRow>>,
    snowflake: SnowflakeGenerator,
    next_seq: AtomicU64,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            usernames: DashMap::new(),
            matches: DashMap::new(),
            messages: Mutex::new(Vec::new()),
            snowflake: SnowflakeGenerator::new(0),
            next_seq: AtomicU64::new(0),
            fail_next_commit: AtomicBool::new(false),
        }
    }

    /// Insert an account directly, bypassing credential handling.
    pub fn seed_account(&self, id: &str, display_name: &str) {
        let account = Account {
            id: id.to_string(),
            username: id.to_string(),
            display_name: display_name.to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        };
        self.usernames.insert(account.username.clone(), account.id.clone());
        self.accounts.insert(account.id.clone(), account);
    }

    /// Change an account's display name, as a profile edit would.
    pub fn rename_account(&self, id: &str, display_name: &str) {
        if let Some(mut account) = self.accounts.get_mut(id) {
            account.display_name = display_name.to_string();
        }
    }

    /// Make the next write fail at commit time, leaving no trace.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of matches stored, across all zones.
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Number of persisted chat lines, across all matches.
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    fn commit(&self) -> Result<(), CoreError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(CoreError::TransientStorage(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }
        Ok(())
    }

    fn row(&self, match_id: &str) -> Option<Arc<tokio::sync::Mutex<MatchRecord>>> {
        self.matches.get(match_id).map(|r| Arc::clone(r.value()))
    }

    fn display_name(&self, account_id: &str) -> Option<String> {
        self.accounts.get(account_id).map(|a| a.display_name.clone())
    }

    /// Roster with current display names; enrollments whose account is gone
    /// drop out, like the inner join in the SQL store.
    fn resolve_roster(&self, roster: &[Enrollment]) -> Vec<Enrollment> {
        roster
            .iter()
            .filter_map(|entry| {
                let display_name = self.display_name(&entry.participant_id)?;
                Some(Enrollment {
                    display_name,
                    ..entry.clone()
                })
            })
            .collect()
    }

    fn history(&self, match_id: &str) -> Vec<ChatMessage> {
        let rows = self.messages.lock();
        let mut history: Vec<ChatMessage> = rows
            .iter()
            .filter(|row| row.match_id == match_id)
            .filter_map(|row| self.enrich(row))
            .collect();
        history.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        history
    }

    fn enrich(&self, row: &MessageRow) -> Option<ChatMessage> {
        Some(ChatMessage {
            id: row.id,
            match_id: row.match_id.clone(),
            sender_id: row.sender_id.clone(),
            sender_name: self.display_name(&row.sender_id)?,
            text: row.body.clone(),
            created_at: row.created_at,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapacityStore for MemoryStore {
    async fn join_match(
        &self,
        match_id: &str,
        participant_id: &str,
        display_name: &str,
    ) -> Result<JoinOutcome, CoreError> {
        let row = self.row(match_id).ok_or(CoreError::MatchNotFound)?;
        let mut record = row.lock().await;

        if record.game.player_count >= record.game.capacity {
            return Err(CoreError::CapacityExceeded);
        }
        if !self.accounts.contains_key(participant_id) {
            return Err(CoreError::UnknownParticipant);
        }
        if record
            .roster
            .iter()
            .any(|e| e.participant_id == participant_id)
        {
            return Err(CoreError::DuplicateEnrollment);
        }

        // Other joiners pile up on the row lock while this one is mid-flight.
        tokio::task::yield_now().await;

        self.commit()?;
        record.game.player_count += 1;
        record.roster.push(Enrollment {
            id: prefixed_ulid(prefix::ENROLLMENT),
            match_id: match_id.to_string(),
            participant_id: participant_id.to_string(),
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
        });

        Ok(JoinOutcome {
            player_count: record.game.player_count,
            roster: self.resolve_roster(&record.roster),
        })
    }

    async fn create_match(&self, new_match: NewMatch) -> Result<(Match, Enrollment), CoreError> {
        let creator_name = self
            .display_name(&new_match.creator_id)
            .ok_or(CoreError::UnknownParticipant)?;

        let now = Utc::now();
        let game = Match {
            id: prefixed_ulid(prefix::MATCH),
            zone_id: new_match.zone_id,
            title: new_match.title,
            scheduled_at: new_match.scheduled_at,
            capacity: new_match.capacity,
            player_count: 1,
            creator_id: new_match.creator_id,
            creator_name,
            created_at: now,
        };
        let first = Enrollment {
            id: prefixed_ulid(prefix::ENROLLMENT),
            match_id: game.id.clone(),
            participant_id: game.creator_id.clone(),
            display_name: game.creator_name.clone(),
            joined_at: now,
        };

        self.commit()?;
        let record = MatchRecord {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            game: game.clone(),
            roster: vec![first.clone()],
        };
        self.matches
            .insert(game.id.clone(), Arc::new(tokio::sync::Mutex::new(record)));

        Ok((game, first))
    }

    async fn save_message(
        &self,
        match_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<ChatMessage, CoreError> {
        if !self.matches.contains_key(match_id) {
            return Err(CoreError::MatchNotFound);
        }
        if !self.accounts.contains_key(sender_id) {
            return Err(CoreError::UnknownParticipant);
        }

        self.commit()?;
        let row = MessageRow {
            id: self.snowflake.generate(),
            match_id: match_id.to_string(),
            sender_id: sender_id.to_string(),
            body: text.to_string(),
            created_at: Utc::now(),
        };
        let message = self.enrich(&row).ok_or(CoreError::UnknownParticipant)?;
        self.messages.lock().push(row);

        Ok(message)
    }

    async fn read_roster(&self, match_id: &str) -> Result<Vec<Enrollment>, CoreError> {
        let Some(row) = self.row(match_id) else {
            return Ok(Vec::new());
        };
        let record = row.lock().await;
        Ok(self.resolve_roster(&record.roster))
    }

    async fn read_history(&self, match_id: &str) -> Result<Vec<ChatMessage>, CoreError> {
        Ok(self.history(match_id))
    }

    async fn read_zone_snapshot(&self, zone_id: &str) -> Result<Vec<MatchView>, CoreError> {
        let rows: Vec<Arc<tokio::sync::Mutex<MatchRecord>>> = self
            .matches
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();

        let mut in_zone = Vec::new();
        for row in rows {
            let record = row.lock().await;
            if record.game.zone_id == zone_id {
                in_zone.push((record.seq, record.game.clone(), self.resolve_roster(&record.roster)));
            }
        }

        in_zone.sort_by(|a, b| {
            b.1.created_at
                .cmp(&a.1.created_at)
                .then(b.0.cmp(&a.0))
        });

        Ok(in_zone
            .into_iter()
            .map(|(_, game, roster)| MatchView {
                chat_history: self.history(&game.id),
                roster,
                game,
            })
            .collect())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, ApiError> {
        use dashmap::mapref::entry::Entry;

        match self.usernames.entry(account.username.clone()) {
            Entry::Occupied(_) => Err(ApiError::conflict("Username is already taken")),
            Entry::Vacant(slot) => {
                slot.insert(account.id.clone());
                let account = Account {
                    id: account.id,
                    username: account.username,
                    display_name: account.display_name,
                    password_hash: account.password_hash,
                    created_at: account.created_at,
                };
                self.accounts.insert(account.id.clone(), account.clone());
                Ok(account)
            }
        }
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, ApiError> {
        let Some(id) = self.usernames.get(username).map(|r| r.value().clone()) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|a| a.value().clone()))
    }
}
