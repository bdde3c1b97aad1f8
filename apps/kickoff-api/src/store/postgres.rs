//! Postgres-backed storage (diesel + diesel-async).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::{AsyncConnection, RunQueryDsl};
use kickoff_common::id::{prefix, prefixed_ulid};
use kickoff_common::SnowflakeGenerator;
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{accounts, match_messages, match_players, matches};
use crate::error::{ApiError, CoreError};
use crate::models::account::{Account, NewAccount};
use crate::models::chat_message::{ChatMessage, NewChatMessage};
use crate::models::enrollment::{Enrollment, NewEnrollment};
use crate::models::sport_match::{Match, MatchView, NewMatch, NewMatchRow};

use super::{AccountStore, CapacityStore, JoinOutcome};

/// Columns of a roster row, with the display name taken from `accounts`.
type RosterColumns = (
    match_players::id,
    match_players::match_id,
    match_players::participant_id,
    accounts::display_name,
    match_players::joined_at,
);

const ROSTER_COLUMNS: RosterColumns = (
    match_players::id,
    match_players::match_id,
    match_players::participant_id,
    accounts::display_name,
    match_players::joined_at,
);

type MessageColumns = (
    match_messages::id,
    match_messages::match_id,
    match_messages::sender_id,
    accounts::display_name,
    match_messages::body,
    match_messages::created_at,
);

const MESSAGE_COLUMNS: MessageColumns = (
    match_messages::id,
    match_messages::match_id,
    match_messages::sender_id,
    accounts::display_name,
    match_messages::body,
    match_messages::created_at,
);

pub struct PgStore {
    db: DbPool,
    snowflake: Arc<SnowflakeGenerator>,
}

impl PgStore {
    pub fn new(db: DbPool, snowflake: Arc<SnowflakeGenerator>) -> Self {
        Self { db, snowflake }
    }
}

fn duplicate_enrollment(err: DieselError) -> CoreError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            CoreError::DuplicateEnrollment
        }
        other => CoreError::from(other),
    }
}

#[async_trait]
impl CapacityStore for PgStore {
    async fn join_match(
        &self,
        match_id: &str,
        participant_id: &str,
        display_name: &str,
    ) -> Result<JoinOutcome, CoreError> {
        let mut conn = self.db.get().await?;
        let enrollment_id = prefixed_ulid(prefix::ENROLLMENT);

        let player_count = conn
            .transaction::<_, CoreError, _>(|conn| {
                async move {
                    // 1. Row lock: concurrent joiners on this match queue here.
                    let (player_count, capacity): (i32, i32) = matches::table
                        .find(match_id)
                        .select((matches::player_count, matches::capacity))
                        .for_update()
                        .get_result(conn)
                        .await
                        .optional()?
                        .ok_or(CoreError::MatchNotFound)?;

                    // 2. Seat available.
                    if player_count >= capacity {
                        return Err(CoreError::CapacityExceeded);
                    }

                    // 3. Participant exists.
                    let known: bool = diesel::select(diesel::dsl::exists(
                        accounts::table.find(participant_id),
                    ))
                    .get_result(conn)
                    .await?;
                    if !known {
                        return Err(CoreError::UnknownParticipant);
                    }

                    // 4. Not enrolled yet.
                    let enrolled: bool = diesel::select(diesel::dsl::exists(
                        match_players::table
                            .filter(match_players::match_id.eq(match_id))
                            .filter(match_players::participant_id.eq(participant_id)),
                    ))
                    .get_result(conn)
                    .await?;
                    if enrolled {
                        return Err(CoreError::DuplicateEnrollment);
                    }

                    // 5. Take the seat.
                    let player_count: i32 = diesel::update(matches::table.find(match_id))
                        .set(matches::player_count.eq(matches::player_count + 1))
                        .returning(matches::player_count)
                        .get_result(conn)
                        .await?;

                    diesel::insert_into(match_players::table)
                        .values(NewEnrollment {
                            id: &enrollment_id,
                            match_id,
                            participant_id,
                            display_name,
                            joined_at: Utc::now(),
                        })
                        .execute(conn)
                        .await
                        .map_err(duplicate_enrollment)?;

                    Ok(player_count)
                }
                .scope_boxed()
            })
            .await?;

        let roster = load_roster(&mut conn, match_id).await?;

        Ok(JoinOutcome {
            player_count,
            roster,
        })
    }

    async fn create_match(&self, new_match: NewMatch) -> Result<(Match, Enrollment), CoreError> {
        let mut conn = self.db.get().await?;
        let match_id = prefixed_ulid(prefix::MATCH);
        let enrollment_id = prefixed_ulid(prefix::ENROLLMENT);
        let now = Utc::now();
        let new_match = &new_match;

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                // The stored name wins over whatever the client sent.
                let creator_name: String = accounts::table
                    .find(&new_match.creator_id)
                    .select(accounts::display_name)
                    .get_result(conn)
                    .await
                    .optional()?
                    .ok_or(CoreError::UnknownParticipant)?;

                let game: Match = diesel::insert_into(matches::table)
                    .values(NewMatchRow {
                        id: &match_id,
                        zone_id: &new_match.zone_id,
                        title: &new_match.title,
                        scheduled_at: new_match.scheduled_at,
                        capacity: new_match.capacity,
                        player_count: 1,
                        creator_id: &new_match.creator_id,
                        creator_name: &creator_name,
                        created_at: now,
                    })
                    .returning(Match::as_returning())
                    .get_result(conn)
                    .await?;

                let first: Enrollment = diesel::insert_into(match_players::table)
                    .values(NewEnrollment {
                        id: &enrollment_id,
                        match_id: &match_id,
                        participant_id: &new_match.creator_id,
                        display_name: &creator_name,
                        joined_at: now,
                    })
                    .returning(Enrollment::as_returning())
                    .get_result(conn)
                    .await?;

                Ok((game, first))
            }
            .scope_boxed()
        })
        .await
    }

    async fn save_message(
        &self,
        match_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<ChatMessage, CoreError> {
        let mut conn = self.db.get().await?;
        let id = self.snowflake.generate();

        conn.transaction::<_, CoreError, _>(|conn| {
            async move {
                let match_exists: bool =
                    diesel::select(diesel::dsl::exists(matches::table.find(match_id)))
                        .get_result(conn)
                        .await?;
                if !match_exists {
                    return Err(CoreError::MatchNotFound);
                }

                diesel::insert_into(match_messages::table)
                    .values(NewChatMessage {
                        id,
                        match_id,
                        sender_id,
                        body: text,
                        created_at: Utc::now(),
                    })
                    .execute(conn)
                    .await
                    .map_err(|err| match err {
                        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                            CoreError::UnknownParticipant
                        }
                        other => CoreError::from(other),
                    })?;

                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        // Read back through the accounts join so the broadcast carries the
        // stored display name, never a client-supplied one.
        let message: ChatMessage = match_messages::table
            .inner_join(accounts::table)
            .filter(match_messages::id.eq(id))
            .select(MESSAGE_COLUMNS)
            .get_result(&mut conn)
            .await?;

        Ok(message)
    }

    async fn read_roster(&self, match_id: &str) -> Result<Vec<Enrollment>, CoreError> {
        let mut conn = self.db.get().await?;
        load_roster(&mut conn, match_id).await
    }

    async fn read_history(&self, match_id: &str) -> Result<Vec<ChatMessage>, CoreError> {
        let mut conn = self.db.get().await?;
        let history: Vec<ChatMessage> = match_messages::table
            .inner_join(accounts::table)
            .filter(match_messages::match_id.eq(match_id))
            .order((match_messages::created_at.asc(), match_messages::id.asc()))
            .select(MESSAGE_COLUMNS)
            .load(&mut conn)
            .await?;
        Ok(history)
    }

    async fn read_zone_snapshot(&self, zone_id: &str) -> Result<Vec<MatchView>, CoreError> {
        let mut conn = self.db.get().await?;

        let games: Vec<Match> = matches::table
            .filter(matches::zone_id.eq(zone_id))
            .order((matches::created_at.desc(), matches::id.desc()))
            .select(Match::as_select())
            .load(&mut conn)
            .await?;

        if games.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = games.iter().map(|g| g.id.as_str()).collect();

        let rosters: Vec<Enrollment> = match_players::table
            .inner_join(accounts::table)
            .filter(match_players::match_id.eq_any(&ids))
            .order((match_players::joined_at.asc(), match_players::id.asc()))
            .select(ROSTER_COLUMNS)
            .load(&mut conn)
            .await?;

        let messages: Vec<ChatMessage> = match_messages::table
            .inner_join(accounts::table)
            .filter(match_messages::match_id.eq_any(&ids))
            .order((match_messages::created_at.asc(), match_messages::id.asc()))
            .select(MESSAGE_COLUMNS)
            .load(&mut conn)
            .await?;

        let mut roster_by_match: HashMap<String, Vec<Enrollment>> = HashMap::new();
        for entry in rosters {
            roster_by_match
                .entry(entry.match_id.clone())
                .or_default()
                .push(entry);
        }
        let mut history_by_match: HashMap<String, Vec<ChatMessage>> = HashMap::new();
        for message in messages {
            history_by_match
                .entry(message.match_id.clone())
                .or_default()
                .push(message);
        }

        Ok(games
            .into_iter()
            .map(|game| MatchView {
                roster: roster_by_match.remove(&game.id).unwrap_or_default(),
                chat_history: history_by_match.remove(&game.id).unwrap_or_default(),
                game,
            })
            .collect())
    }
}

async fn load_roster(
    conn: &mut diesel_async::AsyncPgConnection,
    match_id: &str,
) -> Result<Vec<Enrollment>, CoreError> {
    let roster: Vec<Enrollment> = match_players::table
        .inner_join(accounts::table)
        .filter(match_players::match_id.eq(match_id))
        .order((match_players::joined_at.asc(), match_players::id.asc()))
        .select(ROSTER_COLUMNS)
        .load(conn)
        .await?;
    Ok(roster)
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, ApiError> {
        let mut conn = self.db.get().await?;

        diesel::insert_into(accounts::table)
            .values(&account)
            .returning(Account::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    ApiError::conflict("Username is already taken")
                }
                other => ApiError::from(other),
            })
    }

    async fn find_account_by_username(&self, username: &str) -> Result<Option<Account>, ApiError> {
        let mut conn = self.db.get().await?;

        let account = accounts::table
            .filter(accounts::username.eq(username))
            .select(Account::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        Ok(account)
    }
}
