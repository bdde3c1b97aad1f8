use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Serialize, Serializer};

use crate::db::schema::matches;
use crate::models::chat_message::ChatMessage;
use crate::models::enrollment::Enrollment;

/// Wire and input format for a match's scheduled kickoff time.
pub const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` schedule string.
pub fn parse_schedule(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), SCHEDULE_FORMAT).ok()
}

fn serialize_schedule<S: Serializer>(at: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&at.format(SCHEDULE_FORMAT))
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = matches)]
pub struct Match {
    pub id: String,
    pub zone_id: String,
    pub title: String,
    #[serde(serialize_with = "serialize_schedule")]
    pub scheduled_at: NaiveDateTime,
    pub capacity: i32,
    pub player_count: i32,
    pub creator_id: String,
    pub creator_name: String,
    pub created_at: DateTime<Utc>,
}

/// Validated input for match creation.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub zone_id: String,
    pub title: String,
    pub scheduled_at: NaiveDateTime,
    pub capacity: i32,
    pub creator_id: String,
    pub creator_name: String,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = matches)]
pub struct NewMatchRow<'a> {
    pub id: &'a str,
    pub zone_id: &'a str,
    pub title: &'a str,
    pub scheduled_at: NaiveDateTime,
    pub capacity: i32,
    pub player_count: i32,
    pub creator_id: &'a str,
    pub creator_name: &'a str,
    pub created_at: DateTime<Utc>,
}

/// A match together with its roster and chat history, as sent in snapshots
/// and `new_match` broadcasts.
#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    #[serde(flatten)]
    pub game: Match,
    pub roster: Vec<Enrollment>,
    pub chat_history: Vec<ChatMessage>,
}
