use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::match_messages;

/// A chat line as delivered to clients, with the sender's display name
/// resolved from the accounts table at read time.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub match_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = match_messages)]
pub struct NewChatMessage<'a> {
    pub id: i64,
    pub match_id: &'a str,
    pub sender_id: &'a str,
    pub body: &'a str,
    pub created_at: DateTime<Utc>,
}
