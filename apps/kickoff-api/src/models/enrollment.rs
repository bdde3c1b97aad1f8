use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::schema::match_players;

/// A participant's seat in a match.
///
/// `display_name` is the account's current display name when read back
/// through the roster queries.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Serialize)]
#[diesel(table_name = match_players)]
pub struct Enrollment {
    pub id: String,
    pub match_id: String,
    pub participant_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = match_players)]
pub struct NewEnrollment<'a> {
    pub id: &'a str,
    pub match_id: &'a str,
    pub participant_id: &'a str,
    pub display_name: &'a str,
    pub joined_at: DateTime<Utc>,
}
