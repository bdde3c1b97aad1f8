use std::sync::Arc;

use crate::error::CoreError;
use crate::models::enrollment::Enrollment;
use crate::models::sport_match::{parse_schedule, Match, NewMatch};
use crate::store::{CapacityStore, JoinOutcome};

use super::required;

/// Upper bound on a match's capacity.
pub const MAX_CAPACITY: i32 = 64;
const MAX_TITLE_LEN: usize = 100;

/// Raw creation request, as decoded from the wire.
#[derive(Debug, Clone, Default)]
pub struct CreateMatchRequest {
    pub zone_id: String,
    pub title: String,
    pub scheduled_at: String,
    pub capacity: i64,
    pub creator_id: String,
    pub creator_name: String,
}

/// Capacity-checked joins and match creation.
#[derive(Clone)]
pub struct JoinCoordinator {
    store: Arc<dyn CapacityStore>,
}

impl JoinCoordinator {
    pub fn new(store: Arc<dyn CapacityStore>) -> Self {
        Self { store }
    }

    /// Enroll `participant_id` in `match_id`.
    ///
    /// Fails with `MatchNotFound`, `CapacityExceeded`, `UnknownParticipant` or
    /// `DuplicateEnrollment`, checked in that order under the match row lock.
    /// A commit failure surfaces as `TransientStorage` and is not retried.
    pub async fn join(
        &self,
        match_id: &str,
        participant_id: &str,
        display_name: &str,
    ) -> Result<JoinOutcome, CoreError> {
        let match_id = required(match_id, "match_id")?;
        let participant_id = required(participant_id, "participant_id")?;
        let display_name = required(display_name, "display_name")?;

        let outcome = self
            .store
            .join_match(match_id, participant_id, display_name)
            .await?;

        tracing::info!(
            %match_id,
            %participant_id,
            player_count = outcome.player_count,
            "participant joined match"
        );

        Ok(outcome)
    }

    /// Create a match with its creator already enrolled.
    pub async fn create_match(
        &self,
        request: CreateMatchRequest,
    ) -> Result<(Match, Enrollment), CoreError> {
        let new_match = validate(request)?;
        let (game, first) = self.store.create_match(new_match).await?;

        tracing::info!(
            match_id = %game.id,
            zone_id = %game.zone_id,
            capacity = game.capacity,
            "match created"
        );

        Ok((game, first))
    }
}

fn validate(request: CreateMatchRequest) -> Result<NewMatch, CoreError> {
    let zone_id = required(&request.zone_id, "zone_id")?;
    let title = required(&request.title, "title")?;
    let creator_id = required(&request.creator_id, "creator_id")?;
    let creator_name = required(&request.creator_name, "creator_name")?;
    let raw_schedule = required(&request.scheduled_at, "scheduled_at")?;

    if title.chars().count() > MAX_TITLE_LEN {
        return Err(CoreError::invalid(format!(
            "title must be {MAX_TITLE_LEN} characters or fewer"
        )));
    }

    let scheduled_at = parse_schedule(raw_schedule).ok_or_else(|| {
        CoreError::invalid("scheduled_at must use the format YYYY-MM-DD HH:MM:SS")
    })?;

    // The creator takes the first seat, so one is the smallest useful match.
    if request.capacity < 1 || request.capacity > i64::from(MAX_CAPACITY) {
        return Err(CoreError::invalid(format!(
            "capacity must be between 1 and {MAX_CAPACITY}"
        )));
    }

    Ok(NewMatch {
        zone_id: zone_id.to_string(),
        title: title.to_string(),
        scheduled_at,
        capacity: request.capacity as i32,
        creator_id: creator_id.to_string(),
        creator_name: creator_name.to_string(),
    })
}
