//! Action handlers for bound sessions.
//!
//! Each handler runs one coordinator call. Success is broadcast to the
//! session's zone; failures come back as `Err` and the caller replies
//! privately.

use crate::coordinator::join::CreateMatchRequest;
use crate::error::CoreError;
use crate::models::sport_match::MatchView;

use super::events::{InboundEnvelope, OutboundEnvelope};
use super::session::{SessionHandler, SessionState};

impl SessionHandler {
    fn bound_zone(&self) -> Result<String, CoreError> {
        match &self.state {
            SessionState::Bound { zone_id, .. } => Ok(zone_id.clone()),
            SessionState::Unbound { .. } => Err(CoreError::protocol("connection is not bound to a zone")),
        }
    }

    pub(super) async fn handle_join(&self, envelope: &InboundEnvelope) -> Result<(), CoreError> {
        let zone_id = self.bound_zone()?;
        let outcome = self
            .joins
            .join(
                &envelope.match_id,
                &envelope.participant_id,
                &envelope.display_name,
            )
            .await?;

        self.broadcast(
            &zone_id,
            &OutboundEnvelope::MatchUpdate {
                match_id: envelope.match_id.trim().to_string(),
                player_count: outcome.player_count,
                roster: outcome.roster,
            },
        );
        Ok(())
    }

    /// Matches are always created in the session's own zone.
    pub(super) async fn handle_create(&self, envelope: &InboundEnvelope) -> Result<(), CoreError> {
        let zone_id = self.bound_zone()?;
        let (game, creator) = self
            .joins
            .create_match(CreateMatchRequest {
                zone_id: zone_id.clone(),
                title: envelope.title.clone(),
                scheduled_at: envelope.scheduled_at.clone(),
                capacity: envelope.capacity,
                creator_id: envelope.creator_id.clone(),
                creator_name: envelope.creator_name.clone(),
            })
            .await?;

        self.broadcast(
            &zone_id,
            &OutboundEnvelope::NewMatch {
                game: MatchView {
                    game,
                    roster: vec![creator],
                    chat_history: Vec::new(),
                },
            },
        );
        Ok(())
    }

    pub(super) async fn handle_send_message(
        &self,
        envelope: &InboundEnvelope,
    ) -> Result<(), CoreError> {
        let zone_id = self.bound_zone()?;
        let message = self
            .chat
            .send_message(&envelope.match_id, &envelope.participant_id, &envelope.text)
            .await?;

        self.broadcast(
            &zone_id,
            &OutboundEnvelope::NewMessage {
                match_id: message.match_id.clone(),
                message,
            },
        );
        Ok(())
    }

    pub(super) async fn handle_change_zone(
        &mut self,
        envelope: &InboundEnvelope,
    ) -> Result<(), CoreError> {
        if !self.allow_zone_change {
            return Err(CoreError::protocol("zone changes are not enabled"));
        }
        let target = envelope.zone_id.trim();
        if target.is_empty() {
            return Err(CoreError::invalid("zone_id is required"));
        }

        if let SessionState::Bound { zone_id, .. } = &mut self.state {
            if zone_id.as_str() != target {
                tracing::info!(conn_id = %self.conn_id, from = %zone_id, to = %target, "zone changed");
                *zone_id = target.to_string();
                self.hub.change_zone(&self.conn_id, target);
            }
        }

        let target = target.to_string();
        self.send_zone_snapshot(&target).await;
        Ok(())
    }

    /// Reply with every match in the zone. Queued after the hub registration,
    /// so it may interleave with broadcasts the connection already receives.
    pub(super) async fn send_zone_snapshot(&self, zone_id: &str) {
        match self.chat.matches_in_zone(zone_id).await {
            Ok(matches) => self.reply(&OutboundEnvelope::ZoneSnapshot {
                zone_id: zone_id.to_string(),
                matches,
            }),
            Err(err) => {
                tracing::warn!(conn_id = %self.conn_id, %zone_id, %err, "zone snapshot failed");
                self.reply_error(&err);
            }
        }
    }

    pub(super) async fn send_chat_history(&self, match_id: &str) {
        match self.chat.history(match_id).await {
            Ok(messages) => self.reply(&OutboundEnvelope::ChatHistory {
                match_id: match_id.to_string(),
                messages,
            }),
            Err(err) => {
                tracing::warn!(conn_id = %self.conn_id, %match_id, %err, "chat history failed");
                self.reply_error(&err);
            }
        }
    }
}
