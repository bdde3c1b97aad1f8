use std::sync::Arc;

use crate::error::CoreError;
use crate::models::chat_message::ChatMessage;
use crate::models::sport_match::MatchView;
use crate::store::CapacityStore;

use super::required;

/// Longest accepted chat line, in characters.
pub const MAX_MESSAGE_LEN: usize = 1000;

/// Chat persistence and the read paths used for snapshots.
#[derive(Clone)]
pub struct ChatCoordinator {
    store: Arc<dyn CapacityStore>,
}

impl ChatCoordinator {
    pub fn new(store: Arc<dyn CapacityStore>) -> Self {
        Self { store }
    }

    /// Persist a chat line and return it with the sender's stored display
    /// name, so a client cannot put words under someone else's name.
    pub async fn send_message(
        &self,
        match_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<ChatMessage, CoreError> {
        let match_id = required(match_id, "match_id")?;
        let sender_id = required(sender_id, "participant_id")?;
        let text = required(text, "text")?;
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(CoreError::invalid(format!(
                "text must be {MAX_MESSAGE_LEN} characters or fewer"
            )));
        }

        let message = self.store.save_message(match_id, sender_id, text).await?;
        tracing::info!(%match_id, %sender_id, message_id = message.id, "chat message stored");
        Ok(message)
    }

    /// Chat history for a match, oldest first.
    pub async fn history(&self, match_id: &str) -> Result<Vec<ChatMessage>, CoreError> {
        let match_id = required(match_id, "match_id")?;
        self.store.read_history(match_id).await
    }

    /// All matches in a zone, newest first, each with roster and history.
    pub async fn matches_in_zone(&self, zone_id: &str) -> Result<Vec<MatchView>, CoreError> {
        let zone_id = required(zone_id, "zone_id")?;
        self.store.read_zone_snapshot(zone_id).await
    }
}
