//! Wire format of the real-time channels.
//!
//! Inbound envelopes are flat JSON objects routed by `action`; outbound
//! envelopes are tagged by `status`.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};

use crate::models::chat_message::ChatMessage;
use crate::models::enrollment::Enrollment;
use crate::models::sport_match::MatchView;

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A message received from the client. Absent fields decode as empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InboundEnvelope {
    pub action: String,
    pub zone_id: String,
    pub match_id: String,
    pub participant_id: String,
    pub display_name: String,
    pub title: String,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub scheduled_at: String,
    pub capacity: i64,
    pub creator_id: String,
    pub creator_name: String,
    pub text: String,
}

impl InboundEnvelope {
    pub fn action(&self) -> Action<'_> {
        Action::parse(&self.action)
    }
}

/// Routing tag of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    /// No action; valid only on the envelope that binds a zone.
    None,
    Join,
    Create,
    SendMessage,
    ChangeZone,
    Unknown(&'a str),
}

impl<'a> Action<'a> {
    pub fn parse(tag: &'a str) -> Self {
        match tag.trim() {
            "" => Self::None,
            "join" => Self::Join,
            "create" => Self::Create,
            "send_message" => Self::SendMessage,
            "change_zone" => Self::ChangeZone,
            other => Self::Unknown(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A message sent to clients. `Error`, `ZoneSnapshot` and `ChatHistory` go
/// only to the requesting connection; the rest are broadcast to a zone.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    Error {
        message: String,
    },
    ZoneSnapshot {
        zone_id: String,
        matches: Vec<MatchView>,
    },
    MatchUpdate {
        match_id: String,
        player_count: i32,
        roster: Vec<Enrollment>,
    },
    NewMatch {
        #[serde(rename = "match")]
        game: MatchView,
    },
    NewMessage {
        match_id: String,
        message: ChatMessage,
    },
    ChatHistory {
        match_id: String,
        messages: Vec<ChatMessage>,
    },
}

impl OutboundEnvelope {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize once into a text frame shared by every recipient.
    pub fn encode(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}
