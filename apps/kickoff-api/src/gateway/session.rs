//! Per-connection session state and envelope routing.
//!
//! A session starts unbound, holding the sending half of its zone queue.
//! The first envelope naming a zone hands that queue to the hub and moves
//! the session to `Bound`; every later action runs against that zone.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::coordinator::{ChatCoordinator, JoinCoordinator};
use crate::error::CoreError;
use crate::AppState;

use super::events::{Action, InboundEnvelope, OutboundEnvelope};
use super::hub::{Frame, HubHandle};

/// Which real-time endpoint a connection came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// `/ws/matches`: match board actions.
    Matches,
    /// `/ws/chat`: chat lines for a single match.
    Chat,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Matches => "matches",
            Self::Chat => "chat",
        }
    }
}

pub(super) enum SessionState {
    Unbound { queue: mpsc::Sender<Frame> },
    Bound {
        zone_id: String,
        /// Set on chat connections only.
        match_id: Option<String>,
    },
}

pub struct SessionHandler {
    pub(super) conn_id: String,
    pub(super) kind: ChannelKind,
    pub(super) state: SessionState,
    pub(super) hub: HubHandle,
    pub(super) joins: JoinCoordinator,
    pub(super) chat: ChatCoordinator,
    pub(super) allow_zone_change: bool,
    private: mpsc::Sender<Frame>,
}

impl SessionHandler {
    /// `zone_queue` is handed to the hub when the session binds;
    /// `private_queue` carries replies meant for this connection alone.
    pub fn new(
        conn_id: String,
        kind: ChannelKind,
        state: &AppState,
        zone_queue: mpsc::Sender<Frame>,
        private_queue: mpsc::Sender<Frame>,
    ) -> Self {
        Self {
            conn_id,
            kind,
            state: SessionState::Unbound { queue: zone_queue },
            hub: state.hub.clone(),
            joins: state.joins.clone(),
            chat: state.chat.clone(),
            allow_zone_change: state.config.gateway.allow_zone_change,
            private: private_queue,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    pub fn zone_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Bound { zone_id, .. } => Some(zone_id),
            SessionState::Unbound { .. } => None,
        }
    }

    /// Process one inbound text frame.
    pub async fn handle_text(&mut self, text: &str) {
        let envelope: InboundEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(conn_id = %self.conn_id, %err, "undecodable envelope");
                self.reply_error(&CoreError::protocol("invalid message format"));
                return;
            }
        };

        match self.kind {
            ChannelKind::Matches => self.handle_board(envelope).await,
            ChannelKind::Chat => self.handle_chat(envelope).await,
        }
    }

    async fn handle_board(&mut self, envelope: InboundEnvelope) {
        let action = envelope.action();
        let zone_id = envelope.zone_id.trim();

        let binding = matches!(self.state, SessionState::Unbound { .. });
        if binding {
            if zone_id.is_empty() {
                self.reply_error(&CoreError::protocol(
                    "zone_id is required before any other action",
                ));
                return;
            }
            let zone_id = zone_id.to_string();
            self.bind(&zone_id, None);
            self.send_zone_snapshot(&zone_id).await;
        }

        let result = match action {
            Action::None if binding => Ok(()),
            Action::None => Err(CoreError::protocol("action is required")),
            Action::Join => self.handle_join(&envelope).await,
            Action::Create => self.handle_create(&envelope).await,
            Action::SendMessage => self.handle_send_message(&envelope).await,
            Action::ChangeZone if binding => Ok(()),
            Action::ChangeZone => self.handle_change_zone(&envelope).await,
            Action::Unknown(tag) => Err(CoreError::protocol(format!("unrecognized action: {tag}"))),
        };

        if let Err(err) = result {
            self.reply_error(&err);
        }
    }

    async fn handle_chat(&mut self, envelope: InboundEnvelope) {
        if let SessionState::Bound {
            zone_id,
            match_id: Some(match_id),
        } = &self.state
        {
            let (zone_id, match_id) = (zone_id.clone(), match_id.clone());
            let result = self
                .chat
                .send_message(&match_id, &envelope.participant_id, &envelope.text)
                .await
                .map(|message| {
                    self.broadcast(&zone_id, &OutboundEnvelope::NewMessage { match_id, message })
                });
            if let Err(err) = result {
                self.reply_error(&err);
            }
            return;
        }

        let zone_id = envelope.zone_id.trim();
        let match_id = envelope.match_id.trim();
        if zone_id.is_empty() || match_id.is_empty() {
            self.reply_error(&CoreError::protocol(
                "zone_id and match_id are required before sending messages",
            ));
            return;
        }

        let (zone_id, match_id) = (zone_id.to_string(), match_id.to_string());
        self.bind(&zone_id, Some(match_id.clone()));
        self.send_chat_history(&match_id).await;
    }

    /// Move from `Unbound` to `Bound`, handing the zone queue to the hub.
    fn bind(&mut self, zone_id: &str, match_id: Option<String>) {
        let previous = std::mem::replace(
            &mut self.state,
            SessionState::Bound {
                zone_id: zone_id.to_string(),
                match_id,
            },
        );
        if let SessionState::Unbound { queue } = previous {
            self.hub.register(&self.conn_id, zone_id, queue);
            tracing::info!(
                conn_id = %self.conn_id,
                channel = self.kind.as_str(),
                %zone_id,
                "connection bound to zone"
            );
        }
    }

    /// Queue an envelope for this connection only. Never blocks: a full
    /// private queue drops the envelope.
    pub(super) fn reply(&self, envelope: &OutboundEnvelope) {
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(?err, "failed to encode envelope");
                return;
            }
        };
        match self.private.try_send(frame) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.conn_id, "private queue full, reply dropped");
            }
        }
    }

    pub(super) fn reply_error(&self, err: &CoreError) {
        tracing::debug!(conn_id = %self.conn_id, code = err.code(), %err, "action rejected");
        self.reply(&OutboundEnvelope::error(err.to_string()));
    }

    pub(super) fn broadcast(&self, zone_id: &str, envelope: &OutboundEnvelope) {
        match envelope.encode() {
            Ok(frame) => self.hub.broadcast(zone_id, frame),
            Err(err) => tracing::error!(?err, "failed to encode envelope"),
        }
    }

    /// Release the hub registration, if any. Closing the zone queue is what
    /// lets the writer send its close frame and exit.
    pub fn close(self) {
        if let SessionState::Bound { .. } = self.state {
            self.hub.unregister(&self.conn_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use kickoff_common::id::{prefix, prefixed_ulid};
    use serde_json::{json, Value};
    use tokio::time::timeout;

    use super::*;
    use crate::config::{Config, GatewayConfig};
    use crate::store::MemoryStore;

    struct Harness {
        session: SessionHandler,
        state: AppState,
        private_rx: mpsc::Receiver<Frame>,
        zone_rx: mpsc::Receiver<Frame>,
    }

    impl Harness {
        fn new(kind: ChannelKind, allow_zone_change: bool) -> Self {
            let store = Arc::new(MemoryStore::new());
            store.seed_account("u1", "Ana");
            store.seed_account("u2", "Beto");
            let config = Config {
                database_url: String::new(),
                port: 0,
                worker_id: 0,
                gateway: GatewayConfig {
                    allow_zone_change,
                    ..GatewayConfig::default()
                },
            };
            let state = AppState::new(config, store);
            Self::attach(state, kind)
        }

        fn attach(state: AppState, kind: ChannelKind) -> Self {
            let (zone_tx, zone_rx) = mpsc::channel(16);
            let (private_tx, private_rx) = mpsc::channel(16);
            let conn_id = prefixed_ulid(prefix::CONNECTION);
            let session = SessionHandler::new(conn_id, kind, &state, zone_tx, private_tx);
            Self {
                session,
                state,
                private_rx,
                zone_rx,
            }
        }

        async fn send(&mut self, value: Value) {
            self.session.handle_text(&value.to_string()).await;
        }

        fn private(&mut self) -> Value {
            let frame = self.private_rx.try_recv().expect("private reply");
            serde_json::from_str(frame.as_str()).unwrap()
        }

        async fn zone(&mut self) -> Value {
            let frame = timeout(Duration::from_secs(1), self.zone_rx.recv())
                .await
                .expect("zone broadcast")
                .expect("zone queue open");
            serde_json::from_str(frame.as_str()).unwrap()
        }
    }

    async fn create_match(h: &mut Harness, capacity: i64) -> String {
        h.send(json!({
            "action": "create",
            "title": "Sunday five-a-side",
            "scheduled_at": "2024-06-02 10:00:00",
            "capacity": capacity,
            "creator_id": "u1",
            "creator_name": "Ana",
        }))
        .await;
        let update = h.zone().await;
        assert_eq!(update["status"], "new_match");
        update["match"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn first_envelope_binds_and_gets_snapshot() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;

        let snapshot = h.private();
        assert_eq!(snapshot["status"], "zone_snapshot");
        assert_eq!(snapshot["zone_id"], "Z1");
        assert_eq!(snapshot["matches"], json!([]));
        assert_eq!(h.session.zone_id(), Some("Z1"));

        let stats = h.state.hub.stats().await;
        assert_eq!(stats.zones.get("Z1"), Some(&1));
    }

    #[tokio::test]
    async fn action_before_binding_is_rejected() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "action": "join", "match_id": "mt_1" })).await;

        let err = h.private();
        assert_eq!(err["status"], "error");
        assert_eq!(h.session.zone_id(), None);
        assert_eq!(h.state.hub.stats().await.connections, 0);
    }

    #[tokio::test]
    async fn malformed_json_gets_private_error() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.session.handle_text("{not json").await;

        let err = h.private();
        assert_eq!(err["status"], "error");
        assert_eq!(err["message"], "invalid message format");
    }

    #[tokio::test]
    async fn create_uses_bound_zone_and_join_broadcasts_update() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();

        let match_id = create_match(&mut h, 10).await;
        h.send(json!({
            "action": "join",
            "zone_id": "ignored",
            "match_id": match_id,
            "participant_id": "u2",
            "display_name": "Beto",
        }))
        .await;

        let update = h.zone().await;
        assert_eq!(update["status"], "match_update");
        assert_eq!(update["player_count"], 2);
        assert_eq!(update["roster"].as_array().unwrap().len(), 2);

        let listed = h.state.chat.matches_in_zone("Z1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].game.zone_id, "Z1");
    }

    #[tokio::test]
    async fn binding_envelope_may_carry_an_action() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({
            "zone_id": "Z1",
            "action": "create",
            "title": "Pickup",
            "scheduled_at": "2024-06-02 10:00:00",
            "capacity": 4,
            "creator_id": "u1",
            "creator_name": "Ana",
        }))
        .await;

        assert_eq!(h.private()["status"], "zone_snapshot");
        assert_eq!(h.zone().await["status"], "new_match");
    }

    #[tokio::test]
    async fn new_match_shows_the_account_name_not_the_supplied_one() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();

        h.send(json!({
            "action": "create",
            "title": "Pickup",
            "scheduled_at": "2024-06-02 10:00:00",
            "capacity": 4,
            "creator_id": "u1",
            "creator_name": "Beto",
        }))
        .await;

        let created = h.zone().await;
        assert_eq!(created["match"]["creator_name"], "Ana");
        assert_eq!(created["match"]["roster"][0]["display_name"], "Ana");
    }

    #[tokio::test]
    async fn full_match_error_is_private() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();
        let match_id = create_match(&mut h, 1).await;

        h.send(json!({
            "action": "join",
            "match_id": match_id,
            "participant_id": "u2",
            "display_name": "Beto",
        }))
        .await;

        let err = h.private();
        assert_eq!(err["status"], "error");
        assert_eq!(err["message"], "match is full");
        assert!(h.zone_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_action_is_rejected() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();

        h.send(json!({ "action": "dance" })).await;
        let err = h.private();
        assert_eq!(err["message"], "unrecognized action: dance");
    }

    #[tokio::test]
    async fn zone_change_disabled_by_default() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();

        h.send(json!({ "action": "change_zone", "zone_id": "Z2" })).await;
        assert_eq!(h.private()["status"], "error");
        assert_eq!(h.session.zone_id(), Some("Z1"));
    }

    #[tokio::test]
    async fn zone_change_moves_registration_when_enabled() {
        let mut h = Harness::new(ChannelKind::Matches, true);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();

        h.send(json!({ "action": "change_zone", "zone_id": "Z2" })).await;
        let snapshot = h.private();
        assert_eq!(snapshot["status"], "zone_snapshot");
        assert_eq!(snapshot["zone_id"], "Z2");
        assert_eq!(h.session.zone_id(), Some("Z2"));

        let stats = h.state.hub.stats().await;
        assert_eq!(stats.zones.get("Z2"), Some(&1));
        assert!(!stats.zones.contains_key("Z1"));
    }

    #[tokio::test]
    async fn chat_channel_sends_history_then_broadcasts() {
        let mut board = Harness::new(ChannelKind::Matches, false);
        board.send(json!({ "zone_id": "Z1" })).await;
        board.private();
        let match_id = create_match(&mut board, 10).await;

        let mut chat = Harness::attach(board.state.clone(), ChannelKind::Chat);
        chat.send(json!({ "participant_id": "u1", "text": "hi" })).await;
        assert_eq!(chat.private()["status"], "error");

        chat.send(json!({ "zone_id": "Z1", "match_id": match_id })).await;
        let history = chat.private();
        assert_eq!(history["status"], "chat_history");
        assert_eq!(history["messages"], json!([]));

        chat.send(json!({ "participant_id": "u2", "text": "on my way" })).await;
        let line = chat.zone().await;
        assert_eq!(line["status"], "new_message");
        assert_eq!(line["match_id"], match_id.as_str());
        assert_eq!(line["message"]["sender_name"], "Beto");

        // Same zone, so the board connection hears it too.
        assert_eq!(board.zone().await["status"], "new_message");
    }

    #[tokio::test]
    async fn close_unregisters_bound_session() {
        let mut h = Harness::new(ChannelKind::Matches, false);
        h.send(json!({ "zone_id": "Z1" })).await;
        h.private();
        let hub = h.state.hub.clone();
        assert_eq!(hub.stats().await.connections, 1);

        h.session.close();
        assert_eq!(hub.stats().await.connections, 0);
        assert!(h.zone_rx.recv().await.is_none());
    }
}
