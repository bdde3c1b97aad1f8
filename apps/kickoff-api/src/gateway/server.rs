//! WebSocket upgrade handlers and per-connection I/O.
//!
//! Each connection runs two tasks. The reader owns the session and feeds it
//! inbound frames under a read deadline. The writer drains the zone queue
//! and the private queue into the socket and sends pings while idle.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use kickoff_common::id::{prefix, prefixed_ulid};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::config::GatewayConfig;
use crate::AppState;

use super::hub::Frame;
use super::session::{ChannelKind, SessionHandler};

const CLOSE_NORMAL: u16 = 1000;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/matches", get(matches_upgrade))
        .route("/ws/chat", get(chat_upgrade))
}

async fn matches_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, ChannelKind::Matches))
}

async fn chat_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, ChannelKind::Chat))
}

async fn handle_connection(socket: WebSocket, state: AppState, kind: ChannelKind) {
    let conn_id = prefixed_ulid(prefix::CONNECTION);
    let config = state.config.gateway.clone();
    let (ws_tx, mut ws_rx) = socket.split();

    let (zone_tx, zone_rx) = mpsc::channel(config.outbound_capacity);
    let (private_tx, private_rx) = mpsc::channel(config.outbound_capacity);

    tracing::debug!(%conn_id, channel = kind.as_str(), "connection opened");

    let mut writer = tokio::spawn(write_loop(
        ws_tx,
        zone_rx,
        private_rx,
        config.clone(),
        conn_id.clone(),
    ));
    let mut session = SessionHandler::new(conn_id.clone(), kind, &state, zone_tx, private_tx);

    let writer_finished = read_loop(&mut session, &mut ws_rx, &mut writer, config.pong_wait).await;

    // Unregistering closes the zone queue; dropping the session closes the
    // private queue. Either way the writer sends its close frame and exits.
    session.close();
    if !writer_finished && time::timeout(config.write_wait, &mut writer).await.is_err() {
        writer.abort();
    }

    tracing::debug!(%conn_id, channel = kind.as_str(), "connection closed");
}

/// Feed inbound frames to the session until the peer goes away, the read
/// deadline passes, or the writer gives up. Returns whether the writer
/// already finished.
async fn read_loop(
    session: &mut SessionHandler,
    ws_rx: &mut SplitStream<WebSocket>,
    writer: &mut tokio::task::JoinHandle<()>,
    pong_wait: Duration,
) -> bool {
    loop {
        tokio::select! {
            _ = &mut *writer => return true,

            // Every frame, pongs included, restarts the deadline.
            next = time::timeout(pong_wait, ws_rx.next()) => {
                match next {
                    Ok(Some(Ok(Message::Text(text)))) => session.handle_text(text.as_str()).await,
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => return false,
                    Ok(Some(Ok(_))) => continue,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(?e, conn_id = %session.conn_id(), "ws read error");
                        return false;
                    }
                    Err(_elapsed) => {
                        tracing::debug!(conn_id = %session.conn_id(), "read deadline passed");
                        return false;
                    }
                }
            }
        }
    }
}

async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut zone_rx: mpsc::Receiver<Frame>,
    mut private_rx: mpsc::Receiver<Frame>,
    config: GatewayConfig,
    conn_id: String,
) {
    let mut ping = time::interval_at(Instant::now() + config.ping_interval, config.ping_interval);
    let mut private_open = true;

    loop {
        // Private first: a snapshot queued before a broadcast must go out
        // before it.
        let message = tokio::select! {
            biased;

            frame = private_rx.recv(), if private_open => match frame {
                Some(frame) => Message::Text(frame),
                None => {
                    private_open = false;
                    continue;
                }
            },
            frame = zone_rx.recv() => match frame {
                Some(frame) => Message::Text(frame),
                None => {
                    // The hub evicted or unregistered us.
                    let _ = send_close(&mut ws_tx, CLOSE_NORMAL, "", config.write_wait).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Default::default()),
        };

        let is_ping = matches!(message, Message::Ping(_));
        if let Err(reason) = send_frame(&mut ws_tx, message, config.write_wait).await {
            tracing::debug!(%conn_id, reason, "write failed");
            break;
        }
        if !is_ping {
            ping.reset();
        }
    }
}

async fn send_frame(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: Message,
    write_wait: Duration,
) -> Result<(), &'static str> {
    match time::timeout(write_wait, ws_tx.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => Err("socket error"),
        Err(_) => Err("write deadline passed"),
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
    write_wait: Duration,
) -> Result<(), &'static str> {
    let close = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    send_frame(ws_tx, close, write_wait).await
}
