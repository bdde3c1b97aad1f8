#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use chrono::Utc;
use kickoff_api::config::{Config, GatewayConfig};
use kickoff_api::db::migrations::{run_pending, with_test_db_suffix};
use kickoff_api::db::pool::DbPool;
use kickoff_api::models::account::NewAccount;
use kickoff_api::store::{AccountStore, MemoryStore, PgStore};
use kickoff_api::AppState;
use kickoff_common::id::{prefix, prefixed_ulid};
use kickoff_common::SnowflakeGenerator;
use tokio::sync::OnceCell;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Accounts every test state starts with: (id, display name).
pub const PLAYERS: [(&str, &str); 5] = [
    ("u1", "Ana"),
    ("u2", "Beto"),
    ("u3", "Caro"),
    ("u4", "Dani"),
    ("u5", "Eli"),
];

/// Build a test AppState over the in-memory store with seeded players.
pub fn test_state(gateway: GatewayConfig) -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for (id, name) in PLAYERS {
        store.seed_account(id, name);
    }

    let config = Config {
        database_url: String::new(),
        port: 0,
        worker_id: 0,
        gateway,
    };

    (AppState::new(config, store.clone()), store)
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState, Arc<MemoryStore>) {
    let (state, store) = test_state(GatewayConfig::default());
    let app = kickoff_api::routes::router().with_state(state.clone());
    (app, state, store)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_ws_server(gateway: GatewayConfig) -> (SocketAddr, AppState, Arc<MemoryStore>) {
    let (state, store) = test_state(gateway);
    let app = kickoff_api::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, store)
}

pub async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let url = format!("ws://{addr}{path}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Connect to the match board and bind to `zone_id`, consuming the snapshot.
pub async fn join_zone(addr: SocketAddr, zone_id: &str) -> (WsClient, serde_json::Value) {
    let mut ws = connect(addr, "/ws/matches").await;
    send_json(&mut ws, serde_json::json!({ "zone_id": zone_id })).await;
    let snapshot = recv_json(&mut ws).await;
    assert_eq!(snapshot["status"], "zone_snapshot");
    (ws, snapshot)
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Next text frame as JSON, skipping control frames.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");

        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("parse frame");
        }
    }
}

/// Assert that no text frame arrives within `wait`.
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    let deadline = time::Instant::now() + wait;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                panic!("expected silence, got: {text}")
            }
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("connection ended unexpectedly: {other:?}"),
        }
    }
}

/// Poll the hub until `connections` reaches `expected`.
pub async fn wait_for_connections(state: &AppState, expected: usize) {
    let result = time::timeout(Duration::from_secs(5), async {
        loop {
            if state.hub.stats().await.connections == expected {
                return;
            }
            time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "hub never reached {expected} connections");
}

// ---------------------------------------------------------------------------
// Postgres-backed fixtures
// ---------------------------------------------------------------------------

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// A `PgStore` on the `_test` database, plus the raw pool for cleanup.
pub struct PgFixture {
    pub store: Arc<PgStore>,
    pub db: DbPool,
    /// Zone private to this test, so suites can share one database.
    pub zone_id: String,
    accounts: Vec<String>,
}

/// Connect to `<DATABASE_URL>_test`, migrating it once per test binary.
/// Returns `None` (and the test returns early) when no database is configured.
pub async fn pg_fixture() -> Option<PgFixture> {
    let env_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(env_path);

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres-backed test");
        return None;
    };
    let database_url = with_test_db_suffix(&database_url);

    MIGRATED
        .get_or_init(|| async {
            let url = database_url.clone();
            tokio::task::spawn_blocking(move || run_pending(&url))
                .await
                .expect("migration task")
                .expect("migrate test database");
        })
        .await;

    let db = kickoff_api::db::pool::connect(&database_url)
        .await
        .expect("test database reachable");
    let store = Arc::new(PgStore::new(db.clone(), Arc::new(SnowflakeGenerator::new(1))));

    Some(PgFixture {
        store,
        db,
        zone_id: prefixed_ulid("zone"),
        accounts: Vec::new(),
    })
}

impl PgFixture {
    /// Insert an account and return its id.
    pub async fn seed_account(&mut self, display_name: &str) -> String {
        let id = prefixed_ulid(prefix::ACCOUNT);
        self.store
            .create_account(NewAccount {
                id: id.clone(),
                username: id.to_lowercase(),
                display_name: display_name.to_string(),
                password_hash: "unused".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("seed account");
        self.accounts.push(id.clone());
        id
    }

    /// Remove this test's matches (cascading to players and messages),
    /// then its accounts.
    pub async fn cleanup(self) {
        use diesel::prelude::*;
        use diesel_async::RunQueryDsl;
        use kickoff_api::db::schema::{accounts, matches};

        let mut conn = self.db.get().await.expect("pool");
        diesel::delete(matches::table.filter(matches::zone_id.eq(&self.zone_id)))
            .execute(&mut conn)
            .await
            .ok();
        diesel::delete(accounts::table.filter(accounts::id.eq_any(&self.accounts)))
            .execute(&mut conn)
            .await
            .ok();
    }
}
