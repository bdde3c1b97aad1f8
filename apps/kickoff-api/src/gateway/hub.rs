//! Zone-scoped broadcast hub.
//!
//! A single task owns the registry of live connections, grouped by zone.
//! Every mutation and every broadcast is a command on one queue, so they
//! are serialized without locks. Each registered connection contributes
//! the sending half of its bounded zone queue; the hub holds the only
//! copy, and dropping it is how a connection's queue gets closed.

use std::collections::{BTreeMap, HashMap};

use axum::extract::ws::Utf8Bytes;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

/// An encoded outbound envelope, shared by every recipient.
pub type Frame = Utf8Bytes;

enum HubCommand {
    Register {
        conn_id: String,
        zone_id: String,
        queue: mpsc::Sender<Frame>,
    },
    Unregister {
        conn_id: String,
    },
    ChangeZone {
        conn_id: String,
        zone_id: String,
    },
    Broadcast {
        zone_id: String,
        frame: Frame,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct HubStats {
    pub connections: usize,
    /// Live connection count per zone. Empty zones never appear.
    pub zones: BTreeMap<String, usize>,
}

/// Cloneable handle to the hub task. Commands never block the caller.
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Hand the connection's zone queue to the hub, subscribing it to `zone_id`.
    /// Registering an id that is already present replaces its queue and zone.
    pub fn register(&self, conn_id: &str, zone_id: &str, queue: mpsc::Sender<Frame>) {
        self.send(HubCommand::Register {
            conn_id: conn_id.to_string(),
            zone_id: zone_id.to_string(),
            queue,
        });
    }

    /// Remove the connection and close its zone queue. Unknown ids are ignored.
    pub fn unregister(&self, conn_id: &str) {
        self.send(HubCommand::Unregister {
            conn_id: conn_id.to_string(),
        });
    }

    /// Move a registered connection to another zone, keeping its queue open.
    pub fn change_zone(&self, conn_id: &str, zone_id: &str) {
        self.send(HubCommand::ChangeZone {
            conn_id: conn_id.to_string(),
            zone_id: zone_id.to_string(),
        });
    }

    /// Offer `frame` to every connection in `zone_id`. Returns immediately.
    pub fn broadcast(&self, zone_id: &str, frame: Frame) {
        self.send(HubCommand::Broadcast {
            zone_id: zone_id.to_string(),
            frame,
        });
    }

    /// Snapshot of the registry. Answered after every command queued before it.
    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats { reply });
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            tracing::warn!("hub task is gone, command dropped");
        }
    }
}

/// Registry state, owned exclusively by the hub task.
#[derive(Default)]
pub struct Hub {
    zones: HashMap<String, HashMap<String, mpsc::Sender<Frame>>>,
    /// Reverse index: connection → zone.
    membership: HashMap<String, String>,
}

impl Hub {
    /// Start the hub task. It stops once every handle has been dropped.
    pub fn spawn() -> HubHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(Hub::default().run(rx));
        HubHandle { commands }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::Register {
                    conn_id,
                    zone_id,
                    queue,
                } => self.register(conn_id, zone_id, queue),
                HubCommand::Unregister { conn_id } => {
                    if self.remove(&conn_id).is_some() {
                        tracing::debug!(%conn_id, "connection unregistered");
                    }
                }
                HubCommand::ChangeZone { conn_id, zone_id } => self.change_zone(conn_id, zone_id),
                HubCommand::Broadcast { zone_id, frame } => self.broadcast(&zone_id, frame),
                HubCommand::Stats { reply } => {
                    let _ = reply.send(self.stats());
                }
            }
        }
        tracing::debug!("hub stopped");
    }

    fn register(&mut self, conn_id: String, zone_id: String, queue: mpsc::Sender<Frame>) {
        self.remove(&conn_id);
        tracing::debug!(%conn_id, %zone_id, "connection registered");
        self.zones
            .entry(zone_id.clone())
            .or_default()
            .insert(conn_id.clone(), queue);
        self.membership.insert(conn_id, zone_id);
    }

    fn change_zone(&mut self, conn_id: String, zone_id: String) {
        match self.remove(&conn_id) {
            Some(queue) => self.register(conn_id, zone_id, queue),
            None => tracing::debug!(%conn_id, "zone change for unregistered connection"),
        }
    }

    /// Detach a connection, returning its queue. Empty zones are dropped.
    fn remove(&mut self, conn_id: &str) -> Option<mpsc::Sender<Frame>> {
        let zone_id = self.membership.remove(conn_id)?;
        let members = self.zones.get_mut(&zone_id)?;
        let queue = members.remove(conn_id);
        if members.is_empty() {
            self.zones.remove(&zone_id);
        }
        queue
    }

    fn broadcast(&mut self, zone_id: &str, frame: Frame) {
        let Some(members) = self.zones.get(zone_id) else {
            return;
        };

        let mut evicted = Vec::new();
        for (conn_id, queue) in members {
            match queue.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(%conn_id, %zone_id, "outbound queue full, evicting connection");
                    evicted.push(conn_id.clone());
                }
                Err(TrySendError::Closed(_)) => evicted.push(conn_id.clone()),
            }
        }

        for conn_id in evicted {
            // Dropping the sender closes the queue; the writer sees it and
            // shuts the socket.
            drop(self.remove(&conn_id));
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.membership.len(),
            zones: self
                .zones
                .iter()
                .map(|(zone_id, members)| (zone_id.clone(), members.len()))
                .collect(),
        }
    }
}
