//! Broadcast Hub state: replay cache plus connection registry behind one lock.
//!
//! Every mutation (cache push, fan-out, register, unregister, sweep) takes
//! the same `tokio::sync::Mutex`, so a joining connection gets its replay
//! and its first live event in one total order with every publish.
//! Nothing inside the critical section awaits I/O: each connection owns a
//! bounded queue drained by its own writer task and fan-out uses `try_send`.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

use tokio::sync::{mpsc, Mutex};

use mintfeed_core::cache::EventCache;
use mintfeed_core::types::EnrichedEvent;

use crate::config::HubConfig;
use crate::error::HubError;

pub type ConnectionId = u64;

/// Lifecycle of one consumer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// TCP accepted, WebSocket handshake in progress.
    Connecting,
    /// Registered and receiving broadcasts.
    Open,
    /// Close frame queued; no further broadcasts.
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A frame for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// One serialized `EnrichedEvent`.
    Event(String),
    /// Liveness probe.
    Ping,
    /// Close the connection after flushing what is queued before it.
    Close,
}

/// Handed to the connection task on registration.
#[derive(Debug)]
pub struct Registration {
    pub id: ConnectionId,
    /// Replay frames first, then live events and control frames.
    pub outbound: mpsc::Receiver<Outbound>,
    pub replayed: usize,
}

/// Result of one liveness sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: Vec<ConnectionId>,
}

struct ConnectionHandle {
    tx: mpsc::Sender<Outbound>,
    alive: bool,
    state: ConnectionState,
    peer: Option<SocketAddr>,
}

struct HubState {
    cache: EventCache,
    connections: HashMap<ConnectionId, ConnectionHandle>,
    next_id: ConnectionId,
    shutting_down: bool,
}

impl HubState {
    /// Queue `Close` (best effort) and drop the connection from the registry.
    fn evict(&mut self, id: ConnectionId, reason: &str) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.state = ConnectionState::Closing;
            let _ = conn.tx.try_send(Outbound::Close);
            tracing::info!(conn_id = id, peer = ?conn.peer, state = %conn.state, reason, "connection evicted");
        }
    }
}

pub struct Hub {
    state: Mutex<HubState>,
    config: HubConfig,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            state: Mutex::new(HubState {
                cache: EventCache::new(config.cache_capacity),
                connections: HashMap::new(),
                next_id: 1,
                shutting_down: false,
            }),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a connection. Its queue is pre-loaded with the cache snapshot,
    /// oldest first, before it becomes visible to `publish`.
    pub async fn register(&self, peer: Option<SocketAddr>) -> Result<Registration, HubError> {
        let (tx, outbound) = mpsc::channel(self.config.connection_queue());
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return Err(HubError::ShuttingDown);
        }

        let id = state.next_id;
        state.next_id += 1;

        let mut replayed = 0;
        for event in state.cache.iter() {
            let payload = match event.to_json() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(conn_id = id, mint = %event.mint, error = %e, "skipping unserializable cached event");
                    continue;
                }
            };
            // The queue holds at least a full cache, so this cannot be full.
            if tx.try_send(Outbound::Event(payload)).is_err() {
                break;
            }
            replayed += 1;
        }

        state.connections.insert(
            id,
            ConnectionHandle {
                tx,
                alive: true,
                state: ConnectionState::Open,
                peer,
            },
        );
        tracing::info!(conn_id = id, peer = ?peer, replayed, connections = state.connections.len(), "connection open");

        Ok(Registration {
            id,
            outbound,
            replayed,
        })
    }

    /// Remove a connection whose socket is gone. Returns whether it was registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.connections.remove(&id).is_some();
        if removed {
            tracing::info!(conn_id = id, connections = state.connections.len(), "connection closed");
        }
        removed
    }

    /// Record a liveness acknowledgement (pong or any inbound frame).
    pub async fn ack(&self, id: ConnectionId) {
        if let Some(conn) = self.state.lock().await.connections.get_mut(&id) {
            conn.alive = true;
        }
    }

    /// Cache `event` and forward it to every open connection.
    ///
    /// Connections whose queue is full or closed are evicted; the others are
    /// unaffected. Returns the number of connections the event was queued for.
    pub async fn publish(&self, event: EnrichedEvent) -> Result<usize, HubError> {
        let payload = event.to_json()?;
        let mut state = self.state.lock().await;
        if state.shutting_down {
            return Err(HubError::ShuttingDown);
        }
        state.cache.push(event);

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (&id, conn) in &state.connections {
            match conn.tx.try_send(Outbound::Event(payload.clone())) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => failed.push((id, "outbound queue full")),
                Err(mpsc::error::TrySendError::Closed(_)) => failed.push((id, "writer gone")),
            }
        }
        for (id, reason) in failed {
            state.evict(id, reason);
        }
        Ok(delivered)
    }

    /// One liveness pass: evict connections that never answered the previous
    /// probe, then mark the rest unanswered and probe them again.
    pub async fn sweep(&self) -> SweepReport {
        let mut state = self.state.lock().await;
        let mut report = SweepReport::default();
        let mut failed = Vec::new();

        for (&id, conn) in state.connections.iter_mut() {
            if !conn.alive {
                failed.push((id, "missed liveness probe"));
                continue;
            }
            conn.alive = false;
            match conn.tx.try_send(Outbound::Ping) {
                Ok(()) => report.probed += 1,
                Err(_) => failed.push((id, "probe could not be queued")),
            }
        }
        for (id, reason) in failed {
            state.evict(id, reason);
            report.evicted.push(id);
        }
        report.evicted.sort_unstable();

        if !report.evicted.is_empty() {
            tracing::debug!(probed = report.probed, evicted = report.evicted.len(), "liveness sweep");
        }
        report
    }

    /// Close every connection and refuse new ones.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shutting_down = true;
        let ids: Vec<_> = state.connections.keys().copied().collect();
        for id in ids {
            state.evict(id, "shutdown");
        }
        tracing::info!("hub shut down");
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Cached events, oldest first.
    pub async fn snapshot(&self) -> Vec<EnrichedEvent> {
        self.state.lock().await.cache.snapshot()
    }
}
