//! WebSocket endpoint in front of the [`Hub`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;

use crate::error::HubError;
use crate::hub::{ConnectionState, Hub, Outbound};

pub struct HubServer {
    hub: Arc<Hub>,
    listener: TcpListener,
}

impl HubServer {
    pub async fn bind(addr: &str, hub: Arc<Hub>) -> Result<Self, HubError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| HubError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        Ok(Self { hub, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, HubError> {
        self.listener.local_addr().map_err(HubError::Accept)
    }

    /// Accept consumers until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), HubError> {
        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, "broadcast hub listening");
        }
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((tcp, peer)) => {
                        tokio::spawn(serve_connection(self.hub.clone(), tcp, peer));
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("broadcast hub stopped accepting");
        Ok(())
    }
}

/// Run [`Hub::sweep`] every `liveness_interval` until shutdown.
///
/// The first sweep happens one interval after start.
pub fn spawn_liveness(hub: Arc<Hub>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = hub.config().liveness_interval();
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    hub.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

async fn serve_connection(hub: Arc<Hub>, tcp: TcpStream, peer: SocketAddr) {
    tracing::debug!(%peer, state = %ConnectionState::Connecting, "consumer connecting");

    let max = hub.config().max_message_bytes;
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(max);
    ws_config.max_frame_size = Some(max);

    let ws = match tokio_tungstenite::accept_async_with_config(tcp, Some(ws_config)).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(%peer, error = %HubError::Handshake(e.to_string()), "rejecting consumer");
            return;
        }
    };

    let registration = match hub.register(Some(peer)).await {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(%peer, error = %e, "rejecting consumer");
            let (mut sink, _) = ws.split();
            let _ = sink.send(Message::Close(None)).await;
            return;
        }
    };
    let id = registration.id;
    let mut outbound = registration.outbound;
    let (mut sink, mut stream) = ws.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let msg = match frame {
                Outbound::Event(json) => Message::Text(json),
                Outbound::Ping => Message::Ping(Vec::new()),
                Outbound::Close => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            };
            if let Err(e) = sink.send(msg).await {
                tracing::debug!(conn_id = id, error = %e, "write failed");
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
    });

    // The protocol is push-only: inbound frames only count as liveness.
    let hub_reader = hub.clone();
    let reader = async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(Message::Text(text)) => {
                    tracing::trace!(conn_id = id, len = text.len(), "ignoring consumer message");
                    hub_reader.ack(id).await;
                }
                Ok(_) => hub_reader.ack(id).await,
                Err(e) => {
                    tracing::debug!(conn_id = id, error = %e, "read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = &mut writer => {}
        _ = reader => {}
    }
    writer.abort();
    hub.unregister(id).await;
}
