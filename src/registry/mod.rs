use axum::extract::ws::Message;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;


/// Unique identifier assigned to a connection at registration
pub type ConnectionId = Uuid;

/// Whether a broadcast is delivered back to the connection it came from.
///
/// `All` is the default: every frame is echoed to every connected socket,
/// sender included. `ExcludeSender` is the conventional chat-room
/// alternative; switching to it must be coordinated with clients that rely
/// on the echo to render their own messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPolicy {
    #[default]
    All,
    ExcludeSender,
}

/// Registry-owned send capability for one connection
struct PeerHandle {
    /// Outbound frame queue, drained by the connection's writer task
    tx: mpsc::Sender<Message>,

    /// Signals the connection actor to shut down when the peer is evicted
    shutdown: watch::Sender<()>,
}

/// Handed back to the connection actor by `register`
pub struct RegisteredPeer {
    pub id: ConnectionId,

    /// Clone of the outbound sender, for replies local to this connection
    pub sender: mpsc::Sender<Message>,

    /// Receiving end of the outbound frame queue
    pub outbound: mpsc::Receiver<Message>,

    /// Resolves when the registry evicts this connection
    pub shutdown: watch::Receiver<()>,
}

/// Authoritative set of live connections with broadcast fan-out.
///
/// Structural access goes through the map; no map guard is held across an
/// await. Socket I/O happens in per-connection writer tasks, so a slow peer
/// can only back up its own bounded queue. A queue that stays full past
/// `write_timeout` gets its peer evicted rather than held open forever.
pub struct ConnectionRegistry {
    peers: DashMap<ConnectionId, PeerHandle>,
    policy: BroadcastPolicy,
    channel_capacity: usize,
    write_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(policy: BroadcastPolicy, channel_capacity: usize, write_timeout: Duration) -> Self {
        Self {
            peers: DashMap::new(),
            policy,
            channel_capacity,
            write_timeout,
        }
    }

    /// Add a new connection to the live set.
    ///
    /// The connection is a broadcast target as soon as this returns.
    pub fn register(&self) -> RegisteredPeer {
        let id = Uuid::new_v4();
        let (tx, outbound) = mpsc::channel(self.channel_capacity);
        let (shutdown_tx, shutdown) = watch::channel(());

        self.peers.insert(
            id,
            PeerHandle {
                tx: tx.clone(),
                shutdown: shutdown_tx,
            },
        );

        info!(
            connection_id = %id,
            connections = self.peers.len(),
            "Client connected"
        );

        RegisteredPeer {
            id,
            sender: tx,
            outbound,
            shutdown,
        }
    }

    /// Remove a connection from the live set.
    ///
    /// Idempotent: unknown or already-removed ids are a no-op. Safe to call
    /// concurrently with `broadcast`.
    pub fn unregister(&self, id: ConnectionId) {
        if self.peers.remove(&id).is_some() {
            info!(
                connection_id = %id,
                connections = self.peers.len(),
                "Client disconnected"
            );
        }
    }

    /// Deliver `frame` to every currently registered connection.
    ///
    /// The peer set is snapshotted up front, so connections unregistered
    /// before the call see nothing and connections registered mid-flight may
    /// or may not. Fan-out is concurrent and best-effort: a peer whose queue
    /// is closed or stays full past the write timeout is evicted without
    /// delaying or aborting delivery to the rest. Returns the number of
    /// successful deliveries.
    pub async fn broadcast(&self, sender_id: ConnectionId, frame: Message) -> usize {
        let targets: Vec<(ConnectionId, mpsc::Sender<Message>)> = self
            .peers
            .iter()
            .filter(|entry| match self.policy {
                BroadcastPolicy::All => true,
                BroadcastPolicy::ExcludeSender => *entry.key() != sender_id,
            })
            .map(|entry| (*entry.key(), entry.value().tx.clone()))
            .collect();
        // Map guards are released here; everything below waits on peer queues only.

        let timeout = self.write_timeout;
        let sends = targets.into_iter().map(|(id, tx)| {
            let frame = frame.clone();
            async move { (id, tx.send_timeout(frame, timeout).await) }
        });

        let mut delivered = 0;
        for (id, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                    warn!(connection_id = %id, "Outbound queue stalled, evicting peer");
                    self.evict(id);
                }
                Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                    debug!(connection_id = %id, "Outbound queue closed, evicting peer");
                    self.evict(id);
                }
            }
        }

        delivered
    }

    /// Remove a peer and signal its actor to shut down.
    fn evict(&self, id: ConnectionId) {
        if let Some((_, peer)) = self.peers.remove(&id) {
            let _ = peer.shutdown.send(());
            info!(
                connection_id = %id,
                connections = self.peers.len(),
                "Peer evicted"
            );
        }
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(BroadcastPolicy::All, 64, Duration::from_secs(5))
    }
}
