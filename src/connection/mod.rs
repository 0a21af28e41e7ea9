use crate::registry::{ConnectionRegistry, RegisteredPeer};
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long the writer task gets to flush queued frames after the reader exits
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a single connection.
///
/// Inbound frames are pumped and broadcast only while `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

/// Per-connection task.
///
/// Registers the socket, pumps its inbound frames into the broadcaster, and
/// deregisters on every exit path. The socket is split so that a dedicated
/// writer task owns the sink: broadcast fan-out only ever touches this
/// connection's queue, never its transport.
pub struct ConnectionActor {
    registry: Arc<ConnectionRegistry>,
}

impl ConnectionActor {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Drive the connection to completion.
    ///
    /// Returns once the transport is closed and the connection has been
    /// removed from the registry.
    pub async fn run(self, socket: WebSocket) {
        let mut state = ConnectionState::Connecting;
        debug!(state = ?state, "Transport handshake complete");

        let RegisteredPeer {
            id,
            sender,
            outbound,
            mut shutdown,
        } = self.registry.register();
        state = ConnectionState::Open;
        debug!(connection_id = %id, state = ?state, "Connection open");

        let (sink, mut stream) = socket.split();
        let mut writer = tokio::spawn(writer_task(sink, outbound));

        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(frame @ (Message::Text(_) | Message::Binary(_)))) => {
                        debug!(connection_id = %id, "Frame received");
                        self.registry.broadcast(id, frame).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        // Pong rides the outbound queue so the writer task
                        // stays the sink's only writer. If the queue is full
                        // the pong is skipped; the peer will ping again.
                        let _ = sender.try_send(Message::Pong(data));
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(connection_id = %id, "Client initiated close");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Pong, nothing to do
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(connection_id = %id, "WebSocket stream ended");
                        break;
                    }
                },

                _ = shutdown.changed() => {
                    info!(connection_id = %id, "Connection evicted by registry");
                    break;
                }
            }
        }

        state = ConnectionState::Closing;
        debug!(connection_id = %id, state = ?state, "Connection closing");

        // At-least-once; a no-op if the registry already evicted us
        self.registry.unregister(id);

        // Dropping the last local sender lets the writer drain and exit.
        // A transport that refuses the final writes is abandoned instead.
        drop(sender);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }

        state = ConnectionState::Closed;
        debug!(connection_id = %id, state = ?state, "Connection closed");
    }
}

/// Writer task: sole owner of the sink.
///
/// Forwards queued frames until the queue closes or the transport rejects a
/// write, so each frame reaches the wire whole and in order.
async fn writer_task(mut sink: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<Message>) {
    while let Some(frame) = outbound.recv().await {
        if sink.send(frame).await.is_err() {
            // Transport is gone; the reader side observes the same failure
            break;
        }
    }
    let _ = sink.close().await;
}
