use crate::message::ChatMessage;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Fixed-delay reconnection strategy.
///
/// Retries every 3 seconds, forever, with no backoff growth and no retry cap.
/// Tests inject a zero delay.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(3000),
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Zero-delay policy for tests
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
        }
    }
}

/// Connection lifecycle and inbound traffic, as seen by the consumer
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Message(ChatMessage),
    Disconnected,
}

/// Maintains a single connection to the relay, reconnecting indefinitely.
///
/// At most one connection is live at a time: the supervisor is a linear loop
/// of connect, pump, wait, reconnect. A lost connection is replaced after the
/// policy delay; missed messages are not replayed.
pub struct ChatClient {
    url: String,
    user: String,
    policy: ReconnectPolicy,
}

impl ChatClient {
    pub fn new(url: impl Into<String>, user: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            policy,
        }
    }

    /// Run the supervisor loop.
    ///
    /// Inbound frames that parse as the chat convention are delivered on
    /// `events`; malformed payloads are logged and dropped. Strings received
    /// on `outbound` are wrapped in the convention and sent on the live
    /// connection, or dropped while disconnected. Returns when the consumer
    /// drops either channel end.
    pub async fn run(self, events: mpsc::Sender<ClientEvent>, mut outbound: mpsc::Receiver<String>) {
        loop {
            match connect_async(self.url.as_str()).await {
                Ok((mut ws, _response)) => {
                    info!(url = %self.url, "Connected to relay");
                    if events.send(ClientEvent::Connected).await.is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            frame = ws.next() => match frame {
                                Some(Ok(WsMessage::Text(raw))) => {
                                    match ChatMessage::parse(raw.as_str()) {
                                        Ok(msg) => {
                                            if events.send(ClientEvent::Message(msg)).await.is_err() {
                                                return;
                                            }
                                        }
                                        // Convention violations are dropped, never fatal
                                        Err(e) => debug!(error = %e, "Dropping malformed payload"),
                                    }
                                }
                                Some(Ok(WsMessage::Close(_))) | None => break,
                                Some(Ok(_)) => {
                                    // Binary frames are not part of the chat
                                    // convention; ping/pong is transport-level
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "WebSocket error");
                                    break;
                                }
                            },

                            text = outbound.recv() => match text {
                                Some(text) => {
                                    let msg = ChatMessage::new(self.user.clone(), text);
                                    match msg.to_json() {
                                        Ok(json) => {
                                            if ws.send(WsMessage::text(json)).await.is_err() {
                                                break;
                                            }
                                        }
                                        Err(e) => warn!(error = %e, "Failed to encode message"),
                                    }
                                }
                                None => {
                                    let _ = ws.close(None).await;
                                    return;
                                }
                            },
                        }
                    }

                    info!(url = %self.url, "Disconnected from relay");
                    if events.send(ClientEvent::Disconnected).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Connection attempt failed");
                    if events.send(ClientEvent::Disconnected).await.is_err() {
                        return;
                    }
                }
            }

            debug!(
                delay_ms = self.policy.delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            if !self.wait_for_retry(&mut outbound).await {
                return;
            }
        }
    }

    /// Sleep out the reconnect delay.
    ///
    /// Outbound messages arriving while there is no connection are dropped;
    /// there is no queue-and-flush on reconnect. Returns false when the
    /// consumer has dropped its sender and the supervisor should stop.
    async fn wait_for_retry(&self, outbound: &mut mpsc::Receiver<String>) -> bool {
        let deadline = tokio::time::sleep(self.policy.delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                text = outbound.recv() => match text {
                    Some(_) => debug!("Not connected, dropping outbound message"),
                    None => return false,
                },
            }
        }
    }
}
