use chrono::Local;
use serde::{Deserialize, Serialize};


/// Chat message convention layered on top of the relay.
///
/// The relay itself treats frames as opaque payloads and never parses them;
/// this envelope is what clients exchange. `text` may carry a data-URI-encoded
/// image instead of plain text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Display name chosen by the sender
    pub user: String,

    /// Message body, or a `data:image/...` payload
    pub text: String,

    /// Sender-local wall-clock time, formatted HH:MM
    pub timestamp: String,
}

impl ChatMessage {
    /// Build a message stamped with the current local time.
    pub fn new(user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            text: text.into(),
            timestamp: Local::now().format("%H:%M").to_string(),
        }
    }

    /// Parse the wire convention.
    ///
    /// Consumers log and drop failures rather than surface them; the relay
    /// never rejects a frame for being malformed.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serialize to the wire convention.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Whether the text field carries an embedded image payload.
    pub fn is_image(&self) -> bool {
        self.text.starts_with("data:image/")
    }
}
