use crate::registry::BroadcastPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Complete relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Broadcast fan-out configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Whether the sender receives its own message back
    #[serde(default)]
    pub policy: BroadcastPolicy,
    /// Per-connection outbound frame buffer (frames)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// How long a full outbound queue may stall before the peer is evicted (ms)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_channel_capacity() -> usize {
    64
}

fn default_write_timeout_ms() -> u64 {
    5000
}

impl BroadcastConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            policy: BroadcastPolicy::default(),
            channel_capacity: default_channel_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

/// Client supervisor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Fixed delay between reconnection attempts (ms)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

impl ClientConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            broadcast: BroadcastConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Apply environment overrides.
    ///
    /// `PORT` overrides the configured listener port.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("PORT") {
            if let Ok(p) = v.parse::<u16>() {
                self.server.port = p;
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: RelayConfig = toml::from_str(&contents)?;
    Ok(config)
}
