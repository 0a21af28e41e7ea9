// Chat message convention shared by server and client
pub mod message;

// Connection registry and broadcast fan-out
pub mod registry;

// Per-connection lifecycle actor
pub mod connection;

// WebSocket API
pub mod api;

// Reconnecting client supervisor
pub mod client;

// Configuration
pub mod config;
