// Reconnecting client supervisor

mod supervisor;

pub use supervisor::{ChatClient, ClientEvent, ReconnectPolicy};
