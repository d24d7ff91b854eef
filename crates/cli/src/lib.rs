//! WebSocket transport, file-backed store and command line for tabrelay.

pub mod cli;
pub mod client;
pub mod config;
pub mod logging;
pub mod server;
pub mod store;
