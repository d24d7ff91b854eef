//! Wire types shared by the tabrelay gateway, its agents and controllers.
//!
//! Structured messages travel as JSON envelopes `{"type": <kind>, "data": {...}}`.
//! Two plain-text forms sit beside them: the [`PING`]/[`PONG`] heartbeat pair and
//! controller command lines starting with [`CONTROLLER_PREFIX`].

mod command;
mod packet;

pub use command::{CommandCategory, CommandName, UnknownCommandName};
pub use packet::{
	AgentPacket, BrowserEntry, CommandPacket, CommandResult, DecodeError, DispatchTarget,
	GatewayPacket, OutcomePacket, UNKNOWN_ACCESS_CODE,
};

/// Raw text heartbeat sent by agents.
pub const PING: &str = "ping";

/// Raw text reply to [`PING`].
pub const PONG: &str = "pong";

/// Prefix marking a controller command line (`main:goto url=...`).
pub const CONTROLLER_PREFIX: &str = "main";

/// Default port the gateway listens on.
pub const DEFAULT_PORT: u16 = 19988;
