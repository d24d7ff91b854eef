//! The agent-facing packet protocol.
//!
//! | kind             | effect                          | reply            |
//! |------------------|---------------------------------|------------------|
//! | `register`       | insert or replace the session   | `success`        |
//! | `unregister`     | evict the session               | `success`        |
//! | `heartbeat`      | refresh liveness                | `heartbeat_ack`  |
//! | `command_result` | resolve the pending command     | none             |
//! | anything else    | none                            | `error`          |
//!
//! Failures never close the connection; they become `error` replies.

use tabrelay_protocol::{AgentPacket, GatewayPacket, PONG, UNKNOWN_ACCESS_CODE};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::gateway::Connection;
use crate::router::CommandRouter;
use crate::session::SessionRegistry;
use crate::time::now_ms;

/// What to send back on the connection a message arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
	None,
	/// Plain text, outside the JSON envelope.
	Raw(String),
	Packet(GatewayPacket),
}

impl Reply {
	pub fn pong() -> Self {
		Reply::Raw(PONG.to_string())
	}

	/// Error reply for a failed message.
	///
	/// The access code comes from the error, then from the connection, and
	/// falls back to `"unknown"`.
	pub fn from_error(err: &Error, conn: &Connection) -> Self {
		let access_code = err.access_code().or(conn.access_code());
		Reply::Packet(GatewayPacket::error(access_code, err.kind(), err.to_string()))
	}
}

/// Applies agent packets to the registry and router.
#[derive(Clone)]
pub struct PacketHandler {
	registry: SessionRegistry,
	router: CommandRouter,
}

impl PacketHandler {
	pub fn new(router: CommandRouter) -> Self {
		Self {
			registry: router.registry().clone(),
			router,
		}
	}

	/// Decodes and handles one envelope, converting any failure into an
	/// `error` reply.
	pub fn handle_text(&self, conn: &mut Connection, text: &str) -> Reply {
		let outcome = AgentPacket::decode(text)
			.map_err(Error::from)
			.and_then(|packet| self.handle(conn, packet));
		match outcome {
			Ok(reply) => reply,
			Err(err) => {
				debug!(
					target = "tabrelay.packet",
					channel = %conn.channel().id(),
					access_code = err.access_code().unwrap_or(UNKNOWN_ACCESS_CODE),
					error = %err,
					"rejected agent message"
				);
				Reply::from_error(&err, conn)
			}
		}
	}

	pub fn handle(&self, conn: &mut Connection, packet: AgentPacket) -> Result<Reply> {
		debug!(
			target = "tabrelay.packet",
			channel = %conn.channel().id(),
			kind = packet.kind(),
			access_code = packet.access_code().unwrap_or(UNKNOWN_ACCESS_CODE),
			"agent packet"
		);
		match packet {
			AgentPacket::Register {
				access_code,
				user_agent,
			} => {
				if let Some(previous) = conn.bind(&access_code) {
					info!(target = "tabrelay.packet", previous = %previous, access_code = %access_code, "connection re-registered under a new code");
					self.registry.release(&previous, conn.channel().id());
				}
				self.registry
					.register(&access_code, &user_agent, conn.channel().clone());
				Ok(success(format!("registered {access_code}")))
			}
			AgentPacket::Unregister { access_code } => {
				if conn.access_code() == Some(access_code.as_str()) {
					conn.unbind();
				}
				self.registry.evict(&access_code);
				Ok(success(format!("unregistered {access_code}")))
			}
			AgentPacket::Heartbeat {
				access_code,
				timestamp,
			} => {
				if !self.registry.touch(&access_code) {
					return Err(Error::SessionNotFound { access_code });
				}
				Ok(Reply::Packet(GatewayPacket::HeartbeatAck {
					client_timestamp: timestamp,
					server_timestamp: now_ms(),
				}))
			}
			AgentPacket::CommandResult(result) => {
				self.router.ingest_result(result);
				Ok(Reply::None)
			}
		}
	}
}

fn success(message: String) -> Reply {
	Reply::Packet(GatewayPacket::Success {
		message,
		timestamp: now_ms(),
	})
}
