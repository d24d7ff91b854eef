//! Entry point for transports.
//!
//! A transport creates one [`Connection`] per socket and reports three events
//! on it: every text message ([`Gateway::on_message`]), every keepalive
//! answer ([`Gateway::on_keepalive`]) and the final close
//! ([`Gateway::on_close`]). Replies are pushed back through the connection's
//! own [`MessageChannel`].

use std::sync::Arc;

use tabrelay_protocol::{CONTROLLER_PREFIX, PING};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::MessageChannel;
use crate::config::GatewayConfig;
use crate::correlator::CommandCorrelator;
use crate::error::Result;
use crate::outcome::{ForwardingSink, OutcomeSink};
use crate::packet::{PacketHandler, Reply};
use crate::router::CommandRouter;
use crate::session::{EvictReason, SessionRegistry};
use crate::store::AgentStore;

/// Per-socket state held by the transport.
#[derive(Debug)]
pub struct Connection {
	channel: Arc<dyn MessageChannel>,
	access_code: Option<String>,
}

impl Connection {
	pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
		Self {
			channel,
			access_code: None,
		}
	}

	pub fn channel(&self) -> &Arc<dyn MessageChannel> {
		&self.channel
	}

	/// Access code this connection registered under, if any.
	pub fn access_code(&self) -> Option<&str> {
		self.access_code.as_deref()
	}

	/// Binds the connection to `access_code`, returning the previous code if
	/// it was a different one.
	pub(crate) fn bind(&mut self, access_code: &str) -> Option<String> {
		match self.access_code.replace(access_code.to_string()) {
			Some(previous) if previous != access_code => Some(previous),
			_ => None,
		}
	}

	pub(crate) fn unbind(&mut self) {
		self.access_code = None;
	}
}

/// How an inbound text message is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound<'a> {
	/// Raw heartbeat.
	Ping,
	/// `main:` command line from a controller.
	Controller(&'a str),
	/// JSON envelope from an agent.
	Packet(&'a str),
}

impl<'a> Inbound<'a> {
	pub fn classify(text: &'a str) -> Self {
		if text.trim() == PING {
			return Inbound::Ping;
		}
		match text.split_once(':') {
			Some((prefix, _)) if prefix == CONTROLLER_PREFIX => Inbound::Controller(text),
			_ => Inbound::Packet(text),
		}
	}
}

/// The assembled gateway: registry, correlator, router and packet handler.
#[derive(Clone)]
pub struct Gateway {
	registry: SessionRegistry,
	router: CommandRouter,
	packets: PacketHandler,
}

impl Gateway {
	/// Builds a gateway whose outcomes are logged and forwarded to the
	/// issuing controller.
	pub fn new(config: &GatewayConfig, store: Arc<dyn AgentStore>) -> Result<Self> {
		Self::with_sink(config, store, Arc::new(ForwardingSink))
	}

	pub fn with_sink(
		config: &GatewayConfig,
		store: Arc<dyn AgentStore>,
		sink: Arc<dyn OutcomeSink>,
	) -> Result<Self> {
		config.validate()?;
		let registry = SessionRegistry::new(config.session_timeout, store);
		let correlator = CommandCorrelator::new(config.command_timeout, sink);
		let router = CommandRouter::new(registry.clone(), correlator);
		Ok(Self {
			packets: PacketHandler::new(router.clone()),
			registry,
			router,
		})
	}

	/// Starts the periodic sweep. Abort the handle to stop it.
	pub fn start(&self) -> JoinHandle<()> {
		info!(
			target = "tabrelay.gateway",
			session_timeout_ms = self.registry.session_timeout().as_millis() as u64,
			command_timeout_ms = self.router.correlator().command_timeout().as_millis() as u64,
			"gateway started"
		);
		self.registry.spawn_sweeper()
	}

	pub fn registry(&self) -> &SessionRegistry {
		&self.registry
	}

	pub fn router(&self) -> &CommandRouter {
		&self.router
	}

	pub fn connect(&self, channel: Arc<dyn MessageChannel>) -> Connection {
		debug!(target = "tabrelay.gateway", channel = %channel.id(), "connection opened");
		Connection::new(channel)
	}

	/// Handles one text message and sends the reply, if any, back on the
	/// same connection.
	pub fn on_message(&self, conn: &mut Connection, text: &str) {
		let reply = self.reply_to(conn, text);
		self.deliver(conn, reply);
	}

	/// Computes the reply to one text message without sending it.
	pub fn reply_to(&self, conn: &mut Connection, text: &str) -> Reply {
		match Inbound::classify(text) {
			Inbound::Ping => Reply::pong(),
			Inbound::Controller(line) => {
				match self.router.handle_line(line, Some(conn.channel().clone())) {
					Ok(report) => Reply::Packet(report.to_packet()),
					Err(err) => {
						info!(target = "tabrelay.gateway", channel = %conn.channel().id(), error = %err, "controller command rejected");
						Reply::from_error(&err, conn)
					}
				}
			}
			Inbound::Packet(text) => self.packets.handle_text(conn, text),
		}
	}

	/// Transport keepalive answered; refreshes the bound session.
	pub fn on_keepalive(&self, conn: &Connection) {
		if let Some(code) = conn.access_code() {
			self.registry.touch_channel(code, conn.channel().id());
		}
	}

	/// The socket is gone. Evicts the bound session unless it has since
	/// moved to another connection.
	pub fn on_close(&self, conn: Connection) {
		debug!(target = "tabrelay.gateway", channel = %conn.channel().id(), access_code = conn.access_code(), "connection closed");
		if let Some(code) = conn.access_code() {
			self.registry.release(code, conn.channel().id());
		}
	}

	/// Waits for queued store writes.
	pub async fn flush(&self) {
		self.registry.flush_store().await;
	}

	/// Sends a reply. A connection that cannot take it is treated as gone.
	fn deliver(&self, conn: &Connection, reply: Reply) {
		let text = match reply {
			Reply::None => return,
			Reply::Raw(text) => text,
			Reply::Packet(packet) => match packet.to_text() {
				Ok(text) => text,
				Err(err) => {
					debug!(target = "tabrelay.gateway", error = %err, "failed to encode reply");
					return;
				}
			},
		};
		if let Err(err) = conn.channel().send_text(text) {
			debug!(target = "tabrelay.gateway", channel = %conn.channel().id(), error = %err, "reply dropped");
			if let Some(code) = conn.access_code() {
				self.registry
					.evict_channel(code, conn.channel().id(), EvictReason::ChannelFailed);
			}
		}
	}
}
