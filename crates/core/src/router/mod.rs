//! Routing controller commands to agents and agent results back to outcomes.

mod command;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde_json::{Map, Value};
use tabrelay_protocol::{
	BrowserEntry, CommandName, CommandPacket, CommandResult, DispatchTarget, GatewayPacket,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use command::{ControllerCommand, Invocation, Target};

use crate::channel::MessageChannel;
use crate::correlator::CommandCorrelator;
use crate::error::{Error, Result};
use crate::outcome::CommandOutcome;
use crate::session::{AgentSession, EvictReason, SessionRegistry};
use crate::time::now_ms;

/// What a controller command did, ready to be sent back to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteReport {
	/// Commands were sent; one entry per agent reached.
	Dispatched {
		command: CommandName,
		targets: Vec<DispatchTarget>,
	},
	/// Snapshot of connected agents.
	Browsers(Vec<BrowserEntry>),
}

impl RouteReport {
	pub fn to_packet(&self) -> GatewayPacket {
		match self {
			RouteReport::Dispatched { command, targets } => GatewayPacket::Dispatched {
				command: *command,
				targets: targets.clone(),
			},
			RouteReport::Browsers(browsers) => GatewayPacket::Browsers {
				browsers: browsers.clone(),
			},
		}
	}
}

/// Resolves targets against the registry and tracks what it sends.
#[derive(Clone)]
pub struct CommandRouter {
	registry: SessionRegistry,
	correlator: CommandCorrelator,
}

impl CommandRouter {
	pub fn new(registry: SessionRegistry, correlator: CommandCorrelator) -> Self {
		Self {
			registry,
			correlator,
		}
	}

	pub fn registry(&self) -> &SessionRegistry {
		&self.registry
	}

	pub fn correlator(&self) -> &CommandCorrelator {
		&self.correlator
	}

	/// Parses and executes one controller line.
	pub fn handle_line(
		&self,
		text: &str,
		issuer: Option<Arc<dyn MessageChannel>>,
	) -> Result<RouteReport> {
		let command = ControllerCommand::parse(text)?;
		self.execute(command, issuer)
	}

	pub fn execute(
		&self,
		command: ControllerCommand,
		issuer: Option<Arc<dyn MessageChannel>>,
	) -> Result<RouteReport> {
		match command {
			ControllerCommand::Exit => Ok(self.exit_all()),
			ControllerCommand::ListBrowsers => Ok(RouteReport::Browsers(self.browsers())),
			ControllerCommand::Invoke(invocation) => self.dispatch(invocation, issuer),
		}
	}

	/// Sends `invocation` to its target and tracks one pending command per
	/// agent reached.
	///
	/// An unknown single target fails before anything is sent or tracked.
	pub fn dispatch(
		&self,
		invocation: Invocation,
		issuer: Option<Arc<dyn MessageChannel>>,
	) -> Result<RouteReport> {
		let Invocation {
			name,
			params,
			target,
		} = invocation;

		let targets = match target {
			Target::Agent(access_code) => {
				let session = self
					.registry
					.get(&access_code)
					.ok_or(Error::UnknownTarget { access_code })?;
				vec![self.send_to(&session, name, &params, issuer, true)?]
			}
			Target::Broadcast => {
				let sessions = self.sessions();
				if sessions.is_empty() {
					return Err(Error::NoAgents);
				}
				sessions
					.iter()
					.filter_map(|session| {
						self.send_to(session, name, &params, issuer.clone(), true)
							.inspect_err(|err| {
								warn!(target = "tabrelay.router", command = %name, error = %err, "skipping agent in broadcast");
							})
							.ok()
					})
					.collect()
			}
		};

		info!(
			target = "tabrelay.router",
			command = %name,
			category = ?name.category(),
			targets = targets.len(),
			"command dispatched"
		);
		Ok(RouteReport::Dispatched {
			command: name,
			targets,
		})
	}

	/// Matches an agent result to its pending command and reports the outcome.
	///
	/// Returns `false` for unknown, already resolved or expired command ids;
	/// such results are dropped.
	pub fn ingest_result(&self, result: CommandResult) -> bool {
		let Some(pending) = self.correlator.resolve(&result.command_id) else {
			warn!(target = "tabrelay.router", command_id = %result.command_id, "result for unknown command discarded");
			return false;
		};

		let reported = result.access_code.as_deref();
		if let Some(reported) = reported.filter(|code| *code != pending.access_code()) {
			debug!(
				target = "tabrelay.router",
				command_id = %result.command_id,
				expected = pending.access_code(),
				reported,
				"result came back under a different access code"
			);
		}

		self.correlator
			.sink()
			.report(CommandOutcome::completed(pending, result));
		true
	}

	fn exit_all(&self) -> RouteReport {
		let params = Map::new();
		let targets = self
			.sessions()
			.iter()
			.filter_map(|session| {
				self.send_to(session, CommandName::Exit, &params, None, false)
					.ok()
			})
			.collect::<Vec<_>>();
		info!(target = "tabrelay.router", agents = targets.len(), "exit broadcast");
		RouteReport::Dispatched {
			command: CommandName::Exit,
			targets,
		}
	}

	fn browsers(&self) -> Vec<BrowserEntry> {
		self.sessions()
			.iter()
			.map(AgentSession::to_browser_entry)
			.collect()
	}

	/// Registry snapshot in access code order.
	fn sessions(&self) -> Vec<AgentSession> {
		let mut sessions = self.registry.list();
		sessions.sort_by(|a, b| a.access_code().cmp(b.access_code()));
		sessions
	}

	fn send_to(
		&self,
		session: &AgentSession,
		name: CommandName,
		params: &Map<String, Value>,
		issuer: Option<Arc<dyn MessageChannel>>,
		track: bool,
	) -> Result<DispatchTarget> {
		let access_code = session.access_code();
		let command_id = Uuid::new_v4().to_string();
		let packet = GatewayPacket::Command(CommandPacket {
			access_code: access_code.to_string(),
			command_id: command_id.clone(),
			command: name,
			params: params.clone(),
			sent_at: now_ms(),
		});
		let text = packet.to_text()?;

		if track {
			self.correlator.track(&command_id, access_code, name, issuer);
		}

		let channel = session.channel();
		if let Err(source) = channel.send_text(text) {
			if track {
				self.correlator.cancel(&command_id);
			}
			self.registry
				.evict_channel(access_code, channel.id(), EvictReason::ChannelFailed);
			return Err(Error::Delivery {
				access_code: access_code.to_string(),
				source,
			});
		}

		debug!(target = "tabrelay.router", access_code, %command_id, command = %name, "command sent");
		Ok(DispatchTarget {
			access_code: access_code.to_string(),
			command_id,
		})
	}
}
