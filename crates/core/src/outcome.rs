//! Terminal outcomes of dispatched commands and where they go.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tabrelay_protocol::{CommandName, CommandResult, GatewayPacket, OutcomePacket};
use tracing::{debug, info, warn};

use crate::channel::MessageChannel;
use crate::correlator::PendingCommand;

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
	/// The agent answered.
	Completed {
		success: bool,
		result: Option<Value>,
		error: Option<String>,
	},
	/// No answer arrived within the command timeout.
	TimedOut,
}

/// How a tracked command ended.
#[derive(Clone)]
pub struct CommandOutcome {
	pub command_id: String,
	pub access_code: String,
	pub command: CommandName,
	pub status: OutcomeStatus,
	pub elapsed: Duration,
	/// Controller connection that issued the command, if any.
	pub issuer: Option<Arc<dyn MessageChannel>>,
}

impl CommandOutcome {
	pub fn completed(pending: PendingCommand, result: CommandResult) -> Self {
		let success = result.succeeded();
		Self::from_pending(
			pending,
			OutcomeStatus::Completed {
				success,
				result: result.result,
				error: result.error,
			},
		)
	}

	pub fn timed_out(pending: PendingCommand) -> Self {
		Self::from_pending(pending, OutcomeStatus::TimedOut)
	}

	fn from_pending(pending: PendingCommand, status: OutcomeStatus) -> Self {
		Self {
			elapsed: pending.sent_at().elapsed(),
			command_id: pending.command_id,
			access_code: pending.access_code,
			command: pending.command,
			issuer: pending.issuer,
			status,
		}
	}

	pub fn succeeded(&self) -> bool {
		matches!(self.status, OutcomeStatus::Completed { success: true, .. })
	}

	pub fn to_packet(&self) -> OutcomePacket {
		let (success, result, error, timed_out) = match &self.status {
			OutcomeStatus::Completed {
				success,
				result,
				error,
			} => (*success, result.clone(), error.clone(), false),
			OutcomeStatus::TimedOut => (
				false,
				None,
				Some(format!("timed out after {}ms", self.elapsed.as_millis())),
				true,
			),
		};
		OutcomePacket {
			command_id: self.command_id.clone(),
			access_code: self.access_code.clone(),
			command: self.command,
			success,
			result,
			error,
			timed_out,
			elapsed_ms: self.elapsed.as_millis() as u64,
		}
	}
}

impl fmt::Debug for CommandOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CommandOutcome")
			.field("command_id", &self.command_id)
			.field("access_code", &self.access_code)
			.field("command", &self.command)
			.field("status", &self.status)
			.field("elapsed", &self.elapsed)
			.finish()
	}
}

/// Receives every command outcome exactly once.
pub trait OutcomeSink: Send + Sync {
	fn report(&self, outcome: CommandOutcome);
}

/// Logs each outcome and forwards it to the issuing controller, if still
/// connected.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForwardingSink;

impl OutcomeSink for ForwardingSink {
	fn report(&self, outcome: CommandOutcome) {
		let elapsed_ms = outcome.elapsed.as_millis() as u64;
		match &outcome.status {
			OutcomeStatus::Completed { success: true, .. } => info!(
				target = "tabrelay.outcome",
				command_id = %outcome.command_id,
				access_code = %outcome.access_code,
				command = %outcome.command,
				elapsed_ms,
				"command completed"
			),
			OutcomeStatus::Completed { error, .. } => warn!(
				target = "tabrelay.outcome",
				command_id = %outcome.command_id,
				access_code = %outcome.access_code,
				command = %outcome.command,
				error = error.as_deref().unwrap_or("unspecified"),
				"command failed"
			),
			OutcomeStatus::TimedOut => warn!(
				target = "tabrelay.outcome",
				command_id = %outcome.command_id,
				access_code = %outcome.access_code,
				command = %outcome.command,
				elapsed_ms,
				"command timed out"
			),
		}

		let Some(issuer) = &outcome.issuer else {
			return;
		};
		let packet = GatewayPacket::CommandOutcome(outcome.to_packet());
		let forwarded = packet
			.to_text()
			.map_err(|e| e.to_string())
			.and_then(|text| issuer.send_text(text).map_err(|e| e.to_string()));
		if let Err(err) = forwarded {
			debug!(target = "tabrelay.outcome", command_id = %outcome.command_id, error = %err, "controller gone, outcome not forwarded");
		}
	}
}
