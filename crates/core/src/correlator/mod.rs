//! In-flight commands awaiting a result.
//!
//! Each tracked command owns one expiry task. A result and the expiry race
//! for the same table entry under one lock, so exactly one of them ends the
//! command: [`CommandCorrelator::resolve`] hands the entry to the caller, or
//! the expiry reports [`OutcomeStatus::TimedOut`](crate::OutcomeStatus) to
//! the sink.


use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tabrelay_protocol::CommandName;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::channel::MessageChannel;
use crate::outcome::{CommandOutcome, OutcomeSink};

/// A command sent to one agent, waiting for its result.
#[derive(Clone)]
pub struct PendingCommand {
	pub(crate) command_id: String,
	pub(crate) access_code: String,
	pub(crate) command: CommandName,
	pub(crate) sent_at: Instant,
	pub(crate) issuer: Option<Arc<dyn MessageChannel>>,
}

impl PendingCommand {
	pub fn command_id(&self) -> &str {
		&self.command_id
	}

	pub fn access_code(&self) -> &str {
		&self.access_code
	}

	pub fn command(&self) -> CommandName {
		self.command
	}

	pub fn sent_at(&self) -> Instant {
		self.sent_at
	}
}

impl fmt::Debug for PendingCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingCommand")
			.field("command_id", &self.command_id)
			.field("access_code", &self.access_code)
			.field("command", &self.command)
			.field("sent_at", &self.sent_at)
			.field("issuer", &self.issuer.as_ref().map(|c| c.id()))
			.finish()
	}
}

/// Table of pending commands keyed by command id.
#[derive(Clone)]
pub struct CommandCorrelator {
	inner: Arc<CorrelatorInner>,
}

struct CorrelatorInner {
	pending: Mutex<HashMap<String, PendingSlot>>,
	timeout: Duration,
	sink: Arc<dyn OutcomeSink>,
}

struct PendingSlot {
	command: PendingCommand,
	expiry: AbortHandle,
}

impl CommandCorrelator {
	pub fn new(command_timeout: Duration, sink: Arc<dyn OutcomeSink>) -> Self {
		Self {
			inner: Arc::new(CorrelatorInner {
				pending: Mutex::new(HashMap::new()),
				timeout: command_timeout,
				sink,
			}),
		}
	}

	pub fn command_timeout(&self) -> Duration {
		self.inner.timeout
	}

	pub fn sink(&self) -> &Arc<dyn OutcomeSink> {
		&self.inner.sink
	}

	/// Starts tracking `command_id` and arms its expiry.
	///
	/// Ids are expected to be unique; re-tracking a live id replaces the old
	/// entry and cancels its expiry.
	pub fn track(
		&self,
		command_id: &str,
		access_code: &str,
		command: CommandName,
		issuer: Option<Arc<dyn MessageChannel>>,
	) {
		let sent_at = Instant::now();
		let pending = PendingCommand {
			command_id: command_id.to_string(),
			access_code: access_code.to_string(),
			command,
			sent_at,
			issuer,
		};

		let previous = {
			let mut table = self.inner.pending.lock();
			let expiry = self.arm_expiry(command_id, sent_at + self.inner.timeout);
			table.insert(
				command_id.to_string(),
				PendingSlot {
					command: pending,
					expiry,
				},
			)
		};

		if let Some(previous) = previous {
			previous.expiry.abort();
			warn!(target = "tabrelay.correlator", command_id, "command id reused while still pending");
		}
		debug!(target = "tabrelay.correlator", command_id, access_code, %command, "tracking command");
	}

	/// Removes and returns the pending entry, cancelling its expiry.
	///
	/// At most one call per id ever returns `Some`; later calls and calls
	/// after expiry return `None`.
	pub fn resolve(&self, command_id: &str) -> Option<PendingCommand> {
		let slot = self.inner.pending.lock().remove(command_id)?;
		slot.expiry.abort();
		Some(slot.command)
	}

	/// Stops tracking without reporting an outcome.
	pub fn cancel(&self, command_id: &str) -> bool {
		self.resolve(command_id).is_some()
	}

	pub fn contains(&self, command_id: &str) -> bool {
		self.inner.pending.lock().contains_key(command_id)
	}

	pub fn len(&self) -> usize {
		self.inner.pending.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn arm_expiry(&self, command_id: &str, at: Instant) -> AbortHandle {
		let weak: Weak<CorrelatorInner> = Arc::downgrade(&self.inner);
		let id = command_id.to_string();

		tokio::spawn(async move {
			tokio::time::sleep_until(at).await;
			if let Some(inner) = weak.upgrade() {
				inner.expire(&id);
			}
		})
		.abort_handle()
	}
}

impl CorrelatorInner {
	/// Expiry callback; a no-op when the command was already resolved.
	fn expire(&self, command_id: &str) {
		let Some(slot) = self.pending.lock().remove(command_id) else {
			debug!(target = "tabrelay.correlator", command_id, "expiry fired for settled command");
			return;
		};
		self.sink.report(CommandOutcome::timed_out(slot.command));
	}
}
