//! Connected agents and their liveness.

mod registry;

use std::fmt;
use std::sync::Arc;

use tabrelay_protocol::BrowserEntry;
use tokio::time::Instant;

pub use registry::SessionRegistry;

use crate::channel::MessageChannel;

/// One connected agent.
///
/// Cheap to clone; clones share the channel handle. Values handed out by the
/// registry are snapshots and do not track later liveness updates.
#[derive(Clone)]
pub struct AgentSession {
	access_code: String,
	user_agent: String,
	registered_at_ms: u64,
	last_seen_ms: u64,
	last_liveness: Instant,
	channel: Arc<dyn MessageChannel>,
}

impl AgentSession {
	pub fn access_code(&self) -> &str {
		&self.access_code
	}

	pub fn channel(&self) -> &Arc<dyn MessageChannel> {
		&self.channel
	}

	pub fn to_browser_entry(&self) -> BrowserEntry {
		BrowserEntry {
			access_code: self.access_code.clone(),
			user_agent: self.user_agent.clone(),
			registered_at: self.registered_at_ms,
			last_seen: self.last_seen_ms,
		}
	}
}

impl fmt::Debug for AgentSession {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AgentSession")
			.field("access_code", &self.access_code)
			.field("user_agent", &self.user_agent)
			.field("last_seen_ms", &self.last_seen_ms)
			.field("channel", &self.channel.id())
			.finish()
	}
}

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
	/// Explicit `unregister` from the agent.
	Teardown,
	/// The per-session deadline fired.
	Deadline,
	/// The periodic sweep found the session stale.
	Sweep,
	/// The agent's connection closed.
	ChannelClosed,
	/// Sending to the agent failed.
	ChannelFailed,
}

impl fmt::Display for EvictReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			EvictReason::Teardown => "teardown",
			EvictReason::Deadline => "deadline",
			EvictReason::Sweep => "sweep",
			EvictReason::ChannelClosed => "channel closed",
			EvictReason::ChannelFailed => "channel failed",
		})
	}
}

/// What one sweep pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
	/// Access codes removed during the pass.
	pub evicted: Vec<String>,
	/// Sessions that were sent a keepalive probe.
	pub probed: usize,
}
