use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{AgentSession, EvictReason, SweepReport};
use crate::channel::{ChannelId, MessageChannel};
use crate::store::{AgentStore, StoreMirror};
use crate::time::now_ms;

/// Table of connected agents keyed by access code.
///
/// Liveness is enforced twice: every session owns one deadline task that is
/// replaced on each refresh, and [`sweep`](Self::sweep) re-checks every
/// session on an interval in case a deadline was missed. Both go through the
/// same removal path, so a stale session is evicted exactly once.
///
/// Store writes are queued while the table lock is held, so the store sees
/// registrations and evictions in the same order as the table.
///
/// Cloning yields another handle to the same table. Construction spawns the
/// store writer and must happen inside a tokio runtime.
#[derive(Clone)]
pub struct SessionRegistry {
	inner: Arc<RegistryInner>,
}

struct RegistryInner {
	sessions: Mutex<HashMap<String, SessionSlot>>,
	timeout: Duration,
	mirror: StoreMirror,
	next_token: AtomicU64,
}

struct SessionSlot {
	session: AgentSession,
	deadline: Deadline,
}

/// The single outstanding expiry task of a session.
struct Deadline {
	token: u64,
	handle: AbortHandle,
}

impl Deadline {
	fn cancel(&self) {
		self.handle.abort();
	}
}

impl SessionRegistry {
	pub fn new(session_timeout: Duration, store: Arc<dyn AgentStore>) -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				sessions: Mutex::new(HashMap::new()),
				timeout: session_timeout,
				mirror: StoreMirror::spawn(store),
				next_token: AtomicU64::new(1),
			}),
		}
	}

	pub fn session_timeout(&self) -> Duration {
		self.inner.timeout
	}

	/// Inserts or replaces the session for `access_code`.
	///
	/// A second registration under the same code is a reconnect: the new
	/// channel supersedes the old one and the old deadline is cancelled.
	pub fn register(
		&self,
		access_code: &str,
		user_agent: &str,
		channel: Arc<dyn MessageChannel>,
	) -> AgentSession {
		let now = Instant::now();
		let now_ms = now_ms();
		let session = AgentSession {
			access_code: access_code.to_string(),
			user_agent: user_agent.to_string(),
			registered_at_ms: now_ms,
			last_seen_ms: now_ms,
			last_liveness: now,
			channel,
		};

		let replaced = {
			let mut sessions = self.inner.sessions.lock();
			let deadline = self.arm_deadline(access_code, now);
			let previous = sessions.insert(
				access_code.to_string(),
				SessionSlot {
					session: session.clone(),
					deadline,
				},
			);
			self.inner.mirror.online(access_code, user_agent);
			previous.map(|slot| {
				slot.deadline.cancel();
				slot.session.channel.id()
			})
		};

		match replaced {
			Some(old) => info!(
				target = "tabrelay.registry",
				access_code,
				old_channel = %old,
				new_channel = %session.channel.id(),
				"agent reconnected, session replaced"
			),
			None => info!(
				target = "tabrelay.registry",
				access_code,
				user_agent,
				channel = %session.channel.id(),
				"agent registered"
			),
		}

		session
	}

	/// Refreshes liveness and re-arms the deadline.
	///
	/// Returns `false` without touching anything when the code is unknown.
	pub fn touch(&self, access_code: &str) -> bool {
		self.refresh(access_code, |_| true)
	}

	/// Like [`touch`](Self::touch), but only while the session is still bound
	/// to `channel`. Used for transport keepalives, which belong to a socket
	/// rather than to an access code.
	pub fn touch_channel(&self, access_code: &str, channel: ChannelId) -> bool {
		self.refresh(access_code, |slot| slot.session.channel.id() == channel)
	}

	pub fn get(&self, access_code: &str) -> Option<AgentSession> {
		self.inner
			.sessions
			.lock()
			.get(access_code)
			.map(|slot| slot.session.clone())
	}

	/// Point-in-time copy of every session.
	pub fn list(&self) -> Vec<AgentSession> {
		self.inner
			.sessions
			.lock()
			.values()
			.map(|slot| slot.session.clone())
			.collect()
	}

	pub fn len(&self) -> usize {
		self.inner.sessions.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Removes the session and marks the agent offline. Idempotent.
	pub fn evict(&self, access_code: &str) -> bool {
		self.remove_if(access_code, EvictReason::Teardown, |_| true)
			.is_some()
	}

	/// Evicts `access_code` only if its session still uses `channel`.
	///
	/// A connection closing after its agent reconnected elsewhere must not
	/// take the new session down with it.
	pub fn release(&self, access_code: &str, channel: ChannelId) -> bool {
		self.evict_channel(access_code, channel, EvictReason::ChannelClosed)
	}

	/// Evicts stale sessions and probes the rest.
	pub fn sweep(&self) -> SweepReport {
		let now = Instant::now();
		let timeout = self.inner.timeout;

		let (stale, live) = {
			let mut sessions = self.inner.sessions.lock();
			let stale_codes: Vec<String> = sessions
				.iter()
				.filter(|(_, slot)| now.duration_since(slot.session.last_liveness) >= timeout)
				.map(|(code, _)| code.clone())
				.collect();
			let stale: Vec<AgentSession> = stale_codes
				.iter()
				.filter_map(|code| sessions.remove(code))
				.map(|slot| {
					slot.deadline.cancel();
					self.inner.mirror.offline(&slot.session.access_code);
					slot.session
				})
				.collect();
			let live: Vec<AgentSession> = sessions.values().map(|slot| slot.session.clone()).collect();
			(stale, live)
		};

		let mut report = SweepReport::default();
		for session in stale {
			log_eviction(&session, EvictReason::Sweep);
			report.evicted.push(session.access_code);
		}

		for session in live {
			match session.channel.probe() {
				Ok(()) => report.probed += 1,
				Err(err) => {
					debug!(target = "tabrelay.registry", access_code = %session.access_code, error = %err, "keepalive probe failed");
					if self.evict_channel(&session.access_code, session.channel.id(), EvictReason::ChannelFailed) {
						report.evicted.push(session.access_code);
					}
				}
			}
		}

		if !report.evicted.is_empty() {
			info!(target = "tabrelay.registry", evicted = report.evicted.len(), probed = report.probed, "sweep evicted sessions");
		}
		report
	}

	/// Runs [`sweep`](Self::sweep) every session timeout until the registry
	/// is dropped or the handle is aborted.
	pub fn spawn_sweeper(&self) -> JoinHandle<()> {
		let weak = Arc::downgrade(&self.inner);
		let period = self.inner.timeout;
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			loop {
				ticker.tick().await;
				let Some(inner) = weak.upgrade() else {
					break;
				};
				SessionRegistry { inner }.sweep();
			}
		})
	}

	/// Waits until every queued store write has been applied.
	pub async fn flush_store(&self) {
		self.inner.mirror.flush().await;
	}

	/// Evicts `access_code` if it is still bound to `channel`.
	pub(crate) fn evict_channel(&self, access_code: &str, channel: ChannelId, reason: EvictReason) -> bool {
		self.remove_if(access_code, reason, |slot| slot.session.channel.id() == channel)
			.is_some()
	}

	fn remove_if(
		&self,
		access_code: &str,
		reason: EvictReason,
		should_remove: impl FnOnce(&SessionSlot) -> bool,
	) -> Option<AgentSession> {
		let removed = {
			let mut sessions = self.inner.sessions.lock();
			if sessions.get(access_code).is_some_and(should_remove) {
				let removed = sessions.remove(access_code);
				self.inner.mirror.offline(access_code);
				removed
			} else {
				None
			}
		};

		match removed {
			Some(slot) => {
				slot.deadline.cancel();
				log_eviction(&slot.session, reason);
				Some(slot.session)
			}
			None => {
				debug!(target = "tabrelay.registry", access_code, %reason, "nothing to evict");
				None
			}
		}
	}

	fn refresh(&self, access_code: &str, matches: impl FnOnce(&SessionSlot) -> bool) -> bool {
		let mut sessions = self.inner.sessions.lock();
		let Some(slot) = sessions.get_mut(access_code) else {
			return false;
		};
		if !matches(slot) {
			return false;
		}

		let now = Instant::now();
		slot.session.last_liveness = now;
		slot.session.last_seen_ms = now_ms();
		slot.deadline.cancel();
		slot.deadline = self.arm_deadline(access_code, now);
		true
	}

	fn arm_deadline(&self, access_code: &str, from: Instant) -> Deadline {
		let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
		let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
		let code = access_code.to_string();
		let at = from + self.inner.timeout;

		let task = tokio::spawn(async move {
			tokio::time::sleep_until(at).await;
			if let Some(inner) = weak.upgrade() {
				SessionRegistry { inner }.expire(&code, token);
			}
		});

		Deadline {
			token,
			handle: task.abort_handle(),
		}
	}

	/// Deadline callback. A token that no longer matches means the session was
	/// refreshed, replaced or removed since the deadline was armed.
	fn expire(&self, access_code: &str, token: u64) {
		let timeout = self.inner.timeout;
		self.remove_if(access_code, EvictReason::Deadline, |slot| {
			slot.deadline.token == token && slot.session.last_liveness.elapsed() >= timeout
		});
	}
}

fn log_eviction(session: &AgentSession, reason: EvictReason) {
	match reason {
		EvictReason::Teardown | EvictReason::ChannelClosed => info!(
			target = "tabrelay.registry",
			access_code = %session.access_code,
			%reason,
			"agent session removed"
		),
		_ => warn!(
			target = "tabrelay.registry",
			access_code = %session.access_code,
			%reason,
			"agent session evicted"
		),
	}
}
