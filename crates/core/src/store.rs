//! The persistence seam: best-effort mirroring of agent online/offline state.
//!
//! In-memory session state is the source of truth. Store writes are queued
//! onto a single background writer so they never sit on the message path,
//! and they land in the order the registry issued them. Failures are logged
//! and otherwise ignored.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::Result;
use crate::time::now_ms;

/// Persisted view of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRecord {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_agent: Option<String>,
	pub online: bool,
	/// Unix milliseconds of the last status change.
	pub last_seen: u64,
}

impl AgentRecord {
	/// Record for an agent that just registered.
	pub fn online(user_agent: &str) -> Self {
		Self {
			user_agent: Some(user_agent.to_string()),
			online: true,
			last_seen: now_ms(),
		}
	}

	/// Placeholder for an access code seen for the first time going offline.
	pub fn unseen() -> Self {
		Self {
			user_agent: None,
			online: false,
			last_seen: 0,
		}
	}

	pub fn set_offline(&mut self) {
		self.online = false;
		self.last_seen = now_ms();
	}
}

/// Durable key-value mirror of agent status.
///
/// Both operations create the record when the access code has never been
/// seen before.
#[async_trait]
pub trait AgentStore: Send + Sync {
	async fn upsert_online(&self, access_code: &str, user_agent: &str) -> Result<()>;

	async fn mark_offline(&self, access_code: &str) -> Result<()>;
}

/// [`AgentStore`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
	records: Mutex<HashMap<String, AgentRecord>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, access_code: &str) -> Option<AgentRecord> {
		self.records.lock().get(access_code).cloned()
	}
}

#[async_trait]
impl AgentStore for MemoryStore {
	async fn upsert_online(&self, access_code: &str, user_agent: &str) -> Result<()> {
		self.records
			.lock()
			.insert(access_code.to_string(), AgentRecord::online(user_agent));
		Ok(())
	}

	async fn mark_offline(&self, access_code: &str) -> Result<()> {
		self.records
			.lock()
			.entry(access_code.to_string())
			.or_insert_with(AgentRecord::unseen)
			.set_offline();
		Ok(())
	}
}

enum StoreWrite {
	Online { access_code: String, user_agent: String },
	Offline { access_code: String },
	Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front of an [`AgentStore`].
///
/// Must be created inside a tokio runtime; the writer task ends once every
/// clone of the mirror is dropped.
#[derive(Clone)]
pub(crate) struct StoreMirror {
	tx: mpsc::UnboundedSender<StoreWrite>,
}

impl StoreMirror {
	pub(crate) fn spawn(store: Arc<dyn AgentStore>) -> Self {
		let (tx, mut rx) = mpsc::unbounded_channel::<StoreWrite>();
		tokio::spawn(async move {
			while let Some(write) = rx.recv().await {
				match write {
					StoreWrite::Online {
						access_code,
						user_agent,
					} => {
						if let Err(err) = store.upsert_online(&access_code, &user_agent).await {
							warn!(target = "tabrelay.store", access_code = %access_code, error = %err, "failed to mark agent online");
						}
					}
					StoreWrite::Offline { access_code } => {
						if let Err(err) = store.mark_offline(&access_code).await {
							warn!(target = "tabrelay.store", access_code = %access_code, error = %err, "failed to mark agent offline");
						}
					}
					StoreWrite::Flush(done) => {
						let _ = done.send(());
					}
				}
			}
			debug!(target = "tabrelay.store", "store writer stopped");
		});
		Self { tx }
	}

	pub(crate) fn online(&self, access_code: &str, user_agent: &str) {
		self.push(StoreWrite::Online {
			access_code: access_code.to_string(),
			user_agent: user_agent.to_string(),
		});
	}

	pub(crate) fn offline(&self, access_code: &str) {
		self.push(StoreWrite::Offline {
			access_code: access_code.to_string(),
		});
	}

	/// Resolves once every write queued before the call has been applied.
	pub(crate) async fn flush(&self) {
		let (done_tx, done_rx) = oneshot::channel();
		self.push(StoreWrite::Flush(done_tx));
		let _ = done_rx.await;
	}

	fn push(&self, write: StoreWrite) {
		if self.tx.send(write).is_err() {
			warn!(target = "tabrelay.store", "store writer is gone, dropping write");
		}
	}
}
