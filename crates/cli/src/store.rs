//! [`AgentStore`] persisted as a single JSON document.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tabrelay::{AgentRecord, AgentStore, Result};
use tokio::fs;
use tokio::sync::Mutex;

type Records = BTreeMap<String, AgentRecord>;

/// Maps access code to [`AgentRecord`] in one file.
///
/// Every write reads, updates and rewrites the whole document while holding
/// the lock, so concurrent writers never interleave.
#[derive(Debug)]
pub struct JsonFileStore {
	path: PathBuf,
	lock: Mutex<()>,
}

impl JsonFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Current contents; empty when the file does not exist yet.
	#[cfg(test)]
	async fn records(&self) -> Result<Records> {
		let _guard = self.lock.lock().await;
		self.load().await
	}

	async fn update(&self, apply: impl FnOnce(&mut Records)) -> Result<()> {
		let _guard = self.lock.lock().await;
		let mut records = self.load().await?;
		apply(&mut records);
		self.save(&records).await
	}

	async fn load(&self) -> Result<Records> {
		match fs::read_to_string(&self.path).await {
			Ok(content) => Ok(serde_json::from_str(&content)?),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(Records::new()),
			Err(err) => Err(err.into()),
		}
	}

	async fn save(&self, records: &Records) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await?;
		}
		fs::write(&self.path, serde_json::to_string_pretty(records)?).await?;
		Ok(())
	}
}

#[async_trait]
impl AgentStore for JsonFileStore {
	async fn upsert_online(&self, access_code: &str, user_agent: &str) -> Result<()> {
		self.update(|records| {
			records.insert(access_code.to_string(), AgentRecord::online(user_agent));
		})
		.await
	}

	async fn mark_offline(&self, access_code: &str) -> Result<()> {
		self.update(|records| {
			records
				.entry(access_code.to_string())
				.or_insert_with(AgentRecord::unseen)
				.set_offline();
		})
		.await
	}
}
