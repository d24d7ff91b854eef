//! Gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tabrelay_protocol::DEFAULT_PORT;

use crate::error::{Error, Result};

/// Tunables for the gateway process.
///
/// Loaded from JSON with camelCase keys; durations are given in milliseconds
/// (`sessionTimeoutMs`, `commandTimeoutMs`). Missing keys fall back to
/// [`GatewayConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
	pub host: String,
	pub port: u16,
	/// How long a session may stay silent before it is evicted. Also the
	/// sweep interval.
	#[serde(rename = "sessionTimeoutMs", with = "millis")]
	pub session_timeout: Duration,
	/// How long a dispatched command may wait for its result.
	#[serde(rename = "commandTimeoutMs", with = "millis")]
	pub command_timeout: Duration,
	/// JSON file mirroring agent online/offline state. In-memory when unset.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub store_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: DEFAULT_PORT,
			session_timeout: Duration::from_secs(60),
			command_timeout: Duration::from_secs(30),
			store_path: None,
		}
	}
}

impl GatewayConfig {
	/// Rejects settings the timers cannot work with.
	pub fn validate(&self) -> Result<()> {
		if self.session_timeout.is_zero() {
			return Err(Error::InvalidConfig("session timeout must be non-zero".into()));
		}
		if self.command_timeout.is_zero() {
			return Err(Error::InvalidConfig("command timeout must be non-zero".into()));
		}
		Ok(())
	}

	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
