//! Error types for the gateway core.

use tabrelay_protocol::{DecodeError, UnknownCommandName};
use thiserror::Error;

use crate::channel::ChannelError;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the registry, router and packet handler.
///
/// None of these are fatal to a connection; the gateway turns them into
/// `error` replies at the message boundary.
#[derive(Debug, Error)]
pub enum Error {
	/// Text does not start with the controller prefix.
	#[error("not a controller command")]
	NotACommand,

	/// Controller prefix with nothing after it.
	#[error("empty controller command")]
	EmptyCommand,

	#[error(transparent)]
	UnknownCommand(#[from] UnknownCommandName),

	/// `browser=` named an access code with no live session.
	#[error("unknown browser: {access_code}")]
	UnknownTarget { access_code: String },

	/// Broadcast requested while no agent is registered.
	#[error("no agents connected")]
	NoAgents,

	/// Liveness update for an access code that is not registered.
	#[error("session not registered: {access_code}")]
	SessionNotFound { access_code: String },

	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// The target agent's channel rejected the message.
	#[error("delivery to {access_code} failed: {source}")]
	Delivery {
		access_code: String,
		#[source]
		source: ChannelError,
	},

	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	/// Persistence collaborator failure.
	#[error("store error: {0}")]
	Store(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Access code the error can be attributed to, if any.
	pub fn access_code(&self) -> Option<&str> {
		match self {
			Error::UnknownTarget { access_code }
			| Error::SessionNotFound { access_code }
			| Error::Delivery { access_code, .. } => Some(access_code),
			Error::Decode(err) => err.access_code(),
			_ => None,
		}
	}

	/// Message kind the error relates to, if any.
	pub fn kind(&self) -> Option<&str> {
		match self {
			Error::Decode(err) => err.kind(),
			_ => None,
		}
	}
}
