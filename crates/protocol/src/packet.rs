//! Structured packets exchanged over agent and controller connections.
//!
//! # Main Types
//!
//! - [`AgentPacket`] - messages from an agent to the gateway
//! - [`GatewayPacket`] - messages from the gateway to agents and controllers
//! - [`DecodeError`] - why an inbound message could not be understood

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::command::CommandName;

/// Access code reported in error replies when none can be recovered.
pub const UNKNOWN_ACCESS_CODE: &str = "unknown";

const AGENT_KINDS: &[&str] = &["register", "unregister", "heartbeat", "command_result"];

/// Message sent from an agent to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentPacket {
	/// Announce the agent under its chosen access code.
	#[serde(rename_all = "camelCase")]
	Register { access_code: String, user_agent: String },
	/// Explicit teardown of the agent's session.
	#[serde(rename_all = "camelCase")]
	Unregister { access_code: String },
	/// Application-level liveness signal.
	#[serde(rename_all = "camelCase")]
	Heartbeat {
		access_code: String,
		/// Client clock value, echoed back verbatim in the ack.
		#[serde(default)]
		timestamp: Value,
	},
	/// Result of a previously dispatched command.
	CommandResult(CommandResult),
}

impl AgentPacket {
	/// Decodes an envelope, keeping enough context for a useful error reply.
	pub fn decode(text: &str) -> Result<Self, DecodeError> {
		let raw: RawEnvelope = serde_json::from_str(text).map_err(|e| DecodeError::Malformed {
			reason: e.to_string(),
		})?;
		let access_code = raw
			.data
			.get("accessCode")
			.and_then(Value::as_str)
			.map(str::to_owned);

		if !AGENT_KINDS.contains(&raw.kind.as_str()) {
			return Err(DecodeError::UnknownKind {
				kind: raw.kind,
				access_code,
			});
		}

		let mut envelope = Map::new();
		envelope.insert("type".into(), Value::String(raw.kind.clone()));
		envelope.insert("data".into(), raw.data);
		serde_json::from_value(Value::Object(envelope)).map_err(|e| DecodeError::InvalidData {
			kind: raw.kind,
			access_code,
			reason: e.to_string(),
		})
	}

	pub fn kind(&self) -> &'static str {
		match self {
			AgentPacket::Register { .. } => "register",
			AgentPacket::Unregister { .. } => "unregister",
			AgentPacket::Heartbeat { .. } => "heartbeat",
			AgentPacket::CommandResult(_) => "command_result",
		}
	}

	/// Access code carried by the packet, if any.
	pub fn access_code(&self) -> Option<&str> {
		match self {
			AgentPacket::Register { access_code, .. }
			| AgentPacket::Unregister { access_code }
			| AgentPacket::Heartbeat { access_code, .. } => Some(access_code),
			AgentPacket::CommandResult(result) => result.access_code.as_deref(),
		}
	}
}

#[derive(Deserialize)]
struct RawEnvelope {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	data: Value,
}

/// Result payload reported by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
	pub command_id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub access_code: Option<String>,
	/// Explicit success flag; when omitted, success means "no error".
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub success: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl CommandResult {
	pub fn succeeded(&self) -> bool {
		self.success.unwrap_or(self.error.is_none())
	}
}

/// Message sent from the gateway to an agent or controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayPacket {
	/// Acknowledges a registration or teardown.
	Success { message: String, timestamp: u64 },
	#[serde(rename_all = "camelCase")]
	HeartbeatAck {
		client_timestamp: Value,
		server_timestamp: u64,
	},
	/// Command for an agent to execute.
	Command(CommandPacket),
	/// Failure to handle an inbound message or controller command.
	#[serde(rename_all = "camelCase")]
	Error {
		access_code: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		kind: Option<String>,
		message: String,
	},
	/// Snapshot of connected agents, sent to a controller.
	Browsers { browsers: Vec<BrowserEntry> },
	/// Commands issued on behalf of a controller.
	Dispatched {
		command: CommandName,
		targets: Vec<DispatchTarget>,
	},
	/// Final outcome of a command, forwarded to the controller that issued it.
	CommandOutcome(OutcomePacket),
}

impl GatewayPacket {
	pub fn error(access_code: Option<&str>, kind: Option<&str>, message: impl Into<String>) -> Self {
		GatewayPacket::Error {
			access_code: access_code.unwrap_or(UNKNOWN_ACCESS_CODE).to_string(),
			kind: kind.map(str::to_owned),
			message: message.into(),
		}
	}

	pub fn to_text(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandPacket {
	pub access_code: String,
	pub command_id: String,
	pub command: CommandName,
	pub params: Map<String, Value>,
	/// Unix milliseconds at which the gateway sent the command.
	pub sent_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserEntry {
	pub access_code: String,
	pub user_agent: String,
	pub registered_at: u64,
	pub last_seen: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchTarget {
	pub access_code: String,
	pub command_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomePacket {
	pub command_id: String,
	pub access_code: String,
	pub command: CommandName,
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub timed_out: bool,
	pub elapsed_ms: u64,
}

/// Why an inbound message could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
	/// Not a JSON envelope at all.
	#[error("malformed message: {reason}")]
	Malformed { reason: String },
	/// Well-formed envelope with a kind agents may not send.
	#[error("unrecognized message type: {kind}")]
	UnknownKind {
		kind: String,
		access_code: Option<String>,
	},
	/// Known kind whose data does not match its schema.
	#[error("invalid {kind} message: {reason}")]
	InvalidData {
		kind: String,
		access_code: Option<String>,
		reason: String,
	},
}

impl DecodeError {
	pub fn access_code(&self) -> Option<&str> {
		match self {
			DecodeError::Malformed { .. } => None,
			DecodeError::UnknownKind { access_code, .. }
			| DecodeError::InvalidData { access_code, .. } => access_code.as_deref(),
		}
	}

	pub fn kind(&self) -> Option<&str> {
		match self {
			DecodeError::Malformed { .. } => None,
			DecodeError::UnknownKind { kind, .. } | DecodeError::InvalidData { kind, .. } => {
				Some(kind)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn register_decodes_camel_case_fields() {
		let packet = AgentPacket::decode(
			r#"{"type":"register","data":{"accessCode":"abc123","userAgent":"Mozilla/5.0"}}"#,
		)
		.unwrap();
		assert_eq!(
			packet,
			AgentPacket::Register {
				access_code: "abc123".into(),
				user_agent: "Mozilla/5.0".into(),
			}
		);
		assert_eq!(packet.access_code(), Some("abc123"));
	}

	#[test]
	fn heartbeat_keeps_client_timestamp_verbatim() {
		let packet =
			AgentPacket::decode(r#"{"type":"heartbeat","data":{"accessCode":"a","timestamp":1700000000123}}"#)
				.unwrap();
		match packet {
			AgentPacket::Heartbeat { timestamp, .. } => assert_eq!(timestamp, json!(1700000000123u64)),
			other => panic!("expected heartbeat, got {other:?}"),
		}
	}

	#[test]
	fn unknown_kind_reports_kind_and_access_code() {
		let err = AgentPacket::decode(r#"{"type":"teleport","data":{"accessCode":"x1"}}"#).unwrap_err();
		assert_eq!(
			err,
			DecodeError::UnknownKind {
				kind: "teleport".into(),
				access_code: Some("x1".into()),
			}
		);
		assert_eq!(err.to_string(), "unrecognized message type: teleport");
	}

	#[test]
	fn gateway_kinds_are_not_accepted_from_agents() {
		let err = AgentPacket::decode(r#"{"type":"command","data":{}}"#).unwrap_err();
		assert_eq!(err.kind(), Some("command"));
	}

	#[test]
	fn missing_fields_are_invalid_data() {
		let err = AgentPacket::decode(r#"{"type":"register","data":{"accessCode":"a"}}"#).unwrap_err();
		assert!(matches!(err, DecodeError::InvalidData { .. }));
		assert_eq!(err.access_code(), Some("a"));
	}

	#[test]
	fn non_json_is_malformed() {
		let err = AgentPacket::decode("hello there").unwrap_err();
		assert!(matches!(err, DecodeError::Malformed { .. }));
		assert_eq!(err.access_code(), None);
	}

	#[test]
	fn command_result_success_defaults_from_error() {
		let ok: CommandResult = serde_json::from_value(json!({"commandId": "c1", "result": "hi"})).unwrap();
		assert!(ok.succeeded());

		let failed: CommandResult =
			serde_json::from_value(json!({"commandId": "c2", "error": "no such element"})).unwrap();
		assert!(!failed.succeeded());

		let explicit: CommandResult =
			serde_json::from_value(json!({"commandId": "c3", "success": false})).unwrap();
		assert!(!explicit.succeeded());
	}

	#[test]
	fn error_packet_falls_back_to_unknown_access_code() {
		let text = GatewayPacket::error(None, Some("teleport"), "unrecognized message type: teleport")
			.to_text()
			.unwrap();
		let value: Value = serde_json::from_str(&text).unwrap();
		assert_eq!(value["type"], "error");
		assert_eq!(value["data"]["accessCode"], "unknown");
		assert_eq!(value["data"]["kind"], "teleport");
	}

	#[test]
	fn command_packet_serializes_with_type_tag() {
		let mut params = Map::new();
		params.insert("url".into(), json!("https://example.com"));
		let packet = GatewayPacket::Command(CommandPacket {
			access_code: "abc".into(),
			command_id: "id-1".into(),
			command: CommandName::Goto,
			params,
			sent_at: 42,
		});
		let value: Value = serde_json::from_str(&packet.to_text().unwrap()).unwrap();
		assert_eq!(value["type"], "command");
		assert_eq!(value["data"]["command"], "goto");
		assert_eq!(value["data"]["commandId"], "id-1");
		assert_eq!(value["data"]["params"]["url"], "https://example.com");
		assert_eq!(value["data"]["sentAt"], 42);
	}
}
