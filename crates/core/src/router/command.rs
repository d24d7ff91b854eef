//! Controller command lines.
//!
//! ```text
//! main:<name> <key>=<value> <key>=<value> ...
//! main:exit
//! main:listBrowsers
//! ```

use serde_json::{Map, Number, Value};
use tabrelay_protocol::{CONTROLLER_PREFIX, CommandName};

use crate::error::{Error, Result};

/// Parameter naming the single agent a command is meant for.
const TARGET_PARAM: &str = "browser";

/// A parsed controller command line.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCommand {
	/// Tell every agent to shut down. Nothing is tracked.
	Exit,
	/// Snapshot of connected agents for the controller.
	ListBrowsers,
	/// A catalog command for one agent or all of them.
	Invoke(Invocation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
	pub name: CommandName,
	pub params: Map<String, Value>,
	pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	/// Every registered agent.
	Broadcast,
	/// The agent registered under this access code.
	Agent(String),
}

impl ControllerCommand {
	/// Parses a `main:` line.
	///
	/// Returns [`Error::NotACommand`] when the prefix is missing, so callers
	/// can hand the text to the packet protocol instead.
	pub fn parse(text: &str) -> Result<Self> {
		let body = match text.split_once(':') {
			Some((prefix, body)) if prefix == CONTROLLER_PREFIX => body,
			_ => return Err(Error::NotACommand),
		};

		let mut tokens = body.split_whitespace();
		let Some(name) = tokens.next() else {
			return Err(Error::EmptyCommand);
		};

		let name: CommandName = name.parse()?;
		match name {
			CommandName::Exit => return Ok(ControllerCommand::Exit),
			CommandName::ListBrowsers => return Ok(ControllerCommand::ListBrowsers),
			_ => {}
		}

		let mut params = Map::new();
		let mut target = Target::Broadcast;
		for token in tokens {
			let Some((key, raw)) = token.split_once('=') else {
				continue;
			};
			if key.is_empty() {
				continue;
			}
			if key == TARGET_PARAM {
				target = Target::Agent(raw.to_string());
				continue;
			}
			params.insert(key.to_string(), coerce(raw));
		}

		Ok(ControllerCommand::Invoke(Invocation {
			name,
			params,
			target,
		}))
	}
}

/// `true`/`false` become booleans, numerals become numbers, anything else
/// stays a string. A literal string `"42"` cannot be expressed.
fn coerce(raw: &str) -> Value {
	match raw {
		"true" => return Value::Bool(true),
		"false" => return Value::Bool(false),
		_ => {}
	}
	if let Ok(n) = raw.parse::<i64>() {
		return Value::Number(n.into());
	}
	raw.parse::<f64>()
		.ok()
		.and_then(Number::from_f64)
		.map(Value::Number)
		.unwrap_or_else(|| Value::String(raw.to_string()))
}
