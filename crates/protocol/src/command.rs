//! The fixed catalog of command names an agent understands.
//!
//! The gateway never executes these; it only checks that a controller asked
//! for something in the catalog before forwarding it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad grouping of a command, reported in dispatch logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
	Navigation,
	Interaction,
	Extraction,
	Wait,
	Control,
}

macro_rules! command_names {
	($($variant:ident => $wire:literal, $category:ident;)+) => {
		/// A recognized agent command.
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		pub enum CommandName {
			$(
				#[serde(rename = $wire)]
				$variant,
			)+
		}

		impl CommandName {
			/// Every recognized command, in catalog order.
			pub const ALL: &'static [CommandName] = &[$(CommandName::$variant),+];

			/// Name as it appears on the wire and in controller command lines.
			pub fn as_str(self) -> &'static str {
				match self {
					$(CommandName::$variant => $wire,)+
				}
			}

			pub fn category(self) -> CommandCategory {
				match self {
					$(CommandName::$variant => CommandCategory::$category,)+
				}
			}
		}

		impl FromStr for CommandName {
			type Err = UnknownCommandName;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				match s {
					$($wire => Ok(CommandName::$variant),)+
					_ => Err(UnknownCommandName(s.to_string())),
				}
			}
		}
	};
}

command_names! {
	Goto => "goto", Navigation;
	Back => "back", Navigation;
	Forward => "forward", Navigation;
	Reload => "reload", Navigation;
	NewTab => "newTab", Navigation;
	CloseTab => "closeTab", Navigation;
	SwitchTab => "switchTab", Navigation;
	Click => "click", Interaction;
	Type => "type", Interaction;
	Press => "press", Interaction;
	Hover => "hover", Interaction;
	Focus => "focus", Interaction;
	Select => "select", Interaction;
	Check => "check", Interaction;
	Scroll => "scroll", Interaction;
	GetText => "getText", Extraction;
	GetHtml => "getHtml", Extraction;
	GetAttribute => "getAttribute", Extraction;
	GetUrl => "getUrl", Extraction;
	GetTitle => "getTitle", Extraction;
	Extract => "extract", Extraction;
	Evaluate => "evaluate", Extraction;
	Screenshot => "screenshot", Extraction;
	Wait => "wait", Wait;
	WaitForSelector => "waitForSelector", Wait;
	WaitForNavigation => "waitForNavigation", Wait;
	Exit => "exit", Control;
	ListBrowsers => "listBrowsers", Control;
}

impl fmt::Display for CommandName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A command name outside the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommandName(pub String);
